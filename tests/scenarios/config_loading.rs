//! Test: Config Loading - YAML definitions resolve into runnable stages

use crate::helpers::*;
use remote_pipeline::core::config::PipelineConfig;
use remote_pipeline::core::{StageKind, StageSpec};
use std::collections::HashMap;
use std::path::PathBuf;

fn sample_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("pipelines")
        .join("udis2-fusion.yaml")
}

fn inputs() -> HashMap<String, String> {
    let mut vars = HashMap::new();
    vars.insert("input1".to_string(), "left.jpg".to_string());
    vars.insert("input2".to_string(), "right.jpg".to_string());
    vars
}

/// The shipped fusion pipeline loads and needs only the two inputs
#[test]
fn test_sample_pipeline_loads() {
    let config = PipelineConfig::from_file(sample_path()).unwrap();
    assert_eq!(config.name, "udis2-fusion");
    assert_eq!(config.connect_timeout_secs, Some(15));

    let missing = config.missing_variables(&HashMap::new()).unwrap();
    assert_eq!(missing, vec!["input1".to_string(), "input2".to_string()]);

    let pipeline = config.to_pipeline(&inputs()).unwrap();
    assert_eq!(pipeline.count(StageKind::RemoteExec), 2);
    assert_eq!(pipeline.count(StageKind::Download), 5);
    assert_eq!(
        pipeline.stages[1],
        StageSpec::upload("left.jpg", "~/autodl-tmp/UDIS-D/testing/input1/000001.jpg")
    );
    assert_eq!(
        pipeline.stages[8],
        StageSpec::remote_exec(
            "/root/miniconda3/bin/python ~/autodl-tmp/UDIS2-main/Warp/Codes/test_output.py"
        )
    );

    let kinds: Vec<String> = pipeline
        .expected_artifacts()
        .into_iter()
        .map(|artifact| artifact.kind)
        .collect();
    assert_eq!(
        kinds,
        vec!["warp1", "warp2", "learn_mask1", "learn_mask2", "final"]
    );
}

/// Running the loaded pipeline issues the expected cleanup commands
#[tokio::test]
async fn test_sample_pipeline_runs_against_mock() {
    let config = PipelineConfig::from_file(sample_path()).unwrap();
    let pipeline = config.to_pipeline(&inputs()).unwrap();

    let result = run_pipeline_with_mock(MockConnector::new(), pipeline.stages).await;

    assert_pipeline_completed(&result);
    assert_eq!(result.result.artifacts().len(), 5);
    assert_eq!(
        result.state.commands()[0],
        "rm -rf -- ~/'autodl-tmp/UDIS-D/testing/input1'/*"
    );
    assert_eq!(
        result.artifact_paths().last(),
        Some(&PathBuf::from("./final_result.jpg"))
    );
}

/// Unknown stage kinds are rejected at load time
#[test]
fn test_unknown_stage_kind() {
    let yaml = r#"
name: "bad"
stages:
  - kind: reboot
    command: "reboot"
"#;
    assert!(PipelineConfig::from_yaml(yaml).is_err());
}

/// Clearing the home directory is rejected even through a variable
#[test]
fn test_clearing_home_is_rejected() {
    let yaml = r#"
name: "bad"
variables:
  target: "~/"
stages:
  - kind: clear_dir
    remote_dir: "{{ target }}"
"#;
    let config = PipelineConfig::from_yaml(yaml).unwrap();
    assert!(config.to_pipeline(&HashMap::new()).is_err());
}

/// A variable left unresolved is a load error naming it
#[test]
fn test_unresolved_variable_is_named() {
    let config = PipelineConfig::from_file(sample_path()).unwrap();
    let mut vars = HashMap::new();
    vars.insert("input1".to_string(), "left.jpg".to_string());

    let err = config.to_pipeline(&vars).unwrap_err();
    assert!(format!("{:#}", err).contains("input2"));
}
