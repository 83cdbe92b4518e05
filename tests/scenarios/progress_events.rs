//! Test: Progress Events - emitted in execution order, exactly once each

use crate::helpers::*;
use remote_pipeline::core::{StageKind, StageSpec};
use remote_pipeline::execution::{PipelineRunner, ProgressEvent};

fn four_stages() -> Vec<StageSpec> {
    vec![
        StageSpec::upload("local1.jpg", "/r/in1/000001.jpg"),
        StageSpec::remote_exec("warp.sh"),
        StageSpec::remote_exec("compose.sh"),
        StageSpec::download("/r/out/000001.jpg", "result.jpg"),
    ]
}

/// Upload, exec, exec, download arrive in that exact order
#[tokio::test]
async fn test_four_stage_event_order() {
    let result = run_pipeline_with_mock(MockConnector::new(), four_stages()).await;

    assert_pipeline_completed(&result);
    assert_eq!(
        result.event_names(),
        vec![
            "run_started",
            "connected",
            "started:0",
            "completed:0",
            "started:1",
            "completed:1",
            "started:2",
            "completed:2",
            "started:3",
            "artifact:3",
            "completed:3",
            "run_completed",
        ]
    );

    let kinds: Vec<StageKind> = result
        .events
        .iter()
        .filter_map(|event| match event {
            ProgressEvent::StageStarted { kind, .. } => Some(*kind),
            _ => None,
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            StageKind::Upload,
            StageKind::RemoteExec,
            StageKind::RemoteExec,
            StageKind::Download,
        ]
    );
}

/// Each event carries a readable message; only downloads carry an artifact
#[tokio::test]
async fn test_event_messages_and_artifacts() {
    let result = run_pipeline_with_mock(MockConnector::new(), four_stages()).await;

    assert!(result.events.iter().all(|event| !event.message().is_empty()));

    let artifacts: Vec<_> = result
        .events
        .iter()
        .filter_map(|event| event.artifact())
        .collect();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].path, std::path::PathBuf::from("result.jpg"));

    match &result.events[2] {
        ProgressEvent::StageStarted { message, .. } => {
            assert_eq!(message, "Uploading local1.jpg -> /r/in1/000001.jpg")
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

/// A failed run ends with a single RunFailed and no RunCompleted
#[tokio::test]
async fn test_failed_run_ends_with_run_failed() {
    let connector = MockConnector::new().reply("warp.sh", Reply::exit(1, "boom"));

    let result = run_pipeline_with_mock(connector, four_stages()).await;

    let names = result.event_names();
    assert_eq!(names.last().map(String::as_str), Some("run_failed"));
    assert_eq!(names.iter().filter(|n| *n == "run_failed").count(), 1);
    assert!(!names.contains(&"run_completed".to_string()));
    assert!(!names.contains(&"completed:1".to_string()));
}

/// Events stream through a spawned run while it executes
#[tokio::test]
async fn test_spawned_run_streams_events() {
    let connector = MockConnector::new();
    let runner = PipelineRunner::new(connector);
    let mut handle = runner.spawn(connection(), four_stages()).unwrap();

    let mut names = Vec::new();
    while let Some(event) = handle.next_event().await {
        names.push(event_name(&event));
    }
    let result = handle.wait().await;

    assert!(result.is_success());
    assert_eq!(names.first().map(String::as_str), Some("run_started"));
    assert_eq!(names.last().map(String::as_str), Some("run_completed"));
    assert_eq!(names.len(), 12);
}
