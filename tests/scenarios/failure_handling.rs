//! Test: Failure Handling - the first failure ends the run with one report

use crate::helpers::*;
use remote_pipeline::core::{FailureCause, StageSpec};
use remote_pipeline::execution::ProgressEvent;

/// compose.sh runs out of memory: stage 5 fails with its stderr
#[tokio::test]
async fn test_compose_failure_reports_stage_and_stderr() {
    let connector = MockConnector::new().reply("compose.sh", Reply::exit(1, "oom"));

    let result = run_pipeline_with_mock(connector, fusion_stages()).await;

    assert_failed_at(&result, Some(5), "oom");
    assert_eq!(
        result.result.failure().unwrap().cause,
        FailureCause::StageExit { code: 1 }
    );

    // Nothing about the download stage is ever emitted
    assert!(result
        .events
        .iter()
        .all(|event| event.stage_index() != Some(6)));
    assert!(result.artifact_paths().is_empty());
    assert!(!result
        .state
        .calls()
        .iter()
        .any(|call| matches!(call, Call::Get(..))));
}

/// Non-zero exit of any remote command aborts at that stage's position
#[tokio::test]
async fn test_remote_exec_failure_index() {
    for failing in ["warp.sh", "compose.sh"] {
        let connector = MockConnector::new().reply(failing, Reply::exit(2, ""));
        let result = run_pipeline_with_mock(connector, fusion_stages()).await;

        let expected = if failing == "warp.sh" { 4 } else { 5 };
        let report = result.result.failure().unwrap();
        assert_eq!(report.stage, Some(expected));
        assert_eq!(
            report.message,
            format!("`{}` exited with status 2", failing)
        );
    }
}

/// A missing input aborts the upload stage with a transfer error
#[tokio::test]
async fn test_upload_failure() {
    let connector = MockConnector::new().fail_transfer("/r/in2/");

    let result = run_pipeline_with_mock(connector, fusion_stages()).await;

    let report = result.result.failure().unwrap();
    assert_eq!(report.stage, Some(3));
    assert_eq!(report.cause, FailureCause::Transfer);
    assert_eq!(result.started_stages(), vec![0, 1, 2, 3]);
    assert_eq!(result.state.closes(), 1);
}

/// A missing remote result aborts the download stage
#[tokio::test]
async fn test_download_failure() {
    let connector = MockConnector::new().fail_transfer("/r/out/");

    let result = run_pipeline_with_mock(connector, fusion_stages()).await;

    let report = result.result.failure().unwrap();
    assert_eq!(report.stage, Some(6));
    assert_eq!(report.cause, FailureCause::Transfer);
    assert!(report.message.contains("/r/out/000001.jpg"));
    assert!(result.events.iter().all(|event| event.artifact().is_none()));
}

/// A transport error during cleanup is fatal even though its exit code is not
#[tokio::test]
async fn test_clear_dir_transport_error_aborts() {
    let connector = MockConnector::new().reply("rm -rf", Reply::Broken("channel closed".to_string()));

    let result = run_pipeline_with_mock(connector, fusion_stages()).await;

    assert_failed_at(&result, Some(0), "channel closed");
    assert_eq!(result.result.failure().unwrap().cause, FailureCause::Execution);
}

/// Connection failures are reported before the first stage
#[tokio::test]
async fn test_connection_failure() {
    let connector = MockConnector::new().refuse("authentication failed");

    let result = run_pipeline_with_mock(connector, fusion_stages()).await;

    assert_failed_at(&result, None, "authentication failed");
    let report = result.result.failure().unwrap();
    assert_eq!(report.cause, FailureCause::Connection);
    assert_eq!(report.stage_index(), -1);

    assert!(result.started_stages().is_empty());
    assert!(result.state.calls().is_empty());
    assert_eq!(result.state.closes(), 0);
    assert!(matches!(
        result.events.last(),
        Some(ProgressEvent::RunFailed { .. })
    ));
}

/// The session is closed exactly once on failure too
#[tokio::test]
async fn test_session_closed_once_on_failure() {
    let connector = MockConnector::new().reply("warp.sh", Reply::exit(1, "CUDA error"));

    let result = run_pipeline_with_mock(
        connector,
        vec![
            StageSpec::remote_exec("warp.sh"),
            StageSpec::download("/r/out.jpg", "out.jpg"),
        ],
    )
    .await;

    assert_failed_at(&result, Some(0), "CUDA error");
    assert_eq!(result.state.closes(), 1);
}
