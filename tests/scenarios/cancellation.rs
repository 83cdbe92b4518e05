//! Test: Cancellation - a blocked run resolves promptly and cleans up

use crate::helpers::*;
use remote_pipeline::core::{FailureCause, StageSpec};
use remote_pipeline::execution::{CancelToken, PipelineRunner, ProgressEvent, RunnerError};
use std::time::Duration;
use tokio::time::timeout;

/// Wait until the run reports `StageStarted` for `index`
async fn wait_for_stage(handle: &mut remote_pipeline::execution::RunHandle, index: usize) {
    while let Some(event) = handle.next_event().await {
        if let ProgressEvent::StageStarted { index: started, .. } = event {
            if started == index {
                return;
            }
        }
    }
    panic!("run ended before stage {} started", index);
}

/// Cancelling while a remote script hangs yields a report in bounded time
#[tokio::test]
async fn test_cancel_blocked_remote_exec() {
    let connector = MockConnector::new().reply("compose.sh", Reply::Hang);
    let state = connector.state.clone();
    let runner = PipelineRunner::new(connector);

    let mut handle = runner.spawn(connection(), fusion_stages()).unwrap();
    wait_for_stage(&mut handle, 5).await;
    handle.cancel();

    let result = timeout(Duration::from_secs(2), handle.wait())
        .await
        .expect("cancelled run should resolve promptly");

    let report = result.failure().unwrap();
    assert_eq!(report.stage, Some(5));
    assert_eq!(report.cause, FailureCause::Cancelled);
    assert!(report.is_cancelled());

    assert_eq!(state.terminates(), 1);
    assert_eq!(state.closes(), 1);
    assert!(!runner.is_running());
}

/// Cancelling during the connect phase reports no stage
#[tokio::test]
async fn test_cancel_while_connecting() {
    let connector = MockConnector::new().slow_connect(Duration::from_secs(30));
    let state = connector.state.clone();
    let runner = PipelineRunner::new(connector);

    let handle = runner.spawn(connection(), fusion_stages()).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.cancel();

    let result = timeout(Duration::from_secs(2), handle.wait()).await.unwrap();

    let report = result.failure().unwrap();
    assert_eq!(report.stage, None);
    assert_eq!(report.cause, FailureCause::Cancelled);
    assert!(state.calls().is_empty());
    assert_eq!(state.closes(), 0);
}

/// A token cancelled before the run starts stops it before any stage
#[tokio::test]
async fn test_precancelled_token() {
    let connector = MockConnector::new();
    let state = connector.state.clone();
    let runner = PipelineRunner::new(connector);

    let token = CancelToken::new();
    token.cancel();
    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();

    let result = runner
        .run(&connection(), &fusion_stages(), tx, token)
        .await
        .unwrap();

    assert_eq!(result.failure().unwrap().cause, FailureCause::Cancelled);
    assert!(state.calls().is_empty());
}

/// Only one run may be in flight per runner
#[tokio::test]
async fn test_concurrent_run_is_busy() {
    let connector = MockConnector::new().reply("hang", Reply::Hang);
    let runner = PipelineRunner::new(connector);

    let mut handle = runner
        .spawn(connection(), vec![StageSpec::remote_exec("hang")])
        .unwrap();
    wait_for_stage(&mut handle, 0).await;

    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    let second = runner
        .run(&connection(), &fusion_stages(), tx, CancelToken::new())
        .await;
    assert_eq!(second.unwrap_err(), RunnerError::Busy);
    assert!(matches!(
        runner.spawn(connection(), vec![]),
        Err(RunnerError::Busy)
    ));

    handle.cancel();
    let result = timeout(Duration::from_secs(2), handle.wait()).await.unwrap();
    assert!(result.failure().unwrap().is_cancelled());

    // Free again once the first run has resolved
    assert!(runner.spawn(connection(), vec![]).is_ok());
}
