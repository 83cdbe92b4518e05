//! Pipeline runner - owns one session per run and sequences its stages

use crate::{
    core::{Artifact, ConnectionSpec, FailureCause, FailureReport, PipelineResult, StageSpec},
    execution::{CancelToken, ProgressEvent, StageExecutor},
    remote::{RemoteSession, SessionConnector},
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Connect timeout used unless the caller sets one
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors raised before a run starts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunnerError {
    #[error("A pipeline run is already in progress")]
    Busy,
}

/// Clears the in-flight flag when the run ends, however it ends
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runs stage lists over sessions from a connector, one run at a time
pub struct PipelineRunner<C> {
    connector: Arc<C>,
    connect_timeout: Duration,
    in_flight: Arc<AtomicBool>,
}

impl<C> Clone for PipelineRunner<C> {
    fn clone(&self) -> Self {
        Self {
            connector: self.connector.clone(),
            connect_timeout: self.connect_timeout,
            in_flight: self.in_flight.clone(),
        }
    }
}

impl<C: SessionConnector + 'static> PipelineRunner<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Whether a run is currently in flight
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn acquire(&self) -> Result<InFlightGuard, RunnerError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| RunnerError::Busy)?;
        Ok(InFlightGuard(self.in_flight.clone()))
    }

    /// Start a run on a background task
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        &self,
        connection: ConnectionSpec,
        stages: Vec<StageSpec>,
    ) -> Result<RunHandle, RunnerError> {
        let guard = self.acquire()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancelToken::new();
        let run_id = Uuid::new_v4();

        let runner = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            runner
                .execute(run_id, &connection, &stages, &tx, &token)
                .await
        });

        Ok(RunHandle {
            run_id,
            events: rx,
            cancel,
            task,
        })
    }

    /// Run to completion on the current task
    pub async fn run(
        &self,
        connection: &ConnectionSpec,
        stages: &[StageSpec],
        events: mpsc::UnboundedSender<ProgressEvent>,
        cancel: CancelToken,
    ) -> Result<PipelineResult, RunnerError> {
        let _guard = self.acquire()?;
        Ok(self
            .execute(Uuid::new_v4(), connection, stages, &events, &cancel)
            .await)
    }

    async fn execute(
        &self,
        run_id: Uuid,
        connection: &ConnectionSpec,
        stages: &[StageSpec],
        events: &mpsc::UnboundedSender<ProgressEvent>,
        cancel: &CancelToken,
    ) -> PipelineResult {
        // A dropped receiver must not affect the run
        let emit = |event: ProgressEvent| {
            let _ = events.send(event);
        };

        info!("Starting pipeline run {} against {}", run_id, connection);
        emit(ProgressEvent::RunStarted {
            target: connection.to_string(),
            stages: stages.len(),
        });

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FailureReport::new(
                None,
                FailureCause::Cancelled,
                "cancelled while connecting",
            )),
            opened = self.connector.open(connection, self.connect_timeout) => opened.map_err(|e| {
                FailureReport::new(None, FailureCause::Connection, e.detail())
            }),
        };

        let outcome = match opened {
            Ok(session) => {
                emit(ProgressEvent::Connected {
                    target: connection.to_string(),
                });
                let outcome = run_stages(&session, stages, &emit, cancel).await;
                session.close().await;
                outcome
            }
            Err(report) => Err(report),
        };

        match outcome {
            Ok(artifacts) => {
                info!("Pipeline run {} completed with {} artifact(s)", run_id, artifacts.len());
                emit(ProgressEvent::RunCompleted {
                    artifacts: artifacts.clone(),
                });
                PipelineResult::Completed { artifacts }
            }
            Err(report) => {
                if report.is_cancelled() {
                    warn!("Pipeline run {} cancelled at {}", run_id, report);
                } else {
                    error!("Pipeline run {} failed at {}", run_id, report);
                }
                emit(ProgressEvent::RunFailed {
                    report: report.clone(),
                });
                PipelineResult::Failed(report)
            }
        }
    }
}

async fn run_stages<S, F>(
    session: &S,
    stages: &[StageSpec],
    emit: &F,
    cancel: &CancelToken,
) -> Result<Vec<Artifact>, FailureReport>
where
    S: RemoteSession,
    F: Fn(ProgressEvent),
{
    let executor = StageExecutor::new(session);
    let mut artifacts = Vec::new();

    for (index, stage) in stages.iter().enumerate() {
        emit(ProgressEvent::StageStarted {
            index,
            kind: stage.kind(),
            message: stage.describe(),
        });

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Cancelling during stage {}", index);
                // Unblocks the abandoned libssh2 call
                session.terminate();
                return Err(FailureReport::new(
                    Some(index),
                    FailureCause::Cancelled,
                    "cancelled by caller",
                ));
            }
            outcome = executor.execute(index, stage) => outcome,
        };

        let done = outcome.map_err(|failure| failure.into_report(index))?;
        if let Some(artifact) = done.artifact {
            emit(ProgressEvent::ArtifactReady {
                index,
                artifact: artifact.clone(),
            });
            artifacts.push(artifact);
        }
        emit(ProgressEvent::StageCompleted {
            index,
            message: done.message,
        });
    }

    Ok(artifacts)
}

/// A run executing on a background task
pub struct RunHandle {
    run_id: Uuid,
    events: mpsc::UnboundedReceiver<ProgressEvent>,
    cancel: CancelToken,
    task: JoinHandle<PipelineResult>,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Next progress event; `None` once the run has ended and all events are drained
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.events.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Wait for the terminal result
    pub async fn wait(self) -> PipelineResult {
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                error!("Pipeline run {} task failed: {}", self.run_id, e);
                PipelineResult::Failed(FailureReport::new(
                    None,
                    FailureCause::Execution,
                    format!("run task failed: {}", e),
                ))
            }
        }
    }
}
