//! Progress events emitted during a run

use crate::core::{Artifact, FailureReport, StageKind};
use serde::Serialize;

/// Events that occur during a pipeline run, in emission order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    RunStarted {
        target: String,
        stages: usize,
    },
    Connected {
        target: String,
    },
    StageStarted {
        index: usize,
        kind: StageKind,
        message: String,
    },
    StageCompleted {
        index: usize,
        message: String,
    },
    ArtifactReady {
        index: usize,
        artifact: Artifact,
    },
    RunCompleted {
        artifacts: Vec<Artifact>,
    },
    RunFailed {
        report: FailureReport,
    },
}

impl ProgressEvent {
    /// Human-readable line for logs and status bars
    pub fn message(&self) -> String {
        match self {
            ProgressEvent::RunStarted { target, stages } => {
                format!("Connecting to {} ({} stages)", target, stages)
            }
            ProgressEvent::Connected { target } => format!("Connected to {}", target),
            ProgressEvent::StageStarted { message, .. } => message.clone(),
            ProgressEvent::StageCompleted { message, .. } => message.clone(),
            ProgressEvent::ArtifactReady { artifact, .. } => {
                format!("{} ready: {}", artifact.kind, artifact.path.display())
            }
            ProgressEvent::RunCompleted { artifacts } => {
                format!("Pipeline completed, {} artifact(s)", artifacts.len())
            }
            ProgressEvent::RunFailed { report } => {
                if report.is_cancelled() {
                    "Pipeline cancelled".to_string()
                } else {
                    format!("Pipeline failed at {}", report)
                }
            }
        }
    }

    /// The artifact this event announces, if any
    pub fn artifact(&self) -> Option<&Artifact> {
        match self {
            ProgressEvent::ArtifactReady { artifact, .. } => Some(artifact),
            _ => None,
        }
    }

    /// Stage position the event belongs to
    pub fn stage_index(&self) -> Option<usize> {
        match self {
            ProgressEvent::StageStarted { index, .. }
            | ProgressEvent::StageCompleted { index, .. }
            | ProgressEvent::ArtifactReady { index, .. } => Some(*index),
            ProgressEvent::RunFailed { report } => report.stage,
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::RunCompleted { .. } | ProgressEvent::RunFailed { .. }
        )
    }
}
