//! Terminal values of a pipeline run

use crate::core::stage::Artifact;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Why a run stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailureCause {
    /// Handshake, authentication, host key or connect timeout
    Connection,
    /// Transport failure while a command was running
    Execution,
    /// Transport failure while copying a file
    Transfer,
    /// A remote command that must succeed exited non-zero
    StageExit { code: i32 },
    /// The caller cancelled the run
    Cancelled,
}

/// The single failure that ended a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    /// Zero-based stage position; `None` while connecting
    pub stage: Option<usize>,
    pub cause: FailureCause,
    pub message: String,
}

impl FailureReport {
    pub fn new(stage: Option<usize>, cause: FailureCause, message: impl Into<String>) -> Self {
        Self {
            stage,
            cause,
            message: message.into(),
        }
    }

    /// Stage position with the connect phase reported as -1
    pub fn stage_index(&self) -> i64 {
        self.stage.map(|i| i as i64).unwrap_or(-1)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cause == FailureCause::Cancelled
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            Some(index) => write!(f, "stage {}: {}", index, self.message),
            None => write!(f, "connect: {}", self.message),
        }
    }
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineResult {
    /// Every stage ran; artifacts are listed in stage order
    Completed { artifacts: Vec<Artifact> },
    Failed(FailureReport),
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineResult::Completed { .. })
    }

    pub fn artifacts(&self) -> &[Artifact] {
        match self {
            PipelineResult::Completed { artifacts } => artifacts,
            PipelineResult::Failed(_) => &[],
        }
    }

    pub fn artifact_paths(&self) -> Vec<&Path> {
        self.artifacts().iter().map(|a| a.path.as_path()).collect()
    }

    pub fn failure(&self) -> Option<&FailureReport> {
        match self {
            PipelineResult::Failed(report) => Some(report),
            PipelineResult::Completed { .. } => None,
        }
    }
}
