//! remote-pipeline - run clear/upload/exec/download pipelines on a remote host over SSH

pub mod cli;
pub mod core;
pub mod execution;
pub mod remote;

// Re-export commonly used types
pub use core::{
    Artifact, ConnectionSpec, ExitPolicy, FailureCause, FailureReport, Pipeline, PipelineResult,
    Secret, StageKind, StageSpec,
};
pub use execution::{CancelToken, PipelineRunner, ProgressEvent, RunHandle, RunnerError};
pub use remote::{
    CommandOutput, HostKeyPolicy, RemoteError, RemoteSession, SessionConfig, SessionConnector,
    SshConnector, SshSession,
};
