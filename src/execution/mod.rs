//! Pipeline execution

pub mod cancel;
pub mod event;
pub mod executor;
pub mod runner;

pub use cancel::CancelToken;
pub use event::ProgressEvent;
pub use executor::{StageCompletion, StageExecutor, StageFailure};
pub use runner::{PipelineRunner, RunHandle, RunnerError, DEFAULT_CONNECT_TIMEOUT};
