//! Remote session over SSH

pub mod config;
pub mod error;
pub mod known_hosts;
pub mod shell;
pub mod ssh;

use crate::core::ConnectionSpec;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

pub use config::{HostKeyPolicy, SessionConfig};
pub use error::RemoteError;
pub use ssh::{SshConnector, SshSession};

/// Output of a remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// One authenticated connection to a remote host
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Run a shell command to completion. A non-zero exit is not an error.
    async fn run_command(&self, command: &str) -> Result<CommandOutput, RemoteError>;

    /// Copy a local file to `remote`, overwriting it
    async fn put_file(&self, local: &Path, remote: &str) -> Result<(), RemoteError>;

    /// Copy `remote` to a local file, creating parent directories
    async fn get_file(&self, remote: &str, local: &Path) -> Result<(), RemoteError>;

    /// Tear the transport down so that blocked calls fail promptly.
    /// Must not block.
    fn terminate(&self);

    /// Release the session. Calling it more than once is harmless.
    async fn close(&self);
}

/// Opens authenticated sessions
#[async_trait]
pub trait SessionConnector: Send + Sync {
    type Session: RemoteSession + 'static;

    /// Connect, handshake and authenticate within `timeout`
    async fn open(
        &self,
        spec: &ConnectionSpec,
        timeout: Duration,
    ) -> Result<Self::Session, RemoteError>;
}
