//! Remote session error types

use thiserror::Error;

/// Error types for remote session operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Connect, handshake, host key or authentication failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Transport failure while running a command
    #[error("Execution error: {0}")]
    Execution(String),

    /// Transport or local I/O failure while copying a file
    #[error("Transfer error: {0}")]
    Transfer(String),
}

impl RemoteError {
    /// The message without the category prefix
    pub fn detail(&self) -> &str {
        match self {
            RemoteError::Connection(msg)
            | RemoteError::Execution(msg)
            | RemoteError::Transfer(msg) => msg,
        }
    }
}
