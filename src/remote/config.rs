//! SSH session configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How the server's host key is checked against the known-hosts file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Record unknown hosts, reject changed keys
    #[default]
    TrustOnFirstUse,
    /// Reject hosts that are not already known
    Strict,
    /// Skip verification entirely
    AcceptAny,
}

/// Configuration for the SSH connector
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Host key verification policy
    pub host_key_policy: HostKeyPolicy,

    /// Known-hosts file; `None` means `~/.ssh/known_hosts`
    pub known_hosts_path: Option<PathBuf>,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }

    pub fn with_known_hosts(mut self, path: PathBuf) -> Self {
        self.known_hosts_path = Some(path);
        self
    }

    /// Resolved known-hosts location
    pub fn known_hosts_file(&self) -> Option<PathBuf> {
        self.known_hosts_path
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(".ssh").join("known_hosts")))
    }
}
