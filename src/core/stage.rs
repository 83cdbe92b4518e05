//! Stage domain model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// One step of a pipeline definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageSpec {
    /// Remove the contents of a remote directory
    ClearDir {
        remote_dir: String,
    },

    /// Copy a local file to the remote host
    Upload {
        local: PathBuf,
        remote: String,
    },

    /// Run a command through the remote shell
    RemoteExec {
        command: String,
    },

    /// Copy a remote file back and report it as an artifact
    Download {
        remote: String,
        local: PathBuf,

        /// Artifact kind label; defaults to the local file stem
        #[serde(default, skip_serializing_if = "Option::is_none")]
        artifact: Option<String>,
    },
}

/// Stage kind without its parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    ClearDir,
    Upload,
    RemoteExec,
    Download,
}

/// How a stage treats the exit code of its remote command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPolicy {
    /// Non-zero exit is logged and ignored
    BestEffort,
    /// Non-zero exit aborts the run
    MustSucceed,
}

/// A local file produced by a download stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: String,
    pub path: PathBuf,
}

impl StageSpec {
    pub fn clear_dir(remote_dir: impl Into<String>) -> Self {
        StageSpec::ClearDir {
            remote_dir: remote_dir.into(),
        }
    }

    pub fn upload(local: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        StageSpec::Upload {
            local: local.into(),
            remote: remote.into(),
        }
    }

    pub fn remote_exec(command: impl Into<String>) -> Self {
        StageSpec::RemoteExec {
            command: command.into(),
        }
    }

    pub fn download(remote: impl Into<String>, local: impl Into<PathBuf>) -> Self {
        StageSpec::Download {
            remote: remote.into(),
            local: local.into(),
            artifact: None,
        }
    }

    /// Set the artifact label of a download stage; other kinds are returned unchanged
    pub fn with_artifact(self, label: impl Into<String>) -> Self {
        match self {
            StageSpec::Download { remote, local, .. } => StageSpec::Download {
                remote,
                local,
                artifact: Some(label.into()),
            },
            other => other,
        }
    }

    pub fn kind(&self) -> StageKind {
        match self {
            StageSpec::ClearDir { .. } => StageKind::ClearDir,
            StageSpec::Upload { .. } => StageKind::Upload,
            StageSpec::RemoteExec { .. } => StageKind::RemoteExec,
            StageSpec::Download { .. } => StageKind::Download,
        }
    }

    /// Exit-code policy for stages that run a remote command
    pub fn exit_policy(&self) -> Option<ExitPolicy> {
        match self {
            StageSpec::ClearDir { .. } => Some(ExitPolicy::BestEffort),
            StageSpec::RemoteExec { .. } => Some(ExitPolicy::MustSucceed),
            StageSpec::Upload { .. } | StageSpec::Download { .. } => None,
        }
    }

    /// The artifact this stage produces when it succeeds
    pub fn artifact(&self) -> Option<Artifact> {
        match self {
            StageSpec::Download {
                local, artifact, ..
            } => Some(Artifact {
                kind: artifact
                    .clone()
                    .unwrap_or_else(|| default_artifact_kind(local)),
                path: local.clone(),
            }),
            _ => None,
        }
    }

    /// Human-readable description used in progress messages
    pub fn describe(&self) -> String {
        match self {
            StageSpec::ClearDir { remote_dir } => format!("Clearing {}", remote_dir),
            StageSpec::Upload { local, remote } => {
                format!("Uploading {} -> {}", local.display(), remote)
            }
            StageSpec::RemoteExec { command } => format!("Running {}", command),
            StageSpec::Download { remote, local, .. } => {
                format!("Downloading {} -> {}", remote, local.display())
            }
        }
    }
}

fn default_artifact_kind(local: &Path) -> String {
    local
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string())
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageKind::ClearDir => "clear_dir",
            StageKind::Upload => "upload",
            StageKind::RemoteExec => "remote_exec",
            StageKind::Download => "download",
        };
        f.write_str(name)
    }
}
