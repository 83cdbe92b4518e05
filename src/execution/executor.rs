//! Stage executor - runs a single stage on an open session

use crate::{
    core::{Artifact, ExitPolicy, FailureCause, FailureReport, StageSpec},
    remote::{shell, CommandOutput, RemoteError, RemoteSession},
};
use tracing::{debug, info, warn};

/// A stage that finished without aborting the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCompletion {
    pub message: String,
    pub artifact: Option<Artifact>,
}

/// Why a stage aborted the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub cause: FailureCause,
    pub message: String,
}

impl StageFailure {
    pub fn into_report(self, index: usize) -> FailureReport {
        FailureReport::new(Some(index), self.cause, self.message)
    }
}

impl From<RemoteError> for StageFailure {
    fn from(err: RemoteError) -> Self {
        let cause = match &err {
            RemoteError::Connection(_) => FailureCause::Connection,
            RemoteError::Execution(_) => FailureCause::Execution,
            RemoteError::Transfer(_) => FailureCause::Transfer,
        };
        Self {
            cause,
            message: err.detail().to_string(),
        }
    }
}

/// Message for a command that exited non-zero
fn exit_message(command: &str, output: &CommandOutput) -> String {
    let stderr = output.stderr.trim();
    if stderr.is_empty() {
        format!("`{}` exited with status {}", command, output.exit_code)
    } else {
        stderr.to_string()
    }
}

/// Executes stages one at a time on a borrowed session
pub struct StageExecutor<'s, S: ?Sized> {
    session: &'s S,
}

impl<'s, S: RemoteSession + ?Sized> StageExecutor<'s, S> {
    pub fn new(session: &'s S) -> Self {
        Self { session }
    }

    /// Execute a stage and return its completion or the failure to report
    pub async fn execute(
        &self,
        index: usize,
        stage: &StageSpec,
    ) -> Result<StageCompletion, StageFailure> {
        info!("Executing stage {}: {}", index, stage.describe());

        match stage {
            StageSpec::ClearDir { remote_dir } => {
                let command = shell::clear_dir_command(remote_dir);
                let output = self.session.run_command(&command).await?;
                self.check_exit(stage, &command, &output)?;
                Ok(StageCompletion {
                    message: format!("Cleared {}", remote_dir),
                    artifact: None,
                })
            }
            StageSpec::Upload { local, remote } => {
                self.session.put_file(local, remote).await?;
                Ok(StageCompletion {
                    message: format!("Uploaded {} -> {}", local.display(), remote),
                    artifact: None,
                })
            }
            StageSpec::RemoteExec { command } => {
                let output = self.session.run_command(command).await?;
                if !output.stdout.trim().is_empty() {
                    debug!("stage {} stdout:\n{}", index, output.stdout.trim_end());
                }
                self.check_exit(stage, command, &output)?;
                Ok(StageCompletion {
                    message: format!("Finished {}", command),
                    artifact: None,
                })
            }
            StageSpec::Download { remote, local, .. } => {
                self.session.get_file(remote, local).await?;
                Ok(StageCompletion {
                    message: format!("Downloaded {} -> {}", remote, local.display()),
                    artifact: stage.artifact(),
                })
            }
        }
    }

    fn check_exit(
        &self,
        stage: &StageSpec,
        command: &str,
        output: &CommandOutput,
    ) -> Result<(), StageFailure> {
        if output.success() {
            return Ok(());
        }

        match stage.exit_policy() {
            Some(ExitPolicy::MustSucceed) => Err(StageFailure {
                cause: FailureCause::StageExit {
                    code: output.exit_code,
                },
                message: exit_message(command, output),
            }),
            Some(ExitPolicy::BestEffort) | None => {
                warn!(
                    "Ignoring exit status {} from `{}`: {}",
                    output.exit_code,
                    command,
                    output.stderr.trim()
                );
                Ok(())
            }
        }
    }
}
