//! Pipeline domain model

use crate::core::{
    config::PipelineConfig,
    stage::{Artifact, StageKind, StageSpec},
};
use anyhow::Result;
use std::collections::HashMap;
use std::time::Duration;

/// A resolved pipeline definition: an ordered stage list ready to run
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Optional description from the definition file
    pub description: Option<String>,

    /// Stages in execution order
    pub stages: Vec<StageSpec>,

    /// Connect timeout requested by the definition, if any
    pub connect_timeout: Option<Duration>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, stages: Vec<StageSpec>) -> Self {
        Self {
            name: name.into(),
            description: None,
            stages,
            connect_timeout: None,
        }
    }

    /// Build a pipeline from configuration, resolving `{{ var }}` placeholders.
    ///
    /// `overrides` take precedence over the variables declared in the file.
    pub fn from_config(config: &PipelineConfig, overrides: &HashMap<String, String>) -> Result<Self> {
        let mut variables = config.variables.clone();
        variables.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

        let stages = config
            .stages
            .iter()
            .map(|stage| config.render_stage(stage, &variables))
            .collect::<Result<Vec<_>>>()?;

        validate_stages(&stages)?;

        Ok(Pipeline {
            name: config.name.clone(),
            description: config.description.clone(),
            stages,
            connect_timeout: config.connect_timeout_secs.map(Duration::from_secs),
        })
    }

    /// Number of stages of the given kind
    pub fn count(&self, kind: StageKind) -> usize {
        self.stages.iter().filter(|s| s.kind() == kind).count()
    }

    /// Artifacts a successful run will report, in stage order
    pub fn expected_artifacts(&self) -> Vec<Artifact> {
        self.stages.iter().filter_map(StageSpec::artifact).collect()
    }
}

/// Reject stage lists that cannot be run safely
pub fn validate_stages(stages: &[StageSpec]) -> Result<()> {
    for (index, stage) in stages.iter().enumerate() {
        match stage {
            StageSpec::ClearDir { remote_dir } => {
                let trimmed = remote_dir.trim().trim_end_matches('/');
                if trimmed.is_empty() || trimmed == "~" {
                    anyhow::bail!(
                        "Stage {} refuses to clear '{}': directory must not be the filesystem root or home",
                        index,
                        remote_dir
                    );
                }
                // `.` and `..` can resolve back to root or above home
                if trimmed.split('/').any(|part| part == "." || part == "..") {
                    anyhow::bail!(
                        "Stage {} refuses to clear '{}': path must not contain '.' or '..' components",
                        index,
                        remote_dir
                    );
                }
            }
            StageSpec::Upload { local, remote } => {
                if local.as_os_str().is_empty() || remote.trim().is_empty() {
                    anyhow::bail!("Stage {} upload needs both a local and a remote path", index);
                }
            }
            StageSpec::RemoteExec { command } => {
                if command.trim().is_empty() {
                    anyhow::bail!("Stage {} has an empty remote command", index);
                }
            }
            StageSpec::Download { remote, local, .. } => {
                if local.as_os_str().is_empty() || remote.trim().is_empty() {
                    anyhow::bail!("Stage {} download needs both a remote and a local path", index);
                }
            }
        }
    }

    Ok(())
}
