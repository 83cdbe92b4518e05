//! Pipeline configuration from YAML

use crate::core::{
    connection::{DEFAULT_PORT, DEFAULT_USERNAME},
    pipeline::{validate_stages, Pipeline},
    stage::StageSpec,
};
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// `{{ name }}` placeholder syntax used in stage fields
const PLACEHOLDER_PATTERN: &str = r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}";

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Default endpoint; command-line flags take precedence
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Connect timeout in seconds
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,

    /// Values for `{{ name }}` placeholders
    #[serde(default)]
    pub variables: HashMap<String, String>,

    /// Pipeline stages, in execution order
    pub stages: Vec<StageSpec>,
}

/// Endpoint defaults. The password is never read from the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub username: Option<String>,
}

impl ConnectionConfig {
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn username_or_default(&self) -> &str {
        self.username.as_deref().unwrap_or(DEFAULT_USERNAME)
    }
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the structure of the configuration.
    ///
    /// Placeholders are not resolved here; `--var` overrides may still supply them.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Pipeline name must not be empty");
        }

        if let Some(0) = self.connect_timeout_secs {
            anyhow::bail!("connect_timeout_secs must be greater than zero");
        }

        validate_stages(&self.stages)
    }

    /// Names of every placeholder referenced by the stages
    pub fn placeholders(&self) -> Result<BTreeSet<String>> {
        let regex = Regex::new(PLACEHOLDER_PATTERN)?;
        let mut names = BTreeSet::new();

        for stage in &self.stages {
            for field in stage_fields(stage) {
                for caps in regex.captures_iter(&field) {
                    names.insert(caps[1].to_string());
                }
            }
        }

        Ok(names)
    }

    /// Placeholders that neither the file nor `overrides` define
    pub fn missing_variables(&self, overrides: &HashMap<String, String>) -> Result<Vec<String>> {
        Ok(self
            .placeholders()?
            .into_iter()
            .filter(|name| !self.variables.contains_key(name) && !overrides.contains_key(name))
            .collect())
    }

    /// Substitute placeholders in every string field of a stage
    pub fn render_stage(&self, stage: &StageSpec, variables: &HashMap<String, String>) -> Result<StageSpec> {
        let regex = Regex::new(PLACEHOLDER_PATTERN)?;
        let render = |text: &str| render_template(&regex, text, variables);
        let render_path = |path: &PathBuf| -> Result<PathBuf> {
            Ok(PathBuf::from(render(&path.to_string_lossy())?))
        };

        let rendered = match stage {
            StageSpec::ClearDir { remote_dir } => StageSpec::ClearDir {
                remote_dir: render(remote_dir)?,
            },
            StageSpec::Upload { local, remote } => StageSpec::Upload {
                local: render_path(local)?,
                remote: render(remote)?,
            },
            StageSpec::RemoteExec { command } => StageSpec::RemoteExec {
                command: render(command)?,
            },
            StageSpec::Download {
                remote,
                local,
                artifact,
            } => StageSpec::Download {
                remote: render(remote)?,
                local: render_path(local)?,
                artifact: artifact.as_deref().map(|a| render(a)).transpose()?,
            },
        };

        Ok(rendered)
    }

    /// Convert config to a Pipeline domain model
    pub fn to_pipeline(&self, overrides: &HashMap<String, String>) -> Result<Pipeline> {
        Pipeline::from_config(self, overrides)
    }
}

fn stage_fields(stage: &StageSpec) -> Vec<String> {
    match stage {
        StageSpec::ClearDir { remote_dir } => vec![remote_dir.clone()],
        StageSpec::Upload { local, remote } => {
            vec![local.to_string_lossy().into_owned(), remote.clone()]
        }
        StageSpec::RemoteExec { command } => vec![command.clone()],
        StageSpec::Download {
            remote,
            local,
            artifact,
        } => {
            let mut fields = vec![remote.clone(), local.to_string_lossy().into_owned()];
            fields.extend(artifact.clone());
            fields
        }
    }
}

fn render_template(regex: &Regex, text: &str, variables: &HashMap<String, String>) -> Result<String> {
    let mut missing = Vec::new();
    let rendered = regex.replace_all(text, |caps: &regex::Captures| {
        let name = &caps[1];
        match variables.get(name) {
            Some(value) => value.clone(),
            None => {
                missing.push(name.to_string());
                caps[0].to_string()
            }
        }
    });

    if !missing.is_empty() {
        anyhow::bail!(
            "Undefined variable(s) {} in '{}'",
            missing.join(", "),
            text
        );
    }

    Ok(rendered.into_owned())
}
