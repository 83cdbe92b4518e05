//! CLI command definitions

use clap::Args;
use crate::remote::HostKeyPolicy;
use std::collections::HashMap;
use std::path::PathBuf;

/// Environment variable the password is read from when `--password` is absent
pub const PASSWORD_ENV: &str = "REMOTE_PIPELINE_PASSWORD";

/// Run a pipeline against a remote host
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Remote host (overrides the file)
    #[arg(long)]
    pub host: Option<String>,

    /// SSH port (overrides the file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Login user (overrides the file)
    #[arg(short, long)]
    pub user: Option<String>,

    /// Login password
    #[arg(long, env = PASSWORD_ENV, hide_env_values = true)]
    pub password: Option<String>,

    /// Variable overrides (key=value)
    #[arg(long = "var", value_parser = parse_key_value)]
    pub variable: Vec<(String, String)>,

    /// Host key verification
    #[arg(long, value_enum, default_value_t = HostKeyPolicyArg::TrustOnFirstUse)]
    pub host_key_policy: HostKeyPolicyArg,

    /// Known-hosts file (defaults to ~/.ssh/known_hosts)
    #[arg(long)]
    pub known_hosts: Option<PathBuf>,

    /// Connect timeout in seconds (overrides the file)
    #[arg(long)]
    pub connect_timeout: Option<u64>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunCommand {
    pub fn overrides(&self) -> HashMap<String, String> {
        self.variable.iter().cloned().collect()
    }
}

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Variable overrides (key=value)
    #[arg(long = "var", value_parser = parse_key_value)]
    pub variable: Vec<(String, String)>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

impl ValidateCommand {
    pub fn overrides(&self) -> HashMap<String, String> {
        self.variable.iter().cloned().collect()
    }
}

/// Host key policy argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum HostKeyPolicyArg {
    #[clap(name = "trust-on-first-use")]
    TrustOnFirstUse,
    Strict,
    #[clap(name = "accept-any")]
    AcceptAny,
}

impl From<HostKeyPolicyArg> for HostKeyPolicy {
    fn from(arg: HostKeyPolicyArg) -> Self {
        match arg {
            HostKeyPolicyArg::TrustOnFirstUse => HostKeyPolicy::TrustOnFirstUse,
            HostKeyPolicyArg::Strict => HostKeyPolicy::Strict,
            HostKeyPolicyArg::AcceptAny => HostKeyPolicy::AcceptAny,
        }
    }
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}
