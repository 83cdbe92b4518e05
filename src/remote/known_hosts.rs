//! Host key verification against an OpenSSH known-hosts file

use crate::remote::{config::HostKeyPolicy, error::RemoteError};
use ssh2::{CheckResult, KnownHostFileKind, KnownHostKeyFormat, Session};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

/// What to do with the server key after looking it up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HostKeyDecision {
    Accept,
    Record,
    Reject(&'static str),
}

pub(crate) fn decide(policy: HostKeyPolicy, check: CheckResult) -> HostKeyDecision {
    match (policy, check) {
        (HostKeyPolicy::AcceptAny, _) => HostKeyDecision::Accept,
        (_, CheckResult::Match) => HostKeyDecision::Accept,
        (_, CheckResult::Mismatch) => {
            HostKeyDecision::Reject("host key does not match the known-hosts entry")
        }
        (_, CheckResult::Failure) => HostKeyDecision::Reject("host key check failed"),
        (HostKeyPolicy::Strict, CheckResult::NotFound) => {
            HostKeyDecision::Reject("host is not in the known-hosts file")
        }
        (HostKeyPolicy::TrustOnFirstUse, CheckResult::NotFound) => HostKeyDecision::Record,
    }
}

/// Known-hosts name for a host; non-default ports use `[host]:port`
pub(crate) fn entry_name(host: &str, port: u16) -> String {
    if port == 22 {
        host.to_string()
    } else {
        format!("[{}]:{}", host, port)
    }
}

/// Check the key the server presented during the handshake
pub(crate) fn verify(
    session: &Session,
    host: &str,
    port: u16,
    policy: HostKeyPolicy,
    file: Option<&Path>,
) -> Result<(), RemoteError> {
    if policy == HostKeyPolicy::AcceptAny {
        debug!("Skipping host key check for {}", host);
        return Ok(());
    }

    let (key, key_type) = session
        .host_key()
        .ok_or_else(|| RemoteError::Connection("server presented no host key".to_string()))?;

    let mut known_hosts = session
        .known_hosts()
        .map_err(|e| RemoteError::Connection(format!("known hosts: {}", e)))?;

    if let Some(path) = file.filter(|p| p.exists()) {
        known_hosts
            .read_file(path, KnownHostFileKind::OpenSSH)
            .map_err(|e| {
                RemoteError::Connection(format!("reading {}: {}", path.display(), e))
            })?;
    }

    match decide(policy, known_hosts.check_port(host, port, key)) {
        HostKeyDecision::Accept => Ok(()),
        HostKeyDecision::Reject(reason) => {
            warn!("Rejecting host key for {}: {}", host, reason);
            Err(RemoteError::Connection(format!("{}: {}", host, reason)))
        }
        HostKeyDecision::Record => {
            let Some(path) = file else {
                return Ok(());
            };
            let name = entry_name(host, port);
            info!("Adding {} to {}", name, path.display());
            let line = entry_line(session, &name, key, KnownHostKeyFormat::from(key_type))?;
            append_entry(path, &line)
        }
    }
}

/// One OpenSSH known-hosts line for `name`, rendered by libssh2
pub(crate) fn entry_line(
    session: &Session,
    name: &str,
    key: &[u8],
    format: KnownHostKeyFormat,
) -> Result<String, RemoteError> {
    let known_err = |e: ssh2::Error| RemoteError::Connection(format!("known hosts: {}", e));

    // A fresh collection holds only the new entry
    let mut fresh = session.known_hosts().map_err(known_err)?;
    fresh.add(name, key, "", format).map_err(known_err)?;
    let hosts = fresh.hosts().map_err(known_err)?;
    let entry = hosts
        .first()
        .ok_or_else(|| RemoteError::Connection(format!("known hosts: no entry for {}", name)))?;

    fresh
        .write_string(entry, KnownHostFileKind::OpenSSH)
        .map_err(known_err)
}

/// Append a line to the known-hosts file, leaving existing content untouched
pub(crate) fn append_entry(path: &Path, line: &str) -> Result<(), RemoteError> {
    let io_err =
        |e: std::io::Error| RemoteError::Connection(format!("writing {}: {}", path.display(), e));

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let needs_newline = match std::fs::read(path) {
        Ok(existing) => existing.last().is_some_and(|byte| *byte != b'\n'),
        Err(_) => false,
    };

    let mut text = String::new();
    if needs_newline {
        text.push('\n');
    }
    text.push_str(line.trim_end());
    text.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;
    file.write_all(text.as_bytes()).map_err(io_err)
}
