//! SSH sessions backed by libssh2
//!
//! libssh2 calls block, so every operation runs on the blocking pool. A clone
//! of the TCP socket is kept so `terminate` can shut the transport down while
//! another thread is stuck inside libssh2.

use crate::{
    core::ConnectionSpec,
    remote::{
        config::SessionConfig, error::RemoteError, known_hosts, shell, CommandOutput,
        RemoteSession, SessionConnector,
    },
};
use async_trait::async_trait;
use ssh2::Session;
use std::fs::File;
use std::io::Read;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Mode given to uploaded files
const UPLOAD_MODE: i32 = 0o644;

/// Bound on the disconnect handshake when closing
const CLOSE_TIMEOUT_MS: u32 = 2_000;

/// Opens password-authenticated SSH sessions
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    config: SessionConfig,
}

impl SshConnector {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

#[async_trait]
impl SessionConnector for SshConnector {
    type Session = SshSession;

    async fn open(
        &self,
        spec: &ConnectionSpec,
        timeout: Duration,
    ) -> Result<SshSession, RemoteError> {
        info!("Connecting to {}", spec);
        let spec = spec.clone();
        let config = self.config.clone();

        let task = tokio::task::spawn_blocking(move || connect(&spec, &config, timeout));

        // libssh2's own timeout does not cover name resolution
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(RemoteError::Connection(format!(
                "connect task panicked: {}",
                e
            ))),
            Err(_) => Err(RemoteError::Connection(format!(
                "timed out after {}s",
                timeout.as_secs_f32()
            ))),
        }
    }
}

fn timeout_millis(timeout: Duration) -> u32 {
    timeout.as_millis().min(u32::MAX as u128) as u32
}

fn connect(
    spec: &ConnectionSpec,
    config: &SessionConfig,
    timeout: Duration,
) -> Result<SshSession, RemoteError> {
    let conn_err = |context: &str, e: &dyn std::fmt::Display| {
        RemoteError::Connection(format!("{}: {}", context, e))
    };

    let addr = (spec.host(), spec.port())
        .to_socket_addrs()
        .map_err(|e| conn_err(&format!("resolving {}", spec.host()), &e))?
        .next()
        .ok_or_else(|| RemoteError::Connection(format!("no address for {}", spec.host())))?;

    let tcp = TcpStream::connect_timeout(&addr, timeout)
        .map_err(|e| conn_err(&format!("connecting to {}", spec.address()), &e))?;
    let stream = tcp
        .try_clone()
        .map_err(|e| conn_err("cloning socket", &e))?;

    let mut session = Session::new().map_err(|e| conn_err("creating session", &e))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(timeout_millis(timeout));
    session
        .handshake()
        .map_err(|e| conn_err("handshake", &e))?;

    known_hosts::verify(
        &session,
        spec.host(),
        spec.port(),
        config.host_key_policy,
        config.known_hosts_file().as_deref(),
    )?;

    session
        .userauth_password(spec.username(), spec.secret().expose())
        .map_err(|e| conn_err("authentication failed", &e))?;
    if !session.authenticated() {
        return Err(RemoteError::Connection(format!(
            "authentication failed for {}",
            spec.username()
        )));
    }

    // Remote commands may run for a long time
    session.set_timeout(0);

    debug!("Authenticated as {}", spec.username());
    Ok(SshSession {
        session,
        stream: Arc::new(stream),
        host: spec.host().to_string(),
        closed: Arc::new(AtomicBool::new(false)),
    })
}

/// An authenticated libssh2 session
pub struct SshSession {
    session: Session,
    stream: Arc<TcpStream>,
    host: String,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for SshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession")
            .field("host", &self.host)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

async fn blocking<T, F>(
    f: F,
    wrap: fn(String) -> RemoteError,
) -> Result<T, RemoteError>
where
    F: FnOnce() -> Result<T, RemoteError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| wrap(format!("task panicked: {}", e)))?
}

fn read_all(reader: &mut impl Read) -> std::io::Result<String> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn exec(session: &Session, command: &str) -> Result<CommandOutput, RemoteError> {
    let ssh_err = |e: ssh2::Error| RemoteError::Execution(e.to_string());
    let io_err = |e: std::io::Error| RemoteError::Execution(e.to_string());

    let mut channel = session.channel_session().map_err(ssh_err)?;
    channel.exec(command).map_err(ssh_err)?;

    let stdout = read_all(&mut channel).map_err(io_err)?;
    let stderr = read_all(&mut channel.stderr()).map_err(io_err)?;

    channel.wait_close().map_err(ssh_err)?;
    let exit_code = channel.exit_status().map_err(ssh_err)?;

    Ok(CommandOutput {
        exit_code,
        stdout,
        stderr,
    })
}

fn upload(session: &Session, local: &Path, remote: &str) -> Result<(), RemoteError> {
    let ssh_err = |e: ssh2::Error| RemoteError::Transfer(format!("{}: {}", remote, e));
    let io_err = |context: &Path, e: std::io::Error| {
        RemoteError::Transfer(format!("{}: {}", context.display(), e))
    };

    let mut file = File::open(local).map_err(|e| io_err(local, e))?;
    let size = file.metadata().map_err(|e| io_err(local, e))?.len();

    let mut channel = session
        .scp_send(&shell::scp_path(remote), UPLOAD_MODE, size, None)
        .map_err(ssh_err)?;
    std::io::copy(&mut file, &mut channel).map_err(|e| io_err(local, e))?;

    channel.send_eof().map_err(ssh_err)?;
    channel.wait_eof().map_err(ssh_err)?;
    channel.close().map_err(ssh_err)?;
    channel.wait_close().map_err(ssh_err)
}

fn download(session: &Session, remote: &str, local: &Path) -> Result<(), RemoteError> {
    let ssh_err = |e: ssh2::Error| RemoteError::Transfer(format!("{}: {}", remote, e));

    let (mut channel, stat) = session
        .scp_recv(&shell::scp_path(remote))
        .map_err(ssh_err)?;
    write_local(&mut channel, stat.size(), local)?;

    channel.send_eof().map_err(ssh_err)?;
    channel.wait_eof().map_err(ssh_err)?;
    channel.close().map_err(ssh_err)?;
    channel.wait_close().map_err(ssh_err)
}

/// Write exactly `expected` bytes to `local`; a short or failed copy leaves no file
fn write_local(reader: &mut impl Read, expected: u64, local: &Path) -> Result<(), RemoteError> {
    let io_err = |e: std::io::Error| RemoteError::Transfer(format!("{}: {}", local.display(), e));

    if let Some(parent) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut file = File::create(local).map_err(io_err)?;
    let outcome = match std::io::copy(&mut reader.take(expected), &mut file) {
        Ok(copied) if copied == expected => Ok(()),
        Ok(copied) => Err(RemoteError::Transfer(format!(
            "{}: expected {} bytes, received {}",
            local.display(),
            expected,
            copied
        ))),
        Err(e) => Err(io_err(e)),
    };

    if outcome.is_err() {
        drop(file);
        let _ = std::fs::remove_file(local);
    }
    outcome
}

fn disconnect(session: &Session, stream: &TcpStream) {
    session.set_timeout(CLOSE_TIMEOUT_MS);
    if let Err(e) = session.disconnect(None, "pipeline finished", None) {
        debug!("Disconnect failed: {}", e);
    }
    let _ = stream.shutdown(Shutdown::Both);
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn run_command(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        debug!("[{}] $ {}", self.host, command);
        let session = self.session.clone();
        let command = command.to_string();
        blocking(move || exec(&session, &command), RemoteError::Execution).await
    }

    async fn put_file(&self, local: &Path, remote: &str) -> Result<(), RemoteError> {
        debug!("[{}] put {} -> {}", self.host, local.display(), remote);
        let session = self.session.clone();
        let local = local.to_path_buf();
        let remote = remote.to_string();
        blocking(move || upload(&session, &local, &remote), RemoteError::Transfer).await
    }

    async fn get_file(&self, remote: &str, local: &Path) -> Result<(), RemoteError> {
        debug!("[{}] get {} -> {}", self.host, remote, local.display());
        let session = self.session.clone();
        let remote = remote.to_string();
        let local: PathBuf = local.to_path_buf();
        blocking(move || download(&session, &remote, &local), RemoteError::Transfer).await
    }

    fn terminate(&self) {
        info!("Terminating connection to {}", self.host);
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!("Socket shutdown failed: {}", e);
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Closing connection to {}", self.host);

        let session = self.session.clone();
        let stream = self.stream.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || disconnect(&session, &stream)).await {
            warn!("Closing {} failed: {}", self.host, e);
        }
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            warn!("Session to {} dropped without close", self.host);
            disconnect(&self.session, &self.stream);
        }
    }
}
