//! Connection endpoint and credential

use std::fmt;

/// Port used when none is given
pub const DEFAULT_PORT: u16 = 22;

/// Login used when none is given
pub const DEFAULT_USERNAME: &str = "root";

/// A credential that never shows up in logs or debug output
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw credential (only the transport should call this)
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Identifies exactly one remote endpoint and how to log into it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSpec {
    host: String,
    port: u16,
    username: String,
    secret: Secret,
}

impl ConnectionSpec {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        secret: Secret,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            secret,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn secret(&self) -> &Secret {
        &self.secret
    }

    /// `host:port`, suitable for socket address resolution
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ConnectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}
