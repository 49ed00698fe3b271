//! SSH connection configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::target::{CryptoParams, DeviceTarget};

/// Host key verification mode, analogous to OpenSSH's `StrictHostKeyChecking`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostKeyVerification {
    /// Reject unknown and changed keys. Connection fails if the host
    /// is not already in known_hosts.
    Strict,

    /// Accept and auto-learn unknown keys, but reject changed keys.
    #[default]
    AcceptNew,

    /// Accept all keys without checking. For lab use only.
    Disabled,
}

impl FromStr for HostKeyVerification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" | "yes" => Ok(HostKeyVerification::Strict),
            "accept-new" => Ok(HostKeyVerification::AcceptNew),
            "disabled" | "no" => Ok(HostKeyVerification::Disabled),
            other => Err(format!(
                "unknown host key verification mode '{}' (expected strict, accept-new or disabled)",
                other
            )),
        }
    }
}

impl fmt::Display for HostKeyVerification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKeyVerification::Strict => write!(f, "strict"),
            HostKeyVerification::AcceptNew => write!(f, "accept-new"),
            HostKeyVerification::Disabled => write!(f, "disabled"),
        }
    }
}

/// How the user is authenticated at the SSH layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportAuth {
    /// `none` authentication; the device asks for the password in-band.
    #[default]
    None,

    /// Present the login credential as the SSH password. The in-band login
    /// step of the protocol is then skipped.
    Password,
}

impl FromStr for TransportAuth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(TransportAuth::None),
            "password" => Ok(TransportAuth::Password),
            other => Err(format!(
                "unknown transport auth '{}' (expected none or password)",
                other
            )),
        }
    }
}

/// SSH connection configuration.
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Target host (hostname or IP address).
    pub host: String,

    /// SSH port (default: 22).
    pub port: u16,

    /// Username for authentication.
    pub username: String,

    /// Authentication mode.
    pub auth: TransportAuth,

    /// Connection timeout.
    pub timeout: Duration,

    /// Algorithms to prefer during negotiation.
    pub crypto: CryptoParams,

    /// Terminal width for PTY.
    pub terminal_width: u32,

    /// Terminal height for PTY.
    pub terminal_height: u32,

    /// Host key verification mode.
    pub host_key_verification: HostKeyVerification,

    /// Path to known_hosts file.
    pub known_hosts_path: Option<PathBuf>,
}

impl SshConfig {
    /// Configuration for a device target with default settings.
    pub fn for_target(target: &DeviceTarget) -> Self {
        Self {
            host: target.host().to_string(),
            port: 22,
            username: target.user().to_string(),
            auth: TransportAuth::default(),
            timeout: Duration::from_secs(30),
            crypto: target.crypto().clone(),
            terminal_width: 511,
            terminal_height: 24,
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
        }
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the authentication mode.
    pub fn with_auth(mut self, auth: TransportAuth) -> Self {
        self.auth = auth;
        self
    }

    /// Set the connection timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set terminal dimensions.
    pub fn with_terminal_size(mut self, width: u32, height: u32) -> Self {
        self.terminal_width = width;
        self.terminal_height = height;
        self
    }

    /// Set the host key verification mode.
    pub fn with_host_key_verification(mut self, mode: HostKeyVerification) -> Self {
        self.host_key_verification = mode;
        self
    }

    /// Use a specific known_hosts file.
    pub fn with_known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    /// Get the socket address for connection.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
