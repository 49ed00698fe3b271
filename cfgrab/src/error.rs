//! Error types for cfgrab.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::credential::CredentialRole;

/// Main error type for cfgrab operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Session protocol failures (classified per device)
    #[error("Session failed: {0}")]
    Session(#[from] SessionError),

    /// Vendor protocol definition errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Invocation/configuration errors detected before any I/O
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Credential loading errors
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),
}

impl Error {
    /// Classification of this error for aggregation across many devices.
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::Session(e) => e.kind(),
            Error::Transport(TransportError::AuthenticationFailed { .. }) => {
                FailureKind::AuthenticationFailed
            }
            Error::Transport(_) => FailureKind::Transport,
            Error::Protocol(_) | Error::Config(_) | Error::Credential(_) => FailureKind::Config,
        }
    }
}

/// Transport layer errors (SSH connection, authentication, channel I/O).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed at the SSH layer
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// Requested algorithm is not supported by the SSH implementation
    #[error("Unsupported {kind} algorithm '{name}'")]
    UnsupportedAlgorithm { kind: &'static str, name: String },

    /// Host key does not match the one in known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// Host is not in known_hosts and strict checking is on
    #[error("Host key for {host}:{port} is unknown")]
    HostKeyUnknown { host: String, port: u16 },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// The login credential cannot be sent as an SSH password
    #[error("Login credential is not valid UTF-8, cannot use it for SSH password authentication")]
    PasswordNotUtf8,

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Classified outcome of a failed device session.
///
/// Every variant carries the index of the step that was executing.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The post-login prompt never appeared after credential submission.
    #[error("Authentication failed at step {step}: {reason}")]
    AuthenticationFailed { step: usize, reason: String },

    /// No candidate pattern matched within the step's time bound.
    #[error("Timed out after {waited:?} at step {step} waiting for {}", quote_all(.patterns))]
    ExpectationTimeout {
        step: usize,
        patterns: Vec<String>,
        waited: Duration,
        /// Sanitized tail of the output received while waiting.
        tail: String,
    },

    /// The remote end closed the channel before the protocol completed.
    #[error("Channel closed at step {step}{}", reason_suffix(.reason))]
    TransportClosed { step: usize, reason: Option<String> },

    /// The device answered with something the protocol does not expect.
    #[error("Protocol mismatch at step {step}: expected {}, found '{found}'", quote_all(.expected))]
    ProtocolMismatch {
        step: usize,
        expected: Vec<String>,
        found: String,
    },

    /// The session was aborted by the caller or by its deadline.
    #[error("Session cancelled at step {step} ({reason})")]
    Cancelled { step: usize, reason: CancelReason },
}

impl SessionError {
    /// Classification of this failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            SessionError::AuthenticationFailed { .. } => FailureKind::AuthenticationFailed,
            SessionError::ExpectationTimeout { .. } => FailureKind::ExpectationTimeout,
            SessionError::TransportClosed { .. } => FailureKind::TransportClosed,
            SessionError::ProtocolMismatch { .. } => FailureKind::ProtocolMismatch,
            SessionError::Cancelled { .. } => FailureKind::Cancelled,
        }
    }

    /// Index of the step that was executing when the session failed.
    pub fn step(&self) -> usize {
        match self {
            SessionError::AuthenticationFailed { step, .. }
            | SessionError::ExpectationTimeout { step, .. }
            | SessionError::TransportClosed { step, .. }
            | SessionError::ProtocolMismatch { step, .. }
            | SessionError::Cancelled { step, .. } => *step,
        }
    }

    /// Whether the channel is known to be gone, so no termination should be attempted.
    pub(crate) fn channel_closed(&self) -> bool {
        matches!(self, SessionError::TransportClosed { .. })
    }
}

/// Why a session was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Explicit caller-initiated abort.
    Requested,
    /// The whole-session deadline passed.
    Deadline,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Requested => write!(f, "requested"),
            CancelReason::Deadline => write!(f, "deadline exceeded"),
        }
    }
}

/// Coarse failure classification, one per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureKind {
    AuthenticationFailed,
    ExpectationTimeout,
    TransportClosed,
    ProtocolMismatch,
    Cancelled,
    Transport,
    Config,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::AuthenticationFailed => "authentication-failed",
            FailureKind::ExpectationTimeout => "expectation-timeout",
            FailureKind::TransportClosed => "transport-closed",
            FailureKind::ProtocolMismatch => "protocol-mismatch",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Transport => "transport",
            FailureKind::Config => "config",
        };
        f.write_str(name)
    }
}

/// Vendor protocol definition errors.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Invalid protocol definition
    #[error("Invalid protocol definition '{name}': {message}")]
    InvalidDefinition { name: String, message: String },

    /// Device family not in the registry
    #[error("Unknown device family: {name}")]
    UnknownFamily { name: String },

    /// Device family already registered
    #[error("Device family already registered: {name}")]
    AlreadyRegistered { name: String },

    /// Template refers to a variable that does not exist
    #[error("Unknown placeholder '{{{placeholder}}}' in '{template}'")]
    UnknownPlaceholder {
        placeholder: String,
        template: String,
    },

    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Invocation errors raised before any channel I/O begins.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The protocol needs a credential that was not supplied.
    #[error("Device family '{family}' requires a {role} credential, none was supplied")]
    MissingCredential {
        family: String,
        role: CredentialRole,
    },

    /// A field failed validation.
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    /// An output filter pattern is not a valid regex.
    #[error("Invalid filter pattern '{pattern}': {source}")]
    InvalidFilter {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The inventory file could not be read.
    #[error("Failed to read inventory '{}': {source}", .path.display())]
    InventoryRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The inventory file is not valid JSON for the expected schema.
    #[error("Failed to parse inventory '{}': {source}", .path.display())]
    InventoryParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Credential loading errors.
#[derive(Error, Debug)]
pub enum CredentialError {
    /// The credential file could not be read.
    #[error("Failed to read {role} credential from '{}': {source}", .path.display())]
    Read {
        role: CredentialRole,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The source has nothing configured for this role.
    #[error("No {0} credential configured")]
    NotConfigured(CredentialRole),
}

fn quote_all(items: &[String]) -> String {
    items
        .iter()
        .map(|p| format!("'{}'", p))
        .collect::<Vec<_>>()
        .join(" | ")
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_ref()
        .map(|r| format!(": {}", r))
        .unwrap_or_default()
}

/// Result type alias using cfgrab's Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_lists_patterns() {
        let err = SessionError::ExpectationTimeout {
            step: 2,
            patterns: vec!["r1#".to_string(), "--More--".to_string()],
            waited: Duration::from_secs(30),
            tail: String::new(),
        };
        let msg = err.to_string();
        assert!(msg.contains("step 2"));
        assert!(msg.contains("'r1#' | '--More--'"));
        assert_eq!(err.kind(), FailureKind::ExpectationTimeout);
        assert_eq!(err.step(), 2);
    }

    #[test]
    fn test_error_kind_for_config() {
        let err: Error = ConfigError::MissingCredential {
            family: "extended_cli".to_string(),
            role: CredentialRole::Privileged,
        }
        .into();
        assert_eq!(err.kind(), FailureKind::Config);
        assert!(err.to_string().contains("privileged credential"));
    }

    #[test]
    fn test_transport_closed_message() {
        let err = SessionError::TransportClosed {
            step: 1,
            reason: None,
        };
        assert_eq!(err.to_string(), "Channel closed at step 1");
        assert!(err.channel_closed());
    }
}
