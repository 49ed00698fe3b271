//! SSH transport layer wrapping russh.
//!
//! This module provides the connection side of a device session: connection
//! setup with the requested key-exchange, cipher and host-key algorithms,
//! host key verification, authentication and a PTY shell channel that
//! implements [`TerminalChannel`](crate::channel::TerminalChannel).

pub mod config;
mod ssh;

pub use config::{HostKeyVerification, SshConfig, TransportAuth};
pub use ssh::{SshChannel, SshTransport};
