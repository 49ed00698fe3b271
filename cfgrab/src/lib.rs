//! # cfgrab
//!
//! Async running-configuration retrieval from interactive network device
//! shells.
//!
//! cfgrab logs into a device over an SSH PTY, walks a vendor-specific
//! dialogue (login, privilege escalation, pager suppression, the dump
//! command, logout) and returns exactly the configuration text the device
//! printed. Nothing it typed, no prompt, and no credential ends up in the
//! capture.
//!
//! ## Features
//!
//! - Async SSH connections via russh, with per-device kex, cipher and
//!   host-key algorithm preferences
//! - Vendor protocols as data: ordered steps of expect/reject patterns and
//!   actions, four device families built in
//! - Incremental pattern matching over a sliding window of recent output
//! - Pager handling through repeatable patterns
//! - Classified failures (authentication, timeout, channel closed, protocol
//!   mismatch, cancelled) that carry the failing step
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cfgrab::credential::{CredentialSet, FileCredentialSource};
//! use cfgrab::transport::{SshConfig, SshTransport};
//! use cfgrab::{DeviceTarget, EngineConfig, ProtocolRegistry, SessionEngine, SessionPlan};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), cfgrab::Error> {
//!     let target = DeviceTarget::new("r1.lab.example.net", "backup");
//!     let protocol = ProtocolRegistry::lookup("enable_shell")?;
//!     let credentials = CredentialSet::load_from(&FileCredentialSource::new("/etc/cfgrab/backup.pw"))?;
//!
//!     let plan = SessionPlan::new(&target, credentials, &protocol)?;
//!
//!     let transport = SshTransport::connect(SshConfig::for_target(&target), plan.credentials()).await?;
//!     let mut channel = transport.open_channel().await?;
//!     let config = SessionEngine::new(plan, EngineConfig::default())
//!         .run(&mut channel)
//!         .await?;
//!     print!("{}", config.as_str_lossy());
//!
//!     transport.close().await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod credential;
pub mod error;
pub mod filter;
pub mod inventory;
pub mod protocol;
pub mod session;
pub mod target;
pub mod transport;

// Re-export main types for convenience
pub use channel::{CaptureBuffer, TerminalChannel};
pub use credential::{Credential, CredentialRole, CredentialSet, CredentialSource};
pub use error::{Error, FailureKind, Result, SessionError};
pub use protocol::{ProtocolRegistry, VendorProtocol};
pub use session::{EngineConfig, SessionEngine, SessionPlan, SessionState};
pub use target::{DeviceTarget, Invocation};
pub use transport::{SshConfig, SshTransport};
