//! Channel layer: the byte stream to a remote shell and everything that
//! observes it.
//!
//! This module handles reading the interactive terminal, incremental
//! pattern detection over a sliding window, and gating which bytes end up
//! in the captured configuration.

mod ansi;
mod buffer;
mod capture;
mod patterns;
mod stream;

pub use ansi::printable;
pub use buffer::ReadBuffer;
pub use capture::{CaptureBuffer, CaptureTransition, CaptureWindow};
pub use patterns::{Anchor, MatchOutcome, Pattern, PatternMatch, PatternMatcher};
pub use stream::StreamChannel;

use std::future::Future;

use bytes::Bytes;

use crate::error::TransportError;

/// An established bidirectional byte stream to a remote interactive shell.
///
/// The transport collaborator owns connection setup; the session engine only
/// reads, writes and finally asks for the channel to be closed.
pub trait TerminalChannel: Send {
    /// Wait for the next chunk of output. `Ok(None)` means the remote end
    /// closed the stream.
    fn read_chunk(&mut self) -> impl Future<Output = Result<Option<Bytes>, TransportError>> + Send;

    /// Write all bytes to the remote shell.
    fn write_all(&mut self, data: &[u8]) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Ask the transport to close the stream.
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Whether the transport already presented the login credential, making
    /// the in-band login step unnecessary.
    fn login_completed(&self) -> bool {
        false
    }
}
