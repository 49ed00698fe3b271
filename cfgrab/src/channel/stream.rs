//! Terminal channel over any async byte stream.
//!
//! Lets the engine drive a shell reachable through something other than the
//! bundled SSH transport: a telnet TCP stream, a spawned process's pipes, or
//! an in-memory transcript in tests.

use bytes::Bytes;
use log::trace;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::TerminalChannel;
use crate::error::TransportError;

const READ_CHUNK: usize = 4096;

/// [`TerminalChannel`] adapter for `AsyncRead + AsyncWrite` streams.
#[derive(Debug)]
pub struct StreamChannel<S> {
    stream: S,
    read_buf: Box<[u8]>,
    login_completed: bool,
}

impl<S> StreamChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            read_buf: vec![0; READ_CHUNK].into_boxed_slice(),
            login_completed: false,
        }
    }

    /// Mark the login as already handled by whatever opened the stream.
    pub fn with_login_completed(mut self, completed: bool) -> Self {
        self.login_completed = completed;
        self
    }

    /// Unwrap the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S> TerminalChannel for StreamChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        let n = self.stream.read(&mut self.read_buf).await?;
        if n == 0 {
            return Ok(None);
        }
        trace!("stream: read {} bytes", n);
        Ok(Some(Bytes::copy_from_slice(&self.read_buf[..n])))
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.stream.shutdown().await?;
        Ok(())
    }

    fn login_completed(&self) -> bool {
        self.login_completed
    }
}
