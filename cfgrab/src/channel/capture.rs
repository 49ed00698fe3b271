//! Capture window and the captured configuration buffer.
//!
//! The window starts disabled. While disabled, bytes offered to it are
//! dropped; while enabled they are appended verbatim, control characters
//! included, except for two kinds of terminal noise at the start of a
//! segment: the echo of the command just sent, and the erase sequence a
//! device prints after a pagination keystroke.

use std::borrow::Cow;
use std::fmt;

use bytes::{Bytes, BytesMut};

/// How a step changes the capture window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureTransition {
    /// Start appending output.
    Enable,
    /// Stop appending output.
    Disable,
    /// Leave the window as it is.
    #[default]
    Unchanged,
}

/// The bytes captured during a successful session.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct CaptureBuffer(Bytes);

impl CaptureBuffer {
    /// The captured bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Take ownership of the captured bytes.
    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    /// Lossy UTF-8 view.
    pub fn as_str_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    /// Number of captured bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for CaptureBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CaptureBuffer").field(&self.0.len()).finish()
    }
}

impl AsRef<[u8]> for CaptureBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Gate deciding which output is kept as configuration text.
#[derive(Debug, Default)]
pub struct CaptureWindow {
    enabled: bool,
    buffer: BytesMut,
    filter: LeadFilter,
    /// Offset in `buffer` where the current segment began.
    segment_start: usize,
}

impl CaptureWindow {
    /// Create a disabled window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether output is currently being captured.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Apply a step's capture transition.
    pub fn apply(&mut self, transition: CaptureTransition) {
        match transition {
            CaptureTransition::Enable => {
                if !self.enabled {
                    self.segment_start = self.buffer.len();
                }
                self.enabled = true;
            }
            CaptureTransition::Disable => {
                self.enabled = false;
                self.filter = LeadFilter::Idle;
            }
            CaptureTransition::Unchanged => {}
        }
    }

    /// Expect the device to echo `line` before its output.
    pub fn expect_echo(&mut self, line: &[u8]) {
        if self.enabled && !line.is_empty() {
            self.filter = LeadFilter::Echo {
                line: line.to_vec(),
                matched: 0,
            };
        }
    }

    /// Expect an erase sequence following a continuation keystroke.
    pub fn expect_erase(&mut self) {
        if self.enabled {
            self.filter = LeadFilter::Erase(Erase::Start);
        }
    }

    /// Offer bytes read from the channel.
    pub fn offer(&mut self, data: &[u8]) {
        if !self.enabled {
            return;
        }
        for &byte in data {
            self.filter.feed(byte, &mut self.buffer);
        }
    }

    /// The first `lines` lines captured since the window was last enabled,
    /// or less if they have not all arrived.
    pub fn head(&self, lines: usize) -> &[u8] {
        let segment = &self.buffer[self.segment_start..];
        let end = memchr::memchr_iter(b'\n', segment)
            .nth(lines.saturating_sub(1))
            .map(|pos| pos + 1)
            .unwrap_or(segment.len());
        &segment[..end]
    }

    /// Bytes captured so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing has been captured.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Finish the window and hand over the captured bytes.
    pub fn into_buffer(mut self) -> CaptureBuffer {
        self.filter.flush(&mut self.buffer);
        CaptureBuffer(self.buffer.freeze())
    }
}

#[derive(Debug, Default)]
enum LeadFilter {
    #[default]
    Idle,
    Echo {
        line: Vec<u8>,
        matched: usize,
    },
    EchoEnd,
    Erase(Erase),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Erase {
    Start,
    Backspace { count: usize },
    Blank { count: usize, spaces: usize },
    Backspace2 { count: usize, left: usize },
    CarriageReturn { held: Vec<u8> },
    /// `held[start]` is the ESC byte.
    Escape { held: Vec<u8>, start: usize },
}

impl LeadFilter {
    fn feed(&mut self, byte: u8, out: &mut BytesMut) {
        match self {
            LeadFilter::Idle => out.extend_from_slice(&[byte]),
            LeadFilter::Echo { line, matched } => {
                if line[*matched] == byte {
                    *matched += 1;
                    if *matched == line.len() {
                        *self = LeadFilter::EchoEnd;
                    }
                } else {
                    out.extend_from_slice(&line[..*matched]);
                    out.extend_from_slice(&[byte]);
                    *self = LeadFilter::Idle;
                }
            }
            // One terminator after the echo, `\r*\n`
            LeadFilter::EchoEnd => match byte {
                b'\r' => {}
                b'\n' => *self = LeadFilter::Idle,
                _ => {
                    out.extend_from_slice(&[byte]);
                    *self = LeadFilter::Idle;
                }
            },
            LeadFilter::Erase(state) => {
                if let Some(next) = state.feed(byte, out) {
                    *state = next;
                } else {
                    *self = LeadFilter::Idle;
                }
            }
        }
    }

    /// Release anything held back when the segment ends mid-sequence.
    fn flush(&mut self, out: &mut BytesMut) {
        match std::mem::take(self) {
            LeadFilter::Echo { line, matched } => out.extend_from_slice(&line[..matched]),
            LeadFilter::Erase(Erase::Blank { spaces, .. }) => {
                out.extend_from_slice(&b" ".repeat(spaces))
            }
            LeadFilter::Erase(Erase::CarriageReturn { held })
            | LeadFilter::Erase(Erase::Escape { held, .. }) => out.extend_from_slice(&held),
            _ => {}
        }
    }
}

impl Erase {
    /// Advance the erase recognizer. `None` means the filter is done and
    /// `byte` (plus anything held) has been written to `out`.
    fn feed(&mut self, byte: u8, out: &mut BytesMut) -> Option<Erase> {
        match std::mem::replace(self, Erase::Start) {
            Erase::Start => match byte {
                0x08 => Some(Erase::Backspace { count: 1 }),
                b'\r' => Some(Erase::CarriageReturn { held: vec![byte] }),
                0x1b => Some(Erase::Escape {
                    held: vec![byte],
                    start: 0,
                }),
                _ => {
                    out.extend_from_slice(&[byte]);
                    None
                }
            },
            Erase::Backspace { count } => match byte {
                0x08 => Some(Erase::Backspace { count: count + 1 }),
                b' ' => Some(Erase::Blank { count, spaces: 1 }),
                _ => Erase::Start.feed(byte, out),
            },
            Erase::Blank { count, spaces } => match byte {
                b' ' if spaces < count => Some(Erase::Blank {
                    count,
                    spaces: spaces + 1,
                }),
                0x08 => Some(Erase::Backspace2 {
                    count,
                    left: count - 1,
                }),
                _ => {
                    out.extend_from_slice(&b" ".repeat(spaces));
                    out.extend_from_slice(&[byte]);
                    None
                }
            },
            Erase::Backspace2 { count, left } => match byte {
                0x08 if left > 0 => Some(Erase::Backspace2 {
                    count,
                    left: left - 1,
                }),
                _ => Erase::Start.feed(byte, out),
            },
            Erase::CarriageReturn { mut held } => match byte {
                b' ' => {
                    held.push(byte);
                    Some(Erase::CarriageReturn { held })
                }
                b'\r' if held.len() > 1 => Some(Erase::Start),
                0x1b if held.len() == 1 => {
                    held.push(byte);
                    Some(Erase::Escape { held, start: 1 })
                }
                _ => {
                    out.extend_from_slice(&held);
                    out.extend_from_slice(&[byte]);
                    None
                }
            },
            Erase::Escape { mut held, start } => {
                held.push(byte);
                match (held.len() - start, byte) {
                    (2, b'[') => Some(Erase::Escape { held, start }),
                    (n, b'0'..=b'9' | b';') if n > 2 => Some(Erase::Escape { held, start }),
                    (n, b'K') if n > 2 => Some(Erase::Start),
                    _ => {
                        out.extend_from_slice(&held);
                        None
                    }
                }
            }
        }
    }
}
