//! Vendor protocols for multi-vendor support.
//!
//! A [`VendorProtocol`] is data: an ordered list of [`Step`]s, each waiting
//! for one of several patterns and then sending a line, keystrokes or a
//! credential. The session engine interprets it without knowing which
//! vendor it belongs to.

mod definition;
mod registry;
mod step;
pub mod template;
pub mod vendors;

pub use definition::{LineEnding, VendorProtocol};
pub use registry::ProtocolRegistry;
pub use step::{Action, PatternSpec, Phase, Step};
pub use template::Variables;
