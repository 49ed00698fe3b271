//! Built-in vendor protocols.
//!
//! Each module exposes a `protocol()` constructor for one device family.

pub mod enable_paged;
pub mod enable_shell;
pub mod extended_cli;
pub mod menu_shell;

use super::VendorProtocol;

/// All built-in protocols, in registration order.
pub fn builtin() -> Vec<VendorProtocol> {
    vec![
        enable_shell::protocol(),
        enable_paged::protocol(),
        menu_shell::protocol(),
        extended_cli::protocol(),
    ]
}
