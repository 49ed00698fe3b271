//! JSON inventory of device sessions.
//!
//! The inventory is a JSON array of [`Invocation`] objects:
//!
//! ```json
//! [
//!   {
//!     "host": "r1.lab.example.net",
//!     "family": "enable_shell",
//!     "user": "backup",
//!     "password_file": "/etc/cfgrab/backup.pw",
//!     "kex_algorithm": "diffie-hellman-group14-sha1"
//!   }
//! ]
//! ```

use std::collections::HashSet;
use std::path::Path;

use log::debug;

use crate::error::{ConfigError, Result};
use crate::target::Invocation;

/// Load and check an inventory file.
pub fn load(path: impl AsRef<Path>) -> Result<Vec<Invocation>> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|source| ConfigError::InventoryRead {
        path: path.to_path_buf(),
        source,
    })?;
    let devices = parse(&json, path)?;
    debug!("Loaded {} devices from {}", devices.len(), path.display());
    Ok(devices)
}

/// Parse inventory JSON; `path` is only used in error messages.
pub fn parse(json: &str, path: &Path) -> Result<Vec<Invocation>> {
    let devices: Vec<Invocation> =
        serde_json::from_str(json).map_err(|source| ConfigError::InventoryParse {
            path: path.to_path_buf(),
            source,
        })?;

    // Captures are stored per host, so a host may only appear once
    let mut seen = HashSet::new();
    for device in &devices {
        if !seen.insert(device.host.as_str()) {
            return Err(ConfigError::Invalid {
                message: format!("host '{}' appears more than once", device.host),
            }
            .into());
        }
    }

    Ok(devices)
}
