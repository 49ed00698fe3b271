//! Global protocol registry for looking up device families.

use std::sync::RwLock;

use indexmap::IndexMap;
use once_cell::sync::Lazy;

use super::definition::VendorProtocol;
use super::vendors;
use crate::error::{ProtocolError, Result};

/// Global protocol registry.
static REGISTRY: Lazy<RwLock<ProtocolRegistry>> = Lazy::new(|| {
    let mut registry = ProtocolRegistry::new();
    registry.register_builtin_protocols();
    RwLock::new(registry)
});

/// Registry of vendor protocols keyed by device family.
#[derive(Debug, Default)]
pub struct ProtocolRegistry {
    protocols: IndexMap<String, VendorProtocol>,
}

impl ProtocolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            protocols: IndexMap::new(),
        }
    }

    /// Get the global registry.
    pub fn global() -> &'static RwLock<ProtocolRegistry> {
        &REGISTRY
    }

    /// Look up a family in the global registry and clone it out.
    pub fn lookup(family: &str) -> Result<VendorProtocol> {
        let registry = REGISTRY.read().unwrap_or_else(|e| e.into_inner());
        registry.get(family).cloned().ok_or_else(|| {
            ProtocolError::UnknownFamily {
                name: family.to_string(),
            }
            .into()
        })
    }

    fn register_builtin_protocols(&mut self) {
        for protocol in vendors::builtin() {
            self.protocols.insert(protocol.name.clone(), protocol);
        }
    }

    /// Register a protocol after validating it.
    pub fn register(&mut self, protocol: VendorProtocol) -> Result<()> {
        if self.protocols.contains_key(&protocol.name) {
            return Err(ProtocolError::AlreadyRegistered {
                name: protocol.name.clone(),
            }
            .into());
        }
        protocol.validate()?;
        self.protocols.insert(protocol.name.clone(), protocol);
        Ok(())
    }

    /// Get a protocol by family name.
    pub fn get(&self, name: &str) -> Option<&VendorProtocol> {
        self.protocols.get(name)
    }

    /// Check if a family is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.protocols.contains_key(name)
    }

    /// Registered family names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.protocols.keys()
    }
}
