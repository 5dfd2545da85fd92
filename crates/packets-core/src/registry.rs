//! Registry of modules and packet record paths
//!
//! The registry is the session's source of truth for "does packet X exist".
//! It is persisted as one JSON blob at the root of the authoritative store
//! and copied into every mirror snapshot.
//!
//! Paths listed here have the form `<module>/<id>.json`. Stale entries are
//! tolerated and pruned by the load pass rather than rejected.

use serde::{Deserialize, Serialize};

use crate::error::PacketResult;
use crate::types::{ModuleId, PacketPath};

/// Registered modules and expected packet paths
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Registry {
    /// Modules permitted to own packets
    #[serde(default)]
    pub modules: Vec<ModuleId>,
    /// Record paths expected to exist in the authoritative store
    #[serde(default)]
    pub packets: Vec<String>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a module is registered
    pub fn has_module(&self, module: &ModuleId) -> bool {
        self.modules.contains(module)
    }

    /// Register a module. Returns false when it was already present.
    pub fn add_module(&mut self, module: ModuleId) -> bool {
        if self.has_module(&module) {
            return false;
        }
        self.modules.push(module);
        true
    }

    /// Whether a record path is listed
    pub fn has_packet(&self, path: &PacketPath) -> bool {
        let path = path.to_string();
        self.packets.iter().any(|p| *p == path)
    }

    /// List a record path. Returns false when it was already present.
    pub fn add_packet(&mut self, path: &PacketPath) -> bool {
        if self.has_packet(path) {
            return false;
        }
        self.packets.push(path.to_string());
        true
    }

    /// Drop every listed path for which `missing` returns true.
    ///
    /// Single pass, relative order of the remaining paths is kept. Returns
    /// the removed paths in their original order.
    pub fn prune_missing<F>(&mut self, mut missing: F) -> Vec<String>
    where
        F: FnMut(&str) -> bool,
    {
        let mut removed = Vec::new();
        self.packets.retain(|path| {
            if missing(path) {
                removed.push(path.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Union `other` into `self`, keeping existing order and appending
    /// entries `self` has not seen. Returns true when anything was added.
    pub fn merge(&mut self, other: &Registry) -> bool {
        let mut changed = false;
        for module in &other.modules {
            changed |= self.add_module(module.clone());
        }
        for path in &other.packets {
            if !self.packets.contains(path) {
                self.packets.push(path.clone());
                changed = true;
            }
        }
        changed
    }

    /// Serialize to JSON bytes
    pub fn to_json(&self) -> PacketResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parse from JSON bytes
    pub fn from_json(bytes: &[u8]) -> PacketResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
