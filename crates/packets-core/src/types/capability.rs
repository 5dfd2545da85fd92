//! Capabilities a session participant may hold
//!
//! The coordination core only ever asks about two sets:
//!
//! - [`CapabilitySet::STORAGE`]: browse + upload on the authoritative store,
//!   required to read or write packet records and the registry
//! - [`CapabilitySet::SETTINGS`]: modify shared settings, required to write
//!   the mirror slot

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single named permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    /// List and read files on the authoritative store
    FilesBrowse,
    /// Create and overwrite files on the authoritative store
    FilesUpload,
    /// Modify shared (world-scoped) settings
    SettingsModify,
}

impl Capability {
    /// Every known capability
    pub const ALL: [Capability; 3] = [
        Capability::FilesBrowse,
        Capability::FilesUpload,
        Capability::SettingsModify,
    ];

    fn bit(self) -> u8 {
        match self {
            Capability::FilesBrowse => 1 << 0,
            Capability::FilesUpload => 1 << 1,
            Capability::SettingsModify => 1 << 2,
        }
    }

    /// Stable name used in logs
    pub fn name(self) -> &'static str {
        match self {
            Capability::FilesBrowse => "FILES_BROWSE",
            Capability::FilesUpload => "FILES_UPLOAD",
            Capability::SettingsModify => "SETTINGS_MODIFY",
        }
    }
}

/// A set of capabilities, compared by inclusion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    /// The empty set
    pub const NONE: CapabilitySet = CapabilitySet(0);
    /// Capabilities needed to touch the authoritative store
    pub const STORAGE: CapabilitySet = CapabilitySet(0b011);
    /// Capabilities needed to write the mirror
    pub const SETTINGS: CapabilitySet = CapabilitySet(0b100);
    /// Everything
    pub const ALL: CapabilitySet = CapabilitySet(0b111);

    /// Build a set from individual capabilities
    pub fn of(caps: &[Capability]) -> Self {
        Self(caps.iter().fold(0, |acc, cap| acc | cap.bit()))
    }

    /// Union of two sets
    pub fn union(self, other: CapabilitySet) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether `self` includes every capability in `required`
    pub fn satisfies(self, required: CapabilitySet) -> bool {
        self.0 & required.0 == required.0
    }

    /// Whether a single capability is present
    pub fn contains(self, cap: Capability) -> bool {
        self.0 & cap.bit() != 0
    }

    /// Iterate the capabilities present
    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL.into_iter().filter(move |cap| self.contains(*cap))
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(Capability::name).collect();
        write!(f, "[{}]", names.join(", "))
    }
}
