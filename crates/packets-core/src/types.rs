//! Core types for Packets

pub mod capability;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PacketError, PacketResult};

pub use capability::{Capability, CapabilitySet};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from any string-like value
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the underlying string
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True when the identifier is empty or whitespace
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a packet, unique within its module's namespace
    PacketId
);

string_id!(
    /// Identifier of a module allowed to own packets
    ModuleId
);

string_id!(
    /// Identifier of a session participant
    ParticipantId
);

/// Opaque packet payload.
///
/// The core never looks inside the payload beyond deciding whether it is
/// empty; schemas belong to the owning module.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Value);

impl Payload {
    /// Wrap a JSON value
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Borrow the JSON value
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Take the JSON value
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Null, empty strings, empty arrays and empty objects count as empty
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Array(a) => a.is_empty(),
            Value::Object(o) => o.is_empty(),
            Value::Bool(_) | Value::Number(_) => false,
        }
    }

    /// Look up a top-level field of an object payload
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// A packet as held in memory, written to its record file, and mirrored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketRecord {
    /// Packet identifier
    pub id: PacketId,
    /// Owning module
    pub module: ModuleId,
    /// Replaceable payload
    pub data: Payload,
}

impl PacketRecord {
    /// Create a new record
    pub fn new(id: impl Into<PacketId>, module: impl Into<ModuleId>, data: Payload) -> Self {
        Self {
            id: id.into(),
            module: module.into(),
            data,
        }
    }

    /// Canonical registry path of this record
    pub fn path(&self) -> PacketPath {
        PacketPath::new(self.module.clone(), self.id.clone())
    }
}

/// Input to [`crate::PacketStore::create`].
#[derive(Debug, Clone, PartialEq)]
pub struct PacketDraft {
    /// Requested packet id
    pub id: PacketId,
    /// Requested owning module
    pub module: ModuleId,
    /// Initial payload
    pub payload: Payload,
}

impl PacketDraft {
    /// Create a draft from explicit parts
    pub fn new(id: impl Into<PacketId>, module: impl Into<ModuleId>, payload: Payload) -> Self {
        Self {
            id: id.into(),
            module: module.into(),
            payload,
        }
    }

    /// Build a draft from a JSON object carrying `id` and `module` fields.
    ///
    /// The whole object becomes the payload. Missing or non-string fields
    /// produce blank identifiers, which `create` rejects.
    pub fn from_value(value: Value) -> Self {
        let field = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let id = field("id");
        let module = field("module");
        Self {
            id: PacketId::new(id),
            module: ModuleId::new(module),
            payload: Payload::new(value),
        }
    }
}

/// Registry path of a packet record: `<module>/<id>.<ext>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PacketPath {
    /// Owning module
    pub module: ModuleId,
    /// Packet id
    pub id: PacketId,
}

/// Extension used for record files and registry paths
pub const RECORD_EXTENSION: &str = "json";

impl PacketPath {
    /// Create a path
    pub fn new(module: ModuleId, id: PacketId) -> Self {
        Self { module, id }
    }

    /// Parse a registry path such as `oif/sheet1.json`
    pub fn parse(s: &str) -> PacketResult<Self> {
        let (module, file) = s
            .split_once('/')
            .ok_or_else(|| PacketError::InvalidPath(s.to_string()))?;
        let id = match file.rsplit_once('.') {
            Some((stem, _ext)) => stem,
            None => file,
        };
        validate_segment(module)?;
        validate_segment(id)?;
        Ok(Self::new(ModuleId::from(module), PacketId::from(id)))
    }
}

impl fmt::Display for PacketPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}.{}", self.module, self.id, RECORD_EXTENSION)
    }
}

/// Reject identifiers that cannot safely become one path segment
pub fn validate_segment(segment: &str) -> PacketResult<()> {
    let bad = segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\', '\0']);
    if bad {
        return Err(PacketError::InvalidPath(segment.to_string()));
    }
    Ok(())
}
