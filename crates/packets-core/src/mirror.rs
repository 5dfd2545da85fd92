//! Mirror snapshot codec
//!
//! The mirror is one shared, low-trust blob holding the last known packet map
//! and registry. Any participant with settings access may overwrite it; it is
//! only trusted when the authoritative store cannot be reached.
//!
//! ## Blob Layout
//!
//! ```text
//! {
//!   "packets": [ { "name": "<packet id>", "value": <PacketRecord> }, ... ],
//!   "config":  { "modules": [...], "packets": [...] }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{PacketError, PacketResult};
use crate::registry::Registry;
use crate::types::{PacketId, PacketRecord};

/// One packet map entry inside the mirror
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorEntry {
    /// Packet id
    pub name: PacketId,
    /// Packet record
    pub value: PacketRecord,
}

/// Serialized copy of a session's packet map and registry
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MirrorSnapshot {
    /// Packet map as ordered name/value pairs
    #[serde(default)]
    pub packets: Vec<MirrorEntry>,
    /// Registry copy
    #[serde(default)]
    pub config: Registry,
}

impl MirrorSnapshot {
    /// Capture the given packet map and registry
    pub fn capture(packets: &BTreeMap<PacketId, PacketRecord>, registry: &Registry) -> Self {
        Self {
            packets: packets
                .iter()
                .map(|(name, value)| MirrorEntry {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect(),
            config: registry.clone(),
        }
    }

    /// Rebuild a packet map from the entries; later duplicates win
    pub fn packet_map(&self) -> BTreeMap<PacketId, PacketRecord> {
        self.packets
            .iter()
            .map(|entry| (entry.name.clone(), entry.value.clone()))
            .collect()
    }

    /// Find the entry for one packet
    pub fn find(&self, id: &PacketId) -> Option<&PacketRecord> {
        self.packets
            .iter()
            .rev()
            .find(|entry| entry.name == *id)
            .map(|entry| &entry.value)
    }

    /// Encode as a JSON string
    pub fn encode(&self) -> PacketResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from a JSON string
    pub fn decode(blob: &str) -> PacketResult<Self> {
        serde_json::from_str(blob).map_err(|e| PacketError::MirrorUnavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Payload;
    use serde_json::json;

    fn sample() -> (BTreeMap<PacketId, PacketRecord>, Registry) {
        let mut packets = BTreeMap::new();
        packets.insert(
            PacketId::from("sheet1"),
            PacketRecord::new("sheet1", "oif", Payload::new(json!({"value": 42}))),
        );
        let registry = Registry {
            modules: vec!["oif".into()],
            packets: vec!["oif/sheet1.json".into()],
        };
        (packets, registry)
    }

    #[test]
    fn test_blob_layout() {
        let (packets, registry) = sample();
        let blob = MirrorSnapshot::capture(&packets, &registry).encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&blob).unwrap();

        assert_eq!(value["packets"][0]["name"], json!("sheet1"));
        assert_eq!(value["packets"][0]["value"]["data"]["value"], json!(42));
        assert_eq!(value["config"]["modules"], json!(["oif"]));
        assert_eq!(value["config"]["packets"], json!(["oif/sheet1.json"]));
    }

    #[test]
    fn test_find_entry() {
        let (packets, registry) = sample();
        let snapshot = MirrorSnapshot::capture(&packets, &registry);
        assert!(snapshot.find(&"sheet1".into()).is_some());
        assert!(snapshot.find(&"missing".into()).is_none());
    }

    #[test]
    fn test_decode_garbage_is_unavailable() {
        let err = MirrorSnapshot::decode("not json").unwrap_err();
        assert!(matches!(err, PacketError::MirrorUnavailable(_)));
    }

    #[test]
    fn test_decode_empty_object() {
        let snapshot = MirrorSnapshot::decode("{}").unwrap();
        assert!(snapshot.packets.is_empty());
        assert_eq!(snapshot.config, Registry::new());
    }
}
