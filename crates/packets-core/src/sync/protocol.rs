//! Remote operations exchanged between session participants
//!
//! The operation set is fixed. A participant lacking storage access asks a
//! capable one to run an operation on its behalf; writers broadcast
//! `onUpdate` so everyone else re-reads the mirror.
//!
//! ## Message Flow
//!
//! ```text
//! Player (no storage)            GM (storage + settings)         Others
//!   |                               |                               |
//!   |--- saveOnServer {record} ---->|                               |
//!   |                               | write record, refresh mirror  |
//!   |<-- Done ----------------------|                               |
//!   |                               |                               |
//!   |--- onUpdate {id} (broadcast) ------------------------------->|
//!   |                               |            re-read mirror entry
//! ```

use serde::{Deserialize, Serialize};

use crate::registry::Registry;
use crate::types::{PacketId, PacketRecord};

/// An operation one participant asks another to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "args", rename_all = "camelCase")]
pub enum RemoteCall {
    /// Write a packet record to the authoritative store
    SaveOnServer(PacketRecord),
    /// Reload registry and packets from the authoritative store
    LoadPackets,
    /// Refresh the mirror from in-memory state
    UpdateMirror,
    /// Merge the given registry into the receiver's and persist it
    PersistRegistry(Registry),
    /// A packet changed elsewhere; re-read it from the mirror
    OnUpdate(PacketId),
}

impl RemoteCall {
    /// Stable operation name
    pub fn name(&self) -> &'static str {
        match self {
            RemoteCall::SaveOnServer(_) => "saveOnServer",
            RemoteCall::LoadPackets => "loadPackets",
            RemoteCall::UpdateMirror => "updateMirror",
            RemoteCall::PersistRegistry(_) => "persistRegistry",
            RemoteCall::OnUpdate(_) => "onUpdate",
        }
    }

    /// Encode as JSON
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode from JSON
    pub fn decode(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

/// Non-empty result of a remote operation.
///
/// Failures are expressed as an absent reply, never as a variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteReply {
    /// The operation completed
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Payload;
    use serde_json::json;

    #[test]
    fn test_operation_names() {
        assert_eq!(RemoteCall::LoadPackets.name(), "loadPackets");
        assert_eq!(RemoteCall::UpdateMirror.name(), "updateMirror");
        assert_eq!(RemoteCall::OnUpdate("a".into()).name(), "onUpdate");
        assert_eq!(
            RemoteCall::PersistRegistry(Registry::new()).name(),
            "persistRegistry"
        );
    }

    #[test]
    fn test_wire_shape() {
        let call = RemoteCall::SaveOnServer(PacketRecord::new(
            "sheet1",
            "oif",
            Payload::new(json!({"value": 1})),
        ));
        let value: serde_json::Value = serde_json::from_slice(&call.encode().unwrap()).unwrap();
        assert_eq!(value["op"], json!("saveOnServer"));
        assert_eq!(value["args"]["id"], json!("sheet1"));

        let decoded = RemoteCall::decode(&call.encode().unwrap()).unwrap();
        assert_eq!(decoded, call);
    }
}
