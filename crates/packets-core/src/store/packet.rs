//! Packet handle returned by the store

use std::fmt;

use tracing::debug;

use super::PacketStore;
use crate::error::PacketResult;
use crate::types::{ModuleId, PacketId, PacketRecord, Payload};

/// A module-owned unit of replicated data.
///
/// The handle holds its own copy of the record. [`Packet::save`] pushes it
/// through the store's save protocol; [`Packet::reload`] pulls whatever the
/// store currently holds for the same id.
#[derive(Clone)]
pub struct Packet {
    store: PacketStore,
    record: PacketRecord,
}

impl Packet {
    pub(crate) fn new(store: PacketStore, record: PacketRecord) -> Self {
        Self { store, record }
    }

    pub fn id(&self) -> &PacketId {
        &self.record.id
    }

    pub fn module(&self) -> &ModuleId {
        &self.record.module
    }

    pub fn data(&self) -> &Payload {
        &self.record.data
    }

    pub fn record(&self) -> &PacketRecord {
        &self.record
    }

    /// Replace the payload locally; call [`Packet::save`] to share it
    pub fn set_data(&mut self, data: Payload) {
        self.record.data = data;
    }

    /// Save to the authoritative store and mirror, then notify everyone else
    pub async fn save(&self) -> PacketResult<()> {
        self.store.save_record(self.record.clone()).await
    }

    /// Pull the store's current copy. Returns false if the store no longer
    /// holds this packet.
    pub fn reload(&mut self) -> bool {
        match self.store.current(&self.record.id) {
            Some(record) => {
                self.record = record;
                true
            }
            None => {
                debug!(packet_id = %self.record.id, "Packet not found in memory");
                false
            }
        }
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("record", &self.record)
            .finish()
    }
}
