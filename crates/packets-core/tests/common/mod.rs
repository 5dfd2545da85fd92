//! Shared fixtures for multi-participant session tests

#![allow(dead_code)]

use std::sync::Arc;

use packets_core::{
    CapabilitySet, MemoryMirror, MemoryStorage, PacketStore, RecordingNotifier, SessionHub,
    SessionLink, StoreConfig,
};

/// One participant: its store, link and recorded notices
pub struct Node {
    pub store: PacketStore,
    pub link: SessionLink,
    pub notifier: RecordingNotifier,
}

/// A session sharing one authoritative store and one mirror slot
pub struct TestSession {
    pub hub: Arc<SessionHub>,
    pub storage: MemoryStorage,
    pub mirror: MemoryMirror,
    pub config: StoreConfig,
}

impl TestSession {
    /// Session with the "oif" module active
    pub fn new() -> Self {
        let hub = SessionHub::new();
        hub.activate_module("oif");
        Self {
            hub,
            storage: MemoryStorage::new(),
            mirror: MemoryMirror::new(),
            config: StoreConfig::default(),
        }
    }

    /// Add a participant with the given capabilities
    pub fn join(&self, name: &str, grants: CapabilitySet) -> Node {
        let link = self.hub.join(name, grants);
        let notifier = RecordingNotifier::new();
        let services = link.services(
            Arc::new(self.storage.clone()),
            Arc::new(self.mirror.clone()),
            Arc::new(notifier.clone()),
        );
        let store = PacketStore::new(name, services, self.config.clone());
        self.hub.attach(store.participant(), &store);
        Node {
            store,
            link,
            notifier,
        }
    }

    /// Record file path of a packet
    pub fn record_path(&self, module: &str, id: &str) -> String {
        format!("{}/{}/{}.json", self.config.modules_path(), module, id)
    }

    /// Parsed record file of a packet
    pub fn stored_record(&self, module: &str, id: &str) -> Option<serde_json::Value> {
        self.storage
            .contents(&self.record_path(module, id))
            .map(|bytes| serde_json::from_slice(&bytes).unwrap())
    }

    /// Parsed registry file
    pub fn stored_registry(&self) -> Option<packets_core::Registry> {
        self.storage
            .contents(&self.config.registry_path())
            .map(|bytes| packets_core::Registry::from_json(&bytes).unwrap())
    }
}

/// A participant allowed to do everything
pub fn gm_caps() -> CapabilitySet {
    CapabilitySet::ALL
}

/// A participant allowed to do nothing
pub fn player_caps() -> CapabilitySet {
    CapabilitySet::NONE
}
