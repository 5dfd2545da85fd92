//! PacketStore - the coordination core
//!
//! PacketStore owns the session's registry and packet map and coordinates:
//! - capability checks against the local participant
//! - delegation to a capable participant when the local one cannot act
//! - dual writes (authoritative store, then mirror)
//! - convergence on other participants through `onUpdate` broadcasts
//!
//! # Example
//!
//! ```ignore
//! use packets_core::{PacketDraft, PacketStore, Payload};
//!
//! let store = PacketStore::new("gm", services, StoreConfig::default());
//! store.initialize().await;
//!
//! store.register_module("oif").await?;
//! let mut packet = store
//!     .create(PacketDraft::new("sheet1", "oif", Payload::new(json!({"value": 42}))), false)
//!     .await?;
//!
//! packet.set_data(Payload::new(json!({"value": 43})));
//! packet.save().await?;
//! ```

mod packet;
mod remote;

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::StoreConfig;
use crate::error::{PacketError, PacketResult};
use crate::mirror::MirrorSnapshot;
use crate::notify::Notice;
use crate::registry::Registry;
use crate::services::{Services, StorageService};
use crate::sync::events::{PacketEvent, EVENT_CHANNEL_CAPACITY};
use crate::sync::protocol::RemoteCall;
use crate::types::{
    validate_segment, CapabilitySet, ModuleId, PacketDraft, PacketId, PacketPath, PacketRecord,
    ParticipantId,
};

pub use packet::Packet;
pub(crate) use remote::Executor;

/// Registry and packet map for one session
#[derive(Debug, Default)]
struct SessionState {
    registry: Registry,
    packets: BTreeMap<PacketId, PacketRecord>,
}

struct Inner {
    participant: ParticipantId,
    services: Services,
    config: StoreConfig,
    state: RwLock<SessionState>,
    event_tx: broadcast::Sender<PacketEvent>,
    /// Fire-and-forget work spawned by this store
    background: Mutex<JoinSet<()>>,
}

/// Session-scoped packet store. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct PacketStore {
    inner: Arc<Inner>,
}

/// Non-owning handle to a [`PacketStore`], used by session transports
#[derive(Clone)]
pub struct WeakPacketStore(Weak<Inner>);

impl WeakPacketStore {
    /// Upgrade if the store is still alive
    pub fn upgrade(&self) -> Option<PacketStore> {
        self.0.upgrade().map(|inner| PacketStore { inner })
    }
}

/// What kind of slot `create` found for a draft
enum Slot {
    New,
    Existing(PacketRecord),
    /// Listed in the registry but absent from memory
    Orphaned,
}

impl PacketStore {
    /// Create a store for `participant` with an empty registry
    pub fn new(participant: impl Into<ParticipantId>, services: Services, config: StoreConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                participant: participant.into(),
                services,
                config,
                state: RwLock::new(SessionState::default()),
                event_tx,
                background: Mutex::new(JoinSet::new()),
            }),
        }
    }

    /// Non-owning handle
    pub fn downgrade(&self) -> WeakPacketStore {
        WeakPacketStore(Arc::downgrade(&self.inner))
    }

    /// Local participant
    pub fn participant(&self) -> &ParticipantId {
        &self.inner.participant
    }

    /// Storage layout in use
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Subscribe to ready/updated events
    pub fn subscribe(&self) -> broadcast::Receiver<PacketEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Copy of the current registry
    pub fn registry(&self) -> Registry {
        self.inner.state.read().registry.clone()
    }

    /// Every packet currently in memory, ordered by id
    pub fn records(&self) -> Vec<PacketRecord> {
        self.inner.state.read().packets.values().cloned().collect()
    }

    /// Handle to a packet currently in memory
    pub fn get(&self, id: &PacketId) -> Option<Packet> {
        let record = self.current(id)?;
        Some(Packet::new(self.clone(), record))
    }

    pub(crate) fn current(&self, id: &PacketId) -> Option<PacketRecord> {
        self.inner.state.read().packets.get(id).cloned()
    }

    fn storage(&self) -> &dyn StorageService {
        self.inner.services.storage.as_ref()
    }

    async fn holds(&self, caps: CapabilitySet) -> bool {
        self.inner.services.oracle.current_holds(&caps).await
    }

    fn emit(&self, event: PacketEvent) {
        // No subscribers is fine
        let _ = self.inner.event_tx.send(event);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Initialization
    // ═══════════════════════════════════════════════════════════════════════

    /// Establish a registry and packet map, then emit [`PacketEvent::Ready`].
    ///
    /// Capable participants load from the authoritative store and refresh
    /// the mirror. Others ask a capable participant to refresh the mirror
    /// and load from it, or load the mirror as-is after warning the user
    /// when nobody capable is online. Never fails; degraded outcomes are
    /// logged and the store may be left empty.
    pub async fn initialize(&self) {
        info!(participant = %self.participant(), "Initializing packet store");

        let outcome = self
            .run_or_delegate(
                CapabilitySet::STORAGE,
                || self.load_authoritative(),
                RemoteCall::UpdateMirror,
            )
            .await;

        match outcome {
            Ok(Executor::Local) => {
                info!("Loaded registered packets from the authoritative store");
            }
            Ok(Executor::Remote(holder)) => {
                info!(participant = %holder, "Mirror refreshed by capable participant");
                self.load_from_mirror_or_empty().await;
            }
            Err(PacketError::NoCapableParticipant) => {
                warn!("No participant can read the packet store, data may be stale");
                self.inner.services.notifier.notify(Notice::StaleData);
                self.load_from_mirror_or_empty().await;
            }
            Err(err) => {
                warn!(error = %err, "Could not load packets authoritatively, using mirror");
                self.load_from_mirror_or_empty().await;
            }
        }

        self.emit(PacketEvent::Ready);
        info!(participant = %self.participant(), "Packet store ready");
    }

    /// Resync on demand: reload from the authoritative store locally, or
    /// have a capable participant reload and then take its mirror.
    pub async fn refresh(&self) -> PacketResult<()> {
        let executor = self
            .run_or_delegate(
                CapabilitySet::STORAGE,
                || self.load_authoritative(),
                RemoteCall::LoadPackets,
            )
            .await?;
        if let Executor::Remote(_) = executor {
            self.load_from_mirror().await?;
        }
        Ok(())
    }

    async fn ensure_layout(&self) -> PacketResult<()> {
        let config = self.config();
        let default_registry = Registry::new().to_json()?;
        self.storage().ensure_exists(&config.root_path(), None).await?;
        self.storage().ensure_exists(&config.modules_path(), None).await?;
        self.storage()
            .ensure_exists(&config.registry_path(), Some(&default_registry))
            .await?;
        debug!("Required folders and files are present");
        Ok(())
    }

    /// Replace the in-memory registry with the stored one; the packet map
    /// is cleared since it will be rebuilt from the new registry.
    async fn load_registry(&self) -> PacketResult<()> {
        let path = self.config().registry_path();
        let Some(bytes) = self.storage().read(&path).await? else {
            warn!(%path, "Registry file is empty, keeping in-memory registry");
            return Ok(());
        };
        let registry = Registry::from_json(&bytes)?;

        let mut state = self.inner.state.write();
        state.registry = registry;
        state.packets.clear();
        Ok(())
    }

    pub(crate) async fn load_authoritative(&self) -> PacketResult<()> {
        self.ensure_layout().await?;
        self.load_registry().await?;
        self.load_packets().await?;
        self.update_mirror().await;
        Ok(())
    }

    /// Load every registered packet, pruning registry entries whose record
    /// file is gone. The registry is written back only if something was
    /// pruned. Never adds entries that are not already listed.
    pub async fn load_packets(&self) -> PacketResult<()> {
        let listed = self.inner.state.read().registry.packets.clone();
        debug!(count = listed.len(), "Loading registered packets");

        let mut missing = HashSet::new();
        let mut loaded = Vec::new();
        for entry in &listed {
            let path = self.config().record_path_raw(entry);
            match self.storage().read(&path).await {
                Ok(None) => {
                    warn!(%path, "Packet file not found, unregistering it");
                    missing.insert(entry.clone());
                }
                Ok(Some(bytes)) => match serde_json::from_slice::<PacketRecord>(&bytes) {
                    Ok(record) if record.path().to_string() == *entry => {
                        debug!(%path, packet_id = %record.id, "Loaded packet");
                        loaded.push(record);
                    }
                    Ok(record) => {
                        warn!(%path, found = %record.path(), "Packet file holds another packet, skipping");
                    }
                    Err(err) => {
                        warn!(%path, error = %err, "Packet file is unreadable, skipping");
                    }
                },
                Err(err) => {
                    warn!(%path, error = %err, "Failed to read packet file, skipping");
                }
            }
        }

        let pruned = {
            let mut state = self.inner.state.write();
            for record in loaded {
                state.packets.insert(record.id.clone(), record);
            }
            state.registry.prune_missing(|path| missing.contains(path))
        };

        if pruned.is_empty() {
            debug!("No stale packets, registry unchanged");
        } else {
            info!(pruned = pruned.len(), "Pruned stale packets, saving registry");
            self.write_registry().await?;
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Registration
    // ═══════════════════════════════════════════════════════════════════════

    /// Register a module so it may own packets.
    ///
    /// Registering twice is a silent no-op. Modules that are not active in
    /// the host are rejected.
    pub async fn register_module(&self, module: impl Into<ModuleId>) -> PacketResult<()> {
        let module = module.into();
        info!(%module, "Registering module");

        if self.inner.state.read().registry.has_module(&module) {
            debug!(%module, "Module already registered");
            return Ok(());
        }
        validate_segment(module.as_str())?;
        if !self.inner.services.modules.is_active(&module) {
            error!(%module, "Can't register modules that are not currently active");
            return Err(PacketError::InactiveModule(module.to_string()));
        }

        self.inner.state.write().registry.add_module(module.clone());

        if let Err(err) = self.persist_registry().await {
            warn!(%module, error = %err, "Registry not persisted, module is registered for this session only");
        }

        if self.holds(CapabilitySet::STORAGE).await {
            let namespace = self.config().module_path(&module);
            self.storage().ensure_exists(&namespace, None).await?;
        }

        info!(%module, "Registered module");
        Ok(())
    }

    /// Create a packet, or re-open it when its path is already registered.
    ///
    /// Re-opening returns the in-memory packet untouched unless
    /// `override_existing` is set, in which case its data is replaced and
    /// saved. A registered packet missing from memory is read back from the
    /// packet store instead of being overwritten. A failed save of a new
    /// packet is reported through the notifier; the packet still exists in
    /// memory.
    pub async fn create(&self, draft: PacketDraft, override_existing: bool) -> PacketResult<Packet> {
        let PacketDraft {
            id,
            module,
            payload,
        } = draft;
        debug!(packet_id = %id, %module, "Creating packet");

        if payload.is_empty() {
            error!("Invalid packet data");
            return Err(PacketError::InvalidData);
        }
        if id.is_blank() {
            error!("Missing \"id\"");
            return Err(PacketError::MissingId);
        }
        if module.is_blank() {
            error!("Missing \"module\"");
            return Err(PacketError::MissingModule);
        }
        if !self.inner.state.read().registry.has_module(&module) {
            error!(%module, "Trying to create a packet for an unregistered module");
            return Err(PacketError::UnregisteredModule(module.to_string()));
        }
        if !self.inner.services.modules.is_active(&module) {
            error!(%module, "Trying to create a packet for an inactive module");
            return Err(PacketError::InactiveModule(module.to_string()));
        }
        validate_segment(id.as_str())?;
        validate_segment(module.as_str())?;

        let path = PacketPath::new(module.clone(), id.clone());
        let record = PacketRecord::new(id, module, payload);

        let slot = {
            let mut state = self.inner.state.write();
            if state.registry.add_packet(&path) {
                state.packets.insert(record.id.clone(), record.clone());
                Slot::New
            } else {
                // The map is keyed by id, so the entry may belong to another module
                match state.packets.get(&record.id) {
                    Some(existing) if existing.module == record.module => {
                        Slot::Existing(existing.clone())
                    }
                    _ => Slot::Orphaned,
                }
            }
        };

        match slot {
            Slot::New => {
                info!(packet_id = %record.id, %path, "Packet does not exist, creating it");
                let packet = Packet::new(self.clone(), record);
                if let Err(err) = packet.save().await {
                    warn!(packet_id = %packet.id(), error = %err, "New packet kept in memory only");
                }
                self.spawn_registry_persist();
                Ok(packet)
            }
            Slot::Existing(existing) => {
                let mut packet = Packet::new(self.clone(), existing);
                if override_existing {
                    info!(packet_id = %packet.id(), "Packet exists, overriding its data");
                    packet.set_data(record.data);
                    if let Err(err) = packet.save().await {
                        warn!(packet_id = %packet.id(), error = %err, "Override kept in memory only");
                    }
                } else {
                    debug!(packet_id = %packet.id(), "Packet exists, loading from memory");
                }
                Ok(packet)
            }
            Slot::Orphaned if override_existing => {
                warn!(packet_id = %record.id, %path, "Packet is registered but not loaded, overriding its data");
                let packet = Packet::new(self.clone(), record);
                if let Err(err) = packet.save().await {
                    warn!(packet_id = %packet.id(), error = %err, "Override kept in memory only");
                }
                Ok(packet)
            }
            Slot::Orphaned => match self.adopt_stored(&path).await? {
                Some(stored) => {
                    info!(packet_id = %stored.id, %path, "Packet was not loaded, adopted stored record");
                    Ok(Packet::new(self.clone(), stored))
                }
                None => {
                    info!(packet_id = %record.id, %path, "Registered packet has no record file, creating it");
                    let packet = Packet::new(self.clone(), record);
                    if let Err(err) = packet.save().await {
                        warn!(packet_id = %packet.id(), error = %err, "New packet kept in memory only");
                    }
                    Ok(packet)
                }
            },
        }
    }

    /// Read the record of a registered packet that is not in memory and put
    /// it in the packet map.
    ///
    /// Returns `None` when no record file exists. A record that cannot be
    /// read here, or that belongs to another path, is never overwritten.
    async fn adopt_stored(&self, path: &PacketPath) -> PacketResult<Option<PacketRecord>> {
        if !self.holds(CapabilitySet::STORAGE).await {
            warn!(%path, "Registered packet is not loaded and the packet store is out of reach");
            return Err(PacketError::PacketUnavailable(path.to_string()));
        }

        let file = self.config().record_path(path);
        let Some(bytes) = self.storage().read(&file).await? else {
            return Ok(None);
        };
        match serde_json::from_slice::<PacketRecord>(&bytes) {
            Ok(record) if record.path() == *path => {
                self.inner
                    .state
                    .write()
                    .packets
                    .insert(record.id.clone(), record.clone());
                Ok(Some(record))
            }
            Ok(record) => {
                error!(%file, found = %record.path(), "Packet file holds another packet");
                Err(PacketError::PacketUnavailable(path.to_string()))
            }
            Err(err) => {
                error!(%file, error = %err, "Packet file is unreadable");
                Err(PacketError::PacketUnavailable(path.to_string()))
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Saving
    // ═══════════════════════════════════════════════════════════════════════

    /// Save protocol behind [`Packet::save`].
    ///
    /// The record replaces the in-memory entry first and is not rolled back
    /// on failure. On success the authoritative store (directly or through
    /// a delegate) and the mirror hold the new data and every other
    /// participant is told to refresh it.
    pub(crate) async fn save_record(&self, record: PacketRecord) -> PacketResult<()> {
        let packet_id = record.id.clone();
        info!(%packet_id, "Saving packet");

        self.inner
            .state
            .write()
            .packets
            .insert(packet_id.clone(), record.clone());

        let outcome = self
            .run_or_delegate(
                CapabilitySet::STORAGE,
                || self.write_record(&record),
                RemoteCall::SaveOnServer(record.clone()),
            )
            .await;

        match outcome {
            Ok(executor) => {
                if let Executor::Remote(holder) = &executor {
                    info!(%packet_id, participant = %holder, "Packet saved by delegate");
                }
                self.update_mirror().await;
                self.inner
                    .services
                    .remote
                    .broadcast_except_self(RemoteCall::OnUpdate(packet_id));
                Ok(())
            }
            Err(err) => {
                let notice = match &err {
                    PacketError::NoCapableParticipant => Notice::NoSavePermission {
                        packet_id: packet_id.clone(),
                    },
                    PacketError::DelegationFailed { participant, .. } => {
                        Notice::SaveDelegationFailed {
                            packet_id: packet_id.clone(),
                            participant: participant.clone(),
                        }
                    }
                    _ => Notice::SaveFailed {
                        packet_id: packet_id.clone(),
                    },
                };
                error!(%packet_id, error = %err, "Packet was not saved");
                self.inner.services.notifier.notify(notice);
                Err(err)
            }
        }
    }

    /// Write a record to `<modules>/<module>/<id>.json` with the local
    /// participant's own permissions. Failures are logged, never raised.
    pub async fn save_on_server(&self, record: &PacketRecord) -> bool {
        let path = self.config().record_path(&record.path());
        debug!(packet_id = %record.id, %path, "Writing packet to the authoritative store");

        let bytes = match serde_json::to_vec_pretty(record) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!(packet_id = %record.id, error = %err, "Failed to serialize packet");
                return false;
            }
        };

        match self.storage().write(&path, &bytes).await {
            Ok(true) => {
                info!(packet_id = %record.id, "Saved packet on the authoritative store");
                true
            }
            Ok(false) => {
                error!(packet_id = %record.id, "Failed to save packet on the authoritative store");
                false
            }
            Err(err) => {
                error!(packet_id = %record.id, error = %err, "Failed to save packet on the authoritative store");
                false
            }
        }
    }

    async fn write_record(&self, record: &PacketRecord) -> PacketResult<()> {
        if self.save_on_server(record).await {
            Ok(())
        } else {
            Err(PacketError::WriteFailed(
                self.config().record_path(&record.path()),
            ))
        }
    }

    async fn write_registry(&self) -> PacketResult<()> {
        let bytes = self.inner.state.read().registry.to_json()?;
        let path = self.config().registry_path();
        if self.storage().write(&path, &bytes).await? {
            debug!(%path, "Registry saved");
            Ok(())
        } else {
            error!(%path, "Failed to save registry");
            Err(PacketError::WriteFailed(path))
        }
    }

    /// Persist the registry, locally or through a capable participant
    pub async fn persist_registry(&self) -> PacketResult<()> {
        let registry = self.registry();
        self.run_or_delegate(
            CapabilitySet::STORAGE,
            || self.write_registry(),
            RemoteCall::PersistRegistry(registry),
        )
        .await
        .map(|_| ())
    }

    fn spawn_registry_persist(&self) {
        let store = self.clone();
        let mut background = self.inner.background.lock();
        while background.try_join_next().is_some() {}
        background.spawn(async move {
            if let Err(err) = store.persist_registry().await {
                warn!(error = %err, "Background registry save failed");
            }
        });
    }

    /// Wait for background work spawned by this store to finish
    pub async fn flush(&self) {
        let mut pending = std::mem::take(&mut *self.inner.background.lock());
        while let Some(result) = pending.join_next().await {
            if let Err(err) = result {
                warn!(error = %err, "Background task failed");
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Mirror
    // ═══════════════════════════════════════════════════════════════════════

    /// Write the packet map and registry to the mirror.
    ///
    /// Requires the settings capability; returns whether the mirror was
    /// written.
    pub async fn update_mirror(&self) -> bool {
        if !self.holds(CapabilitySet::SETTINGS).await {
            debug!("Local participant cannot update the mirror");
            return false;
        }

        let blob = {
            let state = self.inner.state.read();
            MirrorSnapshot::capture(&state.packets, &state.registry).encode()
        };
        let blob = match blob {
            Ok(blob) => blob,
            Err(err) => {
                error!(error = %err, "Failed to encode mirror snapshot");
                return false;
            }
        };

        match self.inner.services.mirror.write(blob).await {
            Ok(()) => {
                debug!("Mirror updated");
                true
            }
            Err(err) => {
                error!(error = %err, "Failed to write mirror");
                false
            }
        }
    }

    /// Replace the registry and packet map wholesale with the mirror's
    pub async fn load_from_mirror(&self) -> PacketResult<()> {
        let snapshot = self.read_mirror().await?;
        let packets = snapshot.packet_map();

        let mut state = self.inner.state.write();
        *state = SessionState {
            registry: snapshot.config,
            packets,
        };
        info!(
            modules = state.registry.modules.len(),
            packets = state.packets.len(),
            "Loaded from mirror"
        );
        Ok(())
    }

    async fn load_from_mirror_or_empty(&self) {
        if let Err(err) = self.load_from_mirror().await {
            warn!(error = %err, "Mirror unusable, continuing with an empty registry");
            *self.inner.state.write() = SessionState::default();
        }
    }

    async fn read_mirror(&self) -> PacketResult<MirrorSnapshot> {
        let blob = self
            .inner
            .services
            .mirror
            .read()
            .await?
            .ok_or_else(|| PacketError::MirrorUnavailable("mirror slot is empty".to_string()))?;
        MirrorSnapshot::decode(&blob)
    }

    /// Refresh one packet from the mirror after it was saved elsewhere and
    /// emit [`PacketEvent::Updated`]. The packet's path is added to the
    /// local registry if it was not listed yet.
    pub async fn on_update(&self, packet_id: &PacketId) -> PacketResult<()> {
        debug!(%packet_id, "Packet updated elsewhere, refreshing from mirror");

        let snapshot = self.read_mirror().await?;
        let Some(record) = snapshot.find(packet_id).cloned() else {
            warn!(%packet_id, "Updated packet is missing from the mirror");
            return Err(PacketError::PacketNotFound(packet_id.to_string()));
        };

        {
            let mut state = self.inner.state.write();
            state.registry.add_packet(&record.path());
            state.packets.insert(packet_id.clone(), record);
        }

        info!(%packet_id, "Refreshed packet from mirror");
        self.emit(PacketEvent::Updated {
            packet_id: packet_id.clone(),
        });
        Ok(())
    }
}

impl fmt::Debug for PacketStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("PacketStore")
            .field("participant", &self.inner.participant)
            .field("modules", &state.registry.modules.len())
            .field("packets", &state.packets.len())
            .finish()
    }
}
