//! In-process session hub
//!
//! Stands in for the host's user list, permission system and socket layer
//! when every participant runs inside one process (the CLI, simulations,
//! integration tests). Each participant gets a [`SessionLink`], which is
//! its view of the session: capability queries, remote calls, broadcasts
//! and active-module checks.
//!
//! ```ignore
//! let hub = SessionHub::new();
//! hub.activate_module("oif");
//!
//! let gm_link = hub.join("gm", CapabilitySet::ALL);
//! let gm = PacketStore::new("gm", services_for(gm_link), StoreConfig::default());
//! hub.attach(gm.participant(), &gm);
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::PacketResult;
use crate::services::{
    CapabilityOracle, MirrorStore, ModuleHost, Notifier, RemoteInvocation, Services,
    StorageService,
};
use crate::store::{PacketStore, WeakPacketStore};
use crate::sync::protocol::{RemoteCall, RemoteReply};
use crate::types::{CapabilitySet, ModuleId, ParticipantId};

/// How long a remote call may take before it counts as empty
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

struct Participant {
    grants: CapabilitySet,
    active: bool,
    store: Option<WeakPacketStore>,
}

/// Registry of participants in one in-process session
pub struct SessionHub {
    participants: RwLock<BTreeMap<ParticipantId, Participant>>,
    /// `None` means every module is active
    active_modules: RwLock<Option<HashSet<ModuleId>>>,
    call_timeout: Duration,
    deliveries: Mutex<JoinSet<()>>,
}

impl SessionHub {
    /// Create a hub where no module is active yet
    pub fn new() -> Arc<Self> {
        Self::with_timeout(DEFAULT_CALL_TIMEOUT)
    }

    /// Create a hub with a custom remote call timeout
    pub fn with_timeout(call_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            participants: RwLock::new(BTreeMap::new()),
            active_modules: RwLock::new(Some(HashSet::new())),
            call_timeout,
            deliveries: Mutex::new(JoinSet::new()),
        })
    }

    /// Add (or re-add) an active participant and return its link
    pub fn join(self: &Arc<Self>, id: impl Into<ParticipantId>, grants: CapabilitySet) -> SessionLink {
        let id = id.into();
        debug!(participant = %id, %grants, "Participant joined");
        self.participants.write().insert(
            id.clone(),
            Participant {
                grants,
                active: true,
                store: None,
            },
        );
        SessionLink {
            hub: Arc::clone(self),
            me: id,
        }
    }

    /// Route remote calls for `id` to `store`
    pub fn attach(&self, id: &ParticipantId, store: &PacketStore) {
        if let Some(participant) = self.participants.write().get_mut(id) {
            participant.store = Some(store.downgrade());
        }
    }

    /// Mark a participant as gone; it stops answering and receiving calls
    pub fn leave(&self, id: &ParticipantId) {
        if let Some(participant) = self.participants.write().get_mut(id) {
            participant.active = false;
            debug!(participant = %id, "Participant left");
        }
    }

    /// Mark a participant as present again
    pub fn rejoin(&self, id: &ParticipantId) {
        if let Some(participant) = self.participants.write().get_mut(id) {
            participant.active = true;
        }
    }

    /// Change a participant's capabilities
    pub fn set_grants(&self, id: &ParticipantId, grants: CapabilitySet) {
        if let Some(participant) = self.participants.write().get_mut(id) {
            participant.grants = grants;
        }
    }

    /// Mark a module as active in the host
    pub fn activate_module(&self, module: impl Into<ModuleId>) {
        if let Some(active) = self.active_modules.write().as_mut() {
            active.insert(module.into());
        }
    }

    /// Mark a module as no longer active. Switches off "all active" mode,
    /// leaving no module active.
    pub fn deactivate_module(&self, module: &ModuleId) {
        let mut active = self.active_modules.write();
        match active.as_mut() {
            Some(set) => {
                set.remove(module);
            }
            None => *active = Some(HashSet::new()),
        }
    }

    /// Treat every module as active
    pub fn activate_all_modules(&self) {
        *self.active_modules.write() = None;
    }

    /// Whether `module` is active
    pub fn is_module_active(&self, module: &ModuleId) -> bool {
        match self.active_modules.read().as_ref() {
            Some(active) => active.contains(module),
            None => true,
        }
    }

    /// Wait until every broadcast delivered so far has been handled
    pub async fn settle(&self) {
        loop {
            let mut pending = std::mem::take(&mut *self.deliveries.lock());
            if pending.is_empty() {
                return;
            }
            while let Some(result) = pending.join_next().await {
                if let Err(err) = result {
                    warn!(error = %err, "Broadcast delivery failed");
                }
            }
        }
    }

    fn holds(&self, id: &ParticipantId, caps: &CapabilitySet) -> bool {
        self.participants
            .read()
            .get(id)
            .map(|p| p.active && p.grants.satisfies(*caps))
            .unwrap_or(false)
    }

    fn holder_other_than(&self, me: &ParticipantId, caps: &CapabilitySet) -> Option<ParticipantId> {
        self.participants
            .read()
            .iter()
            .find(|(id, p)| *id != me && p.active && p.grants.satisfies(*caps))
            .map(|(id, _)| id.clone())
    }

    fn store_of(&self, id: &ParticipantId) -> Option<PacketStore> {
        let participants = self.participants.read();
        let participant = participants.get(id).filter(|p| p.active)?;
        participant.store.as_ref()?.upgrade()
    }

    fn stores_except(&self, me: &ParticipantId) -> Vec<PacketStore> {
        self.participants
            .read()
            .iter()
            .filter(|(id, p)| *id != me && p.active)
            .filter_map(|(_, p)| p.store.as_ref().and_then(WeakPacketStore::upgrade))
            .collect()
    }
}

/// One participant's view of a [`SessionHub`]
#[derive(Clone)]
pub struct SessionLink {
    hub: Arc<SessionHub>,
    me: ParticipantId,
}

impl SessionLink {
    /// Participant this link belongs to
    pub fn participant(&self) -> &ParticipantId {
        &self.me
    }

    /// The hub behind this link
    pub fn hub(&self) -> &Arc<SessionHub> {
        &self.hub
    }

    /// Bundle this link with the given stores into a [`Services`] set
    pub fn services(
        &self,
        storage: Arc<dyn StorageService>,
        mirror: Arc<dyn MirrorStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Services {
        let link = Arc::new(self.clone());
        Services {
            storage,
            oracle: link.clone(),
            remote: link.clone(),
            mirror,
            modules: link,
            notifier,
        }
    }
}

#[async_trait]
impl CapabilityOracle for SessionLink {
    async fn current_holds(&self, caps: &CapabilitySet) -> bool {
        self.hub.holds(&self.me, caps)
    }

    async fn any_active_holder(&self, caps: &CapabilitySet) -> Option<ParticipantId> {
        self.hub.holder_other_than(&self.me, caps)
    }
}

#[async_trait]
impl RemoteInvocation for SessionLink {
    async fn call_on(
        &self,
        participant: &ParticipantId,
        call: RemoteCall,
    ) -> PacketResult<Option<RemoteReply>> {
        let op = call.name();
        let Some(store) = self.hub.store_of(participant) else {
            warn!(op, %participant, "Participant is not reachable");
            return Ok(None);
        };

        match tokio::time::timeout(self.hub.call_timeout, store.handle_remote(call)).await {
            Ok(reply) => Ok(reply),
            Err(_) => {
                warn!(op, %participant, "Remote call timed out");
                Ok(None)
            }
        }
    }

    fn broadcast_except_self(&self, call: RemoteCall) {
        let targets = self.hub.stores_except(&self.me);
        debug!(op = call.name(), targets = targets.len(), "Broadcasting");

        let mut deliveries = self.hub.deliveries.lock();
        while deliveries.try_join_next().is_some() {}
        for store in targets {
            let call = call.clone();
            deliveries.spawn(async move {
                let _ = store.handle_remote(call).await;
            });
        }
    }
}

impl ModuleHost for SessionLink {
    fn is_active(&self, module: &ModuleId) -> bool {
        self.hub.is_module_active(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capability_queries() {
        let hub = SessionHub::new();
        let gm = hub.join("gm", CapabilitySet::ALL);
        let player = hub.join("player", CapabilitySet::NONE);

        assert!(gm.current_holds(&CapabilitySet::STORAGE).await);
        assert!(!player.current_holds(&CapabilitySet::STORAGE).await);
        assert_eq!(
            player.any_active_holder(&CapabilitySet::STORAGE).await,
            Some(ParticipantId::from("gm"))
        );
        // The local participant is never its own delegate
        assert_eq!(gm.any_active_holder(&CapabilitySet::STORAGE).await, None);

        hub.leave(gm.participant());
        assert_eq!(player.any_active_holder(&CapabilitySet::STORAGE).await, None);
        assert!(!gm.current_holds(&CapabilitySet::STORAGE).await);
    }

    #[tokio::test]
    async fn test_call_on_unattached_participant_is_empty() {
        let hub = SessionHub::new();
        let _gm = hub.join("gm", CapabilitySet::ALL);
        let player = hub.join("player", CapabilitySet::NONE);

        let reply = player
            .call_on(&"gm".into(), RemoteCall::UpdateMirror)
            .await
            .unwrap();
        assert_eq!(reply, None);
    }

    #[test]
    fn test_module_activation() {
        let hub = SessionHub::new();
        let link = hub.join("gm", CapabilitySet::ALL);

        assert!(!link.is_active(&"oif".into()));
        hub.activate_module("oif");
        assert!(link.is_active(&"oif".into()));
        assert!(!link.is_active(&"dice".into()));

        hub.activate_all_modules();
        assert!(link.is_active(&"dice".into()));
    }
}
