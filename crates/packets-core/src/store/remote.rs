//! Capability delegation and handling of calls from other participants

use std::future::Future;

use tracing::{debug, error, info, warn};

use super::PacketStore;
use crate::error::{PacketError, PacketResult};
use crate::registry::Registry;
use crate::sync::protocol::{RemoteCall, RemoteReply};
use crate::types::{validate_segment, CapabilitySet, PacketRecord, ParticipantId};

/// Who ended up running a capability-gated operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Executor {
    /// The local participant
    Local,
    /// A capable participant, on our behalf
    Remote(ParticipantId),
}

impl PacketStore {
    /// Run `local` when the local participant holds `caps`, otherwise ask
    /// any active participant that holds them to run `call`.
    ///
    /// An empty or failed remote reply is a delegation failure. Nothing is
    /// retried.
    pub(crate) async fn run_or_delegate<F, Fut>(
        &self,
        caps: CapabilitySet,
        local: F,
        call: RemoteCall,
    ) -> PacketResult<Executor>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PacketResult<()>>,
    {
        let oracle = &self.inner.services.oracle;
        let op = call.name();

        if oracle.current_holds(&caps).await {
            debug!(op, %caps, "Running locally");
            local().await?;
            return Ok(Executor::Local);
        }

        let Some(holder) = oracle.any_active_holder(&caps).await else {
            warn!(op, %caps, "No active participant holds the required capabilities");
            return Err(PacketError::NoCapableParticipant);
        };

        info!(op, participant = %holder, "Delegating to capable participant");
        match self.inner.services.remote.call_on(&holder, call).await {
            Ok(Some(RemoteReply::Done)) => Ok(Executor::Remote(holder)),
            Ok(None) => {
                error!(op, participant = %holder, "Delegated call returned nothing");
                Err(PacketError::DelegationFailed {
                    participant: holder.to_string(),
                    op,
                })
            }
            Err(err) => {
                error!(op, participant = %holder, error = %err, "Delegated call failed");
                Err(PacketError::DelegationFailed {
                    participant: holder.to_string(),
                    op,
                })
            }
        }
    }

    /// Execute an operation requested by another participant.
    ///
    /// Returns `None` when the operation could not be carried out, which
    /// the caller treats as a failed delegation.
    pub async fn handle_remote(&self, call: RemoteCall) -> Option<RemoteReply> {
        let op = call.name();
        debug!(op, participant = %self.participant(), "Handling remote call");

        let result = match call {
            RemoteCall::SaveOnServer(record) => self.accept_delegated_save(record).await,
            RemoteCall::LoadPackets => self.accept_reload().await,
            RemoteCall::UpdateMirror => {
                if self.update_mirror().await {
                    Ok(())
                } else {
                    Err(PacketError::MirrorUnavailable(
                        "mirror was not updated".to_string(),
                    ))
                }
            }
            RemoteCall::PersistRegistry(registry) => self.accept_registry(registry).await,
            RemoteCall::OnUpdate(packet_id) => self.on_update(&packet_id).await,
        };

        match result {
            Ok(()) => Some(RemoteReply::Done),
            Err(err) => {
                warn!(op, error = %err, "Remote call could not be completed");
                None
            }
        }
    }

    async fn require_storage(&self) -> PacketResult<()> {
        if self.holds(CapabilitySet::STORAGE).await {
            Ok(())
        } else {
            Err(PacketError::NoCapableParticipant)
        }
    }

    /// Write a record on behalf of someone else and adopt it, so the
    /// mirror refreshed here already carries the new data.
    ///
    /// Records of unregistered or inactive modules are refused.
    async fn accept_delegated_save(&self, record: PacketRecord) -> PacketResult<()> {
        self.require_storage().await?;
        validate_segment(record.id.as_str())?;
        validate_segment(record.module.as_str())?;
        if !self.inner.state.read().registry.has_module(&record.module) {
            error!(module = %record.module, "Refusing to save a packet for an unregistered module");
            return Err(PacketError::UnregisteredModule(record.module.to_string()));
        }
        if !self.inner.services.modules.is_active(&record.module) {
            error!(module = %record.module, "Refusing to save a packet for an inactive module");
            return Err(PacketError::InactiveModule(record.module.to_string()));
        }

        self.write_record(&record).await?;

        let path_added = {
            let mut state = self.inner.state.write();
            let added = state.registry.add_packet(&record.path());
            state.packets.insert(record.id.clone(), record);
            added
        };
        if path_added {
            self.write_registry().await?;
        }

        self.update_mirror().await;
        Ok(())
    }

    async fn accept_reload(&self) -> PacketResult<()> {
        self.require_storage().await?;
        self.load_authoritative().await
    }

    async fn accept_registry(&self, registry: Registry) -> PacketResult<()> {
        self.require_storage().await?;
        let changed = self.inner.state.write().registry.merge(&registry);
        if changed {
            debug!("Merged registry from another participant");
        }
        self.write_registry().await?;
        self.update_mirror().await;
        Ok(())
    }
}
