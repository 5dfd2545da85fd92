//! Collaborator interfaces consumed by the packet store
//!
//! The coordination core never touches files, settings, sockets or the host
//! environment directly. Everything goes through these traits, bundled into
//! [`Services`] when a [`crate::PacketStore`] is built.
//!
//! | Trait               | Concern                                         |
//! |---------------------|-------------------------------------------------|
//! | `StorageService`    | authoritative record and registry files         |
//! | `CapabilityOracle`  | who holds which capabilities right now          |
//! | `RemoteInvocation`  | run a named operation on another participant    |
//! | `MirrorStore`       | the shared low-trust mirror slot                |
//! | `ModuleHost`        | which modules are active in the host            |
//! | `Notifier`          | user-visible warnings and errors                |

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PacketResult;
use crate::notify::Notice;
use crate::sync::protocol::{RemoteCall, RemoteReply};
use crate::types::{CapabilitySet, ModuleId, ParticipantId};

/// Durable file-like storage holding records and the registry
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Create `path` if absent. `None` creates a folder, `Some` a file with
    /// the given default contents. Existing entries are left untouched.
    async fn ensure_exists(&self, path: &str, default: Option<&[u8]>) -> PacketResult<()>;

    /// Read a file. Missing or empty files read as `None`.
    async fn read(&self, path: &str) -> PacketResult<Option<Vec<u8>>>;

    /// Write a file, returning whether the store accepted it
    async fn write(&self, path: &str, contents: &[u8]) -> PacketResult<bool>;
}

/// Answers capability questions about the local and other participants
#[async_trait]
pub trait CapabilityOracle: Send + Sync {
    /// Whether the local participant holds every capability in `caps`
    async fn current_holds(&self, caps: &CapabilitySet) -> bool;

    /// Any other active participant holding every capability in `caps`
    async fn any_active_holder(&self, caps: &CapabilitySet) -> Option<ParticipantId>;
}

/// Participant-addressed remote procedure calls
#[async_trait]
pub trait RemoteInvocation: Send + Sync {
    /// Run `call` on `participant` and wait for its reply.
    ///
    /// `Ok(None)` means the call produced no result (including timeouts).
    async fn call_on(
        &self,
        participant: &ParticipantId,
        call: RemoteCall,
    ) -> PacketResult<Option<RemoteReply>>;

    /// Deliver `call` to every other active participant without waiting
    fn broadcast_except_self(&self, call: RemoteCall);
}

/// The shared mirror slot
#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// Current mirror blob, if one was ever written
    async fn read(&self) -> PacketResult<Option<String>>;

    /// Overwrite the mirror blob
    async fn write(&self, blob: String) -> PacketResult<()>;
}

/// Host environment query for active modules
pub trait ModuleHost: Send + Sync {
    /// Whether `module` is currently active
    fn is_active(&self, module: &ModuleId) -> bool;
}

/// Sink for user-visible notifications
pub trait Notifier: Send + Sync {
    /// Show a notice to the user without blocking
    fn notify(&self, notice: Notice);
}

/// Everything a packet store needs from its environment
#[derive(Clone)]
pub struct Services {
    /// Authoritative store
    pub storage: Arc<dyn StorageService>,
    /// Capability queries
    pub oracle: Arc<dyn CapabilityOracle>,
    /// Remote calls and broadcasts
    pub remote: Arc<dyn RemoteInvocation>,
    /// Mirror slot
    pub mirror: Arc<dyn MirrorStore>,
    /// Active module query
    pub modules: Arc<dyn ModuleHost>,
    /// User-visible notices
    pub notifier: Arc<dyn Notifier>,
}
