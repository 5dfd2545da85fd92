//! Packets Core Library
//!
//! Shared, module-owned data records for sessions where only some
//! participants may write the authoritative store.
//!
//! ## Overview
//!
//! Modules register themselves and create named packets. Every packet lives
//! as one record file in the authoritative store, and a copy of all packets
//! plus the registry is kept in a shared mirror slot. Participants without
//! storage access delegate writes to one that has it, and everyone else
//! converges by re-reading the mirror when told a packet changed.
//!
//! ## Core Principles
//!
//! - **Authoritative first**: records are written to storage before the mirror
//! - **Delegate, don't fail**: missing capability triggers delegation
//! - **Mirror as fallback**: trusted only when storage is unreachable
//! - **Last writer wins**: no versions, no locks
//!
//! ## Quick Start
//!
//! ```ignore
//! use packets_core::{PacketDraft, PacketStore, Payload, StoreConfig};
//! use serde_json::json;
//!
//! let store = PacketStore::new("gm", services, StoreConfig::default());
//! store.initialize().await;
//!
//! store.register_module("oif").await?;
//! let packet = store
//!     .create(PacketDraft::from_value(json!({"id": "sheet1", "module": "oif", "value": 42})), false)
//!     .await?;
//! assert_eq!(packet.data().get("value"), Some(&json!(42)));
//! ```

pub mod config;
pub mod error;
pub mod mirror;
pub mod notify;
pub mod registry;
pub mod services;
pub mod settings;
pub mod storage;
pub mod store;
pub mod sync;
pub mod types;

// Re-exports
pub use config::StoreConfig;
pub use error::{PacketError, PacketResult};
pub use mirror::{MirrorEntry, MirrorSnapshot};
pub use notify::{LogNotifier, Notice, NoticeLevel, RecordingNotifier};
pub use registry::Registry;
pub use services::{
    CapabilityOracle, MirrorStore, ModuleHost, Notifier, RemoteInvocation, Services,
    StorageService,
};
pub use settings::{MemoryMirror, SettingsMirror, SettingsStore};
pub use storage::{FsStorage, MemoryStorage};
pub use store::{Packet, PacketStore, WeakPacketStore};
pub use sync::{PacketEvent, RemoteCall, RemoteReply, SessionHub, SessionLink};
pub use types::*;
