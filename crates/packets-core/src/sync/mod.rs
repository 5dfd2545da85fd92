//! Participant-to-participant coordination
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  RemoteCall: fixed operation set sent between participants      │
//! │  ├── saveOnServer: write a record for someone without storage   │
//! │  ├── loadPackets: reload registry and packets from storage      │
//! │  ├── updateMirror: refresh the mirror from memory               │
//! │  ├── persistRegistry: merge and save a registry                 │
//! │  └── onUpdate: re-read one packet from the mirror               │
//! │                                                                 │
//! │  PacketEvent: local notifications                               │
//! │  ├── Ready: initialization finished                             │
//! │  └── Updated: a packet was refreshed after a remote save        │
//! │                                                                 │
//! │  SessionHub: in-process session (capabilities, calls, modules)  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod events;
pub mod hub;
pub mod protocol;

pub use events::{PacketEvent, EVENT_CHANNEL_CAPACITY};
pub use hub::{SessionHub, SessionLink, DEFAULT_CALL_TIMEOUT};
pub use protocol::{RemoteCall, RemoteReply};
