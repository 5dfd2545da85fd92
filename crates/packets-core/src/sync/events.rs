//! Events emitted by a packet store

use crate::types::PacketId;

/// Default capacity for the event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Notifications for code that depends on packet state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketEvent {
    /// Initialization finished (successfully or in a degraded mode)
    Ready,
    /// A packet was refreshed from the mirror after a save elsewhere
    Updated {
        /// The packet that changed
        packet_id: PacketId,
    },
}

impl PacketEvent {
    /// Packet this event concerns, if any
    pub fn packet_id(&self) -> Option<&PacketId> {
        match self {
            PacketEvent::Ready => None,
            PacketEvent::Updated { packet_id } => Some(packet_id),
        }
    }
}
