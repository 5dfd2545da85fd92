//! User-visible notices and notifier implementations

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, warn};

use crate::services::Notifier;
use crate::types::PacketId;

/// Severity of a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    /// Degraded but usable
    Warning,
    /// An operation was aborted
    Error,
}

/// Something the user should be told about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Startup fell back to the mirror with nobody able to refresh it
    StaleData,
    /// A save could not be performed because nobody can write storage
    NoSavePermission {
        /// Packet that was being saved
        packet_id: PacketId,
    },
    /// A capable participant was asked to save and failed
    SaveDelegationFailed {
        /// Packet that was being saved
        packet_id: PacketId,
        /// Participant that was asked
        participant: String,
    },
    /// The local authoritative write failed
    SaveFailed {
        /// Packet that was being saved
        packet_id: PacketId,
    },
}

impl Notice {
    /// Severity of this notice
    pub fn level(&self) -> NoticeLevel {
        match self {
            Notice::StaleData => NoticeLevel::Warning,
            Notice::NoSavePermission { .. }
            | Notice::SaveDelegationFailed { .. }
            | Notice::SaveFailed { .. } => NoticeLevel::Error,
        }
    }

    /// Stable message key, for hosts that localize notices
    pub fn key(&self) -> &'static str {
        match self {
            Notice::StaleData => "packets.warn.noFirstLoadPermission",
            Notice::NoSavePermission { .. } => "packets.error.noSavePermission",
            Notice::SaveDelegationFailed { .. } => "packets.error.saveDelegationFailed",
            Notice::SaveFailed { .. } => "packets.error.saveFailed",
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::StaleData => write!(
                f,
                "Nobody online can read the packet store; loaded data may be outdated"
            ),
            Notice::NoSavePermission { packet_id } => write!(
                f,
                "Nobody online can save the \"{}\" packet; changes were not saved",
                packet_id
            ),
            Notice::SaveDelegationFailed {
                packet_id,
                participant,
            } => write!(
                f,
                "{} could not save the \"{}\" packet; changes were not saved",
                participant, packet_id
            ),
            Notice::SaveFailed { packet_id } => {
                write!(f, "Failed to save the \"{}\" packet", packet_id)
            }
        }
    }
}

/// Notifier that routes notices to tracing
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level() {
            NoticeLevel::Warning => warn!(key = notice.key(), "{}", notice),
            NoticeLevel::Error => error!(key = notice.key(), "{}", notice),
        }
    }
}

/// Notifier that keeps every notice, for tests and embedding hosts
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl RecordingNotifier {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Every notice so far
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    /// Notices of one severity
    pub fn count(&self, level: NoticeLevel) -> usize {
        self.notices
            .lock()
            .iter()
            .filter(|n| n.level() == level)
            .count()
    }

    /// Forget recorded notices
    pub fn clear(&self) {
        self.notices.lock().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        LogNotifier.notify(notice.clone());
        self.notices.lock().push(notice);
    }
}
