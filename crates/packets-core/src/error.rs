//! Error types for Packets

use thiserror::Error;

/// Main error type for Packets operations
#[derive(Error, Debug)]
pub enum PacketError {
    /// Packet data was empty
    #[error("Invalid packet data: payload is empty")]
    InvalidData,

    /// Packet data did not carry an id
    #[error("Missing \"id\"")]
    MissingId,

    /// Packet data did not carry an owning module
    #[error("Missing \"module\"")]
    MissingModule,

    /// Module is not present in the registry
    #[error("Module not registered: {0}")]
    UnregisteredModule(String),

    /// Module is not active in the host environment
    #[error("Module not active: {0}")]
    InactiveModule(String),

    /// Nobody in the session holds the required capabilities
    #[error("No active participant holds the required capabilities")]
    NoCapableParticipant,

    /// A capable participant was asked to run an operation and gave no result
    #[error("Delegation of '{op}' to {participant} failed")]
    DelegationFailed {
        /// Participant the call was sent to
        participant: String,
        /// Remote operation name
        op: &'static str,
    },

    /// The authoritative store reported an unsuccessful write
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// The mirror slot is empty or unreadable
    #[error("Mirror unavailable: {0}")]
    MirrorUnavailable(String),

    /// Packet was not found in memory or in the mirror
    #[error("Packet not found: {0}")]
    PacketNotFound(String),

    /// Packet is registered but its stored record could not be adopted
    #[error("Packet unavailable: {0}")]
    PacketUnavailable(String),

    /// A storage path escaped the storage root or was malformed
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database creation/opening error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    StorageOp(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),
}

impl PacketError {
    /// Whether this error is a rejected precondition on caller input
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            PacketError::InvalidData
                | PacketError::MissingId
                | PacketError::MissingModule
                | PacketError::UnregisteredModule(_)
                | PacketError::InactiveModule(_)
        )
    }
}

impl From<serde_json::Error> for PacketError {
    fn from(err: serde_json::Error) -> Self {
        PacketError::Serialization(err.to_string())
    }
}

/// Result type alias using PacketError
pub type PacketResult<T> = Result<T, PacketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PacketError::UnregisteredModule("oif".to_string());
        assert_eq!(format!("{}", err), "Module not registered: oif");

        let err = PacketError::DelegationFailed {
            participant: "gm".to_string(),
            op: "saveOnServer",
        };
        assert_eq!(format!("{}", err), "Delegation of 'saveOnServer' to gm failed");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PacketError = io_err.into();
        assert!(matches!(err, PacketError::Io(_)));
    }

    #[test]
    fn test_precondition_classification() {
        assert!(PacketError::MissingId.is_precondition());
        assert!(PacketError::InactiveModule("x".into()).is_precondition());
        assert!(!PacketError::NoCapableParticipant.is_precondition());
    }
}
