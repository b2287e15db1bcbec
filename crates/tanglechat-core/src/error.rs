//! Error types for Tanglechat

use thiserror::Error;

/// Main error type for Tanglechat operations
#[derive(Error, Debug)]
pub enum ChatError {
    /// No contact information is published at the requested address
    #[error("No contact information present at: {0}")]
    ContactInformationNotFound(String),

    /// Contact was not found in storage
    #[error("Contact not found: {0}")]
    ContactNotFound(String),

    /// A ledger send or fetch failed
    #[error("Delivery failure: {0}")]
    Delivery(String),

    /// A repository read or write failed
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// Payload does not parse as an envelope
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Envelope signed by neither party of the conversation
    #[error("Unknown sender: {0}")]
    UnknownSender(String),

    /// Decryption failed (wrong key, tampered data, or foreign payload)
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Key material is not usable
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Not a syntactically valid ledger address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Illegal contact lifecycle transition
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Outgoing message rejected before encryption
    #[error("Message too long: {length} characters (limit {limit})")]
    MessageTooLong {
        /// Characters in the rejected message
        length: usize,
        /// Configured character limit
        limit: usize,
    },

    /// Outgoing message has no text
    #[error("Message is empty")]
    EmptyMessage,

    /// Chat requires a completed handshake
    #[error("Contact not accepted: {0}")]
    ContactNotAccepted(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Cryptographic operation failed
    #[error("Crypto error: {0}")]
    Crypto(String),

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

/// Coarse failure classes surfaced at the use-case boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Counterpart information absent
    NotFound,
    /// Messenger send/fetch failed
    DeliveryFailure,
    /// Repository write/read failed
    PersistenceFailure,
    /// Payload does not parse; skipped by pollers
    MalformedEnvelope,
    /// Payload not decryptable with the local key; skipped by pollers
    DecryptionFailure,
    /// Anything else
    Unclassified,
}

impl ChatError {
    /// Classify this error for response-code mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ContactInformationNotFound(_) | Self::ContactNotFound(_) => ErrorKind::NotFound,
            Self::Delivery(_) => ErrorKind::DeliveryFailure,
            Self::Persistence(_)
            | Self::Database(_)
            | Self::Transaction(_)
            | Self::Table(_)
            | Self::StorageOp(_)
            | Self::Commit(_) => ErrorKind::PersistenceFailure,
            Self::MalformedEnvelope(_) | Self::UnknownSender(_) => ErrorKind::MalformedEnvelope,
            Self::DecryptionFailed(_) | Self::InvalidKey(_) => ErrorKind::DecryptionFailure,
            _ => ErrorKind::Unclassified,
        }
    }

    /// True for per-message failures a poller should log and skip.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::MalformedEnvelope | ErrorKind::DecryptionFailure
        )
    }
}

/// Result type alias using ChatError
pub type ChatResult<T> = Result<T, ChatError>;
