//! Error types for DIMSE operations

use thiserror::Error;

/// Result type alias for DIMSE operations
pub type Result<T> = std::result::Result<T, DimseError>;

/// Error types that can occur during DIMSE operations
///
/// Non-success DIMSE statuses are not errors: they are returned as
/// [`DimseStatus`](crate::types::DimseStatus) values inside the operation
/// outcome.
#[derive(Error, Debug)]
pub enum DimseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Association rejected: {0}")]
    AssociationRejected(String),

    #[error("Association aborted by {source_name} (reason {reason})")]
    Aborted { source_name: &'static str, reason: u8 },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Malformed dataset: {0}")]
    MalformedDataset(String),

    #[error("Timeout occurred: {0}")]
    Timeout(String),
}

/// Coarse classification of a [`DimseError`], as seen by callers of the
/// PACS operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport failure, rejected or aborted association, protocol fault
    Connection,
    /// Some phase of the operation exceeded its time budget
    Timeout,
    /// A response dataset could not be decoded
    MalformedDataset,
    /// Invalid configuration, detected before any network I/O
    Configuration,
}

impl DimseError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a new protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a new malformed dataset error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedDataset(msg.into())
    }

    /// Create a new timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DimseError::Config(_) => ErrorKind::Configuration,
            DimseError::Timeout(_) => ErrorKind::Timeout,
            DimseError::MalformedDataset(_) => ErrorKind::MalformedDataset,
            DimseError::Network(_)
            | DimseError::Connection(_)
            | DimseError::AssociationRejected(_)
            | DimseError::Aborted { .. }
            | DimseError::Protocol(_) => ErrorKind::Connection,
        }
    }

    /// Whether the error was a transient transport condition.
    ///
    /// Nothing in this crate retries; callers owning a retry policy can use
    /// this to decide.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DimseError::Network(_) | DimseError::Timeout(_) | DimseError::Connection(_)
        )
    }
}
