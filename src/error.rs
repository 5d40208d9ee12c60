//! Crate-level error types for deal creation, command execution, storage
//! and state retrieval.
//!
//! A missing deal is never an error: repository operations report it as
//! `Ok(None)`.

use crate::command::DealCommand;
use crate::status::DealStatus;

/// A draft payload is missing or has malformed required fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("deal title must not be empty")]
    EmptyTitle,

    #[error("quantity must be positive")]
    ZeroQuantity,

    #[error("buyer {field} must not be empty")]
    MissingBuyerField { field: &'static str },

    #[error("at least one image is required")]
    NoImages,

    #[error("quantity times unit price overflows")]
    TotalOverflow,

    #[error("centre handover requires a named pickup centre")]
    EmptyPickupCenter,
}

/// A command rejected by the deal state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DealError {
    /// The draft payload failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The command is not legal from the deal's current status.
    #[error("cannot {command} a deal in status {from}")]
    InvalidTransition {
        from: DealStatus,
        command: DealCommand,
    },

    /// Escrow release was requested before the handover was verified.
    #[error("escrow cannot be released before the handover is confirmed")]
    HandoverNotVerified,

    /// A `Created` event was offered for a deal that already exists.
    #[error("a deal is created exactly once")]
    AlreadyCreated,
}

/// Failure reading or writing deal documents.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Disk I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A stored document contradicts its own event log.
    #[error("deal {id} is corrupt: {reason}")]
    Corrupt { id: String, reason: String },

    /// The id generator kept producing ids that are already taken.
    #[error("could not allocate a fresh deal id (last tried {id})")]
    IdExhausted { id: String },
}

/// Error returned when executing a command against a deal fails.
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    /// Command rejected by deal logic.
    #[error(transparent)]
    Domain(#[from] DealError),

    /// The new document could not be persisted. The previous state is
    /// still the visible one.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The actor owning this deal exited unexpectedly.
    #[error("deal actor is no longer running")]
    ActorGone,
}

impl From<ValidationError> for ExecuteError {
    fn from(err: ValidationError) -> Self {
        Self::Domain(DealError::Validation(err))
    }
}

/// Error returned when reading deals fails.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// The store could not be read.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The actor owning this deal exited unexpectedly.
    #[error("deal actor is no longer running")]
    ActorGone,
}
