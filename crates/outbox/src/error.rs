use thiserror::Error;

use crate::{AggregateId, EventId, Revision};

/// Errors that can occur when interacting with the outbox store.
#[derive(Debug, Error)]
pub enum OutboxError {
    /// The aggregate was modified by a concurrent writer between the
    /// caller's read and this commit. The whole business operation must
    /// be retried from the read step.
    #[error(
        "revision conflict for aggregate {aggregate_id}: expected revision {expected}, found {actual}"
    )]
    RevisionConflict {
        aggregate_id: AggregateId,
        expected: Revision,
        actual: Revision,
    },

    /// The caller tried to record a delivery outcome for a row it no
    /// longer holds the lease on (lease expired and was re-claimed, or
    /// the row was already processed).
    #[error("lease lost for outbox message {event_id}")]
    LeaseLost { event_id: EventId },

    /// No outbox row exists with the given event ID.
    #[error("outbox message not found: {0}")]
    MessageNotFound(EventId),

    /// The commit inputs were malformed (see [`crate::validate_commit`]).
    #[error("invalid commit: {0}")]
    Validation(String),

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for outbox store operations.
pub type Result<T> = std::result::Result<T, OutboxError>;
