//! Domain error types.

use common::AggregateId;
use outbox::{OutboxError, Revision};
use thiserror::Error;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The requested operation is not allowed from the aggregate's
    /// current lifecycle status. Nothing was changed.
    #[error("invalid transition: cannot {operation} a {aggregate_type} in {status} status")]
    InvalidTransition {
        aggregate_type: &'static str,
        status: &'static str,
        operation: &'static str,
    },

    /// The aggregate was soft-deleted; no further operations are
    /// allowed on it.
    #[error("{aggregate_type} {aggregate_id} is deleted")]
    AlreadyDeleted {
        aggregate_type: &'static str,
        aggregate_id: AggregateId,
    },

    /// No live aggregate exists with the given ID.
    #[error("{aggregate_type} not found: {aggregate_id}")]
    AggregateNotFound {
        aggregate_type: &'static str,
        aggregate_id: AggregateId,
    },

    /// A business rule rejected the operation before any mutation.
    #[error("{aggregate_type}: {message}")]
    Validation {
        aggregate_type: &'static str,
        message: String,
    },

    /// A concurrent writer committed first. The whole business
    /// operation must be retried from the read step (re-fetch the
    /// aggregate, re-apply the transition); re-running only the commit
    /// would persist stale in-memory state.
    #[error(
        "persistence conflict for aggregate {aggregate_id}: expected revision {expected}, found {actual}"
    )]
    PersistenceConflict {
        aggregate_id: AggregateId,
        expected: Revision,
        actual: Revision,
    },

    /// Serialization of an event payload or state document failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other storage failure.
    #[error("store error: {0}")]
    Store(OutboxError),
}

impl From<OutboxError> for DomainError {
    fn from(error: OutboxError) -> Self {
        match error {
            OutboxError::RevisionConflict {
                aggregate_id,
                expected,
                actual,
            } => DomainError::PersistenceConflict {
                aggregate_id,
                expected,
                actual,
            },
            other => DomainError::Store(other),
        }
    }
}
