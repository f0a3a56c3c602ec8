use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::{
    AggregateId, AggregateRecord, AggregateWrite, DeadLetterQuery, EventId, OutboxError,
    OutboxMessage, Result, SoftDeleteFilter, WorkerId,
};

/// What the relay decided to do with a row after a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Reschedule: the row becomes claimable again at `available_at`.
    Retry { available_at: DateTime<Utc> },

    /// Park the row for operator inspection; it is never claimed again
    /// until an operator replays it.
    DeadLetter,
}

/// Core trait for the back-office store.
///
/// One store holds aggregate records and outbox rows so both can be
/// written in a single transaction. The write side (`commit`,
/// `load_record`) belongs to the unit of work and repositories; the
/// delivery side (`claim_batch`, `mark_*`) belongs to the relay; the
/// operator side (`dead_letters`, `replay_dead_letter`,
/// `prune_processed`) is exposed through the operational surface.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Atomically persists aggregate state changes together with the
    /// outbox rows for the events those changes produced.
    ///
    /// Either every write and every message is durably stored, or
    /// nothing is. A revision mismatch on any aggregate fails the whole
    /// commit with [`OutboxError::RevisionConflict`].
    async fn commit(
        &self,
        writes: Vec<AggregateWrite>,
        messages: Vec<OutboxMessage>,
    ) -> Result<()>;

    /// Loads one aggregate record, applying the given soft-delete
    /// predicate.
    ///
    /// Returns None for an unknown aggregate, and for a soft-deleted one
    /// under [`SoftDeleteFilter::ExcludeDeleted`].
    async fn load_record(
        &self,
        aggregate_id: AggregateId,
        filter: SoftDeleteFilter,
    ) -> Result<Option<AggregateRecord>>;

    /// Atomically claims up to `limit` deliverable rows for `worker`,
    /// setting a lease that expires after `lease`.
    ///
    /// A row is deliverable when it is pending, its `available_at` has
    /// passed, no other worker holds an unexpired lease on it, and it is
    /// the oldest unresolved row for its aggregate. The head-of-line
    /// rule keeps per-aggregate delivery order equal to commit order
    /// even with several workers. Two workers can never claim the same
    /// row.
    async fn claim_batch(
        &self,
        worker: WorkerId,
        limit: usize,
        lease: Duration,
    ) -> Result<Vec<OutboxMessage>>;

    /// Records a successful delivery: sets `processed_at` (exactly once)
    /// and releases the lease.
    ///
    /// Fails with [`OutboxError::LeaseLost`] if `worker` no longer holds
    /// the claim or the row was already processed.
    async fn mark_processed(&self, event_id: EventId, worker: WorkerId) -> Result<()>;

    /// Records a failed delivery: increments the retry count, stores the
    /// error, releases the lease, and either reschedules the row or
    /// dead-letters it per `disposition`.
    ///
    /// Fails with [`OutboxError::LeaseLost`] under the same conditions
    /// as [`OutboxStore::mark_processed`].
    async fn mark_failed(
        &self,
        event_id: EventId,
        worker: WorkerId,
        error: &str,
        disposition: FailureDisposition,
    ) -> Result<()>;

    /// Returns all outbox rows for one aggregate in sequence order.
    async fn messages_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<OutboxMessage>>;

    /// Returns the number of rows still awaiting delivery.
    async fn pending_count(&self) -> Result<u64>;

    /// Returns dead-lettered rows matching the query, oldest first.
    async fn dead_letters(&self, query: DeadLetterQuery) -> Result<Vec<OutboxMessage>>;

    /// Operator action: resets a dead-lettered row (retry count, error,
    /// backoff) so it re-enters the claim loop. Returns true if a row
    /// was replayed, false if no dead-lettered row has that ID.
    async fn replay_dead_letter(&self, event_id: EventId) -> Result<bool>;

    /// Maintenance: deletes processed rows older than the given time.
    /// Pending and dead-lettered rows are never pruned. Returns the
    /// number of deleted rows.
    async fn prune_processed(&self, older_than: DateTime<Utc>) -> Result<u64>;
}

/// Validates commit inputs before they reach storage.
///
/// Every message must belong to one of the written aggregates (an event
/// without its state change would break the outbox invariant), and no
/// aggregate may be written twice in one commit.
pub fn validate_commit(writes: &[AggregateWrite], messages: &[OutboxMessage]) -> Result<()> {
    let mut written: HashSet<AggregateId> = HashSet::with_capacity(writes.len());
    for write in writes {
        if !written.insert(write.record.aggregate_id) {
            return Err(OutboxError::Validation(format!(
                "aggregate {} written twice in one commit",
                write.record.aggregate_id
            )));
        }
    }

    for message in messages {
        if !written.contains(&message.aggregate_id) {
            return Err(OutboxError::Validation(format!(
                "outbox message {} references aggregate {} with no state write in this commit",
                message.event_id, message.aggregate_id
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Revision;

    fn write_for(aggregate_id: AggregateId) -> AggregateWrite {
        AggregateWrite::new(
            AggregateRecord {
                aggregate_id,
                aggregate_type: "Order".to_string(),
                status: "Created".to_string(),
                is_deleted: false,
                revision: Revision::new(1),
                state: serde_json::json!({}),
                updated_at: Utc::now(),
            },
            Revision::initial(),
        )
    }

    fn message_for(aggregate_id: AggregateId) -> OutboxMessage {
        OutboxMessage::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("Order")
            .event_type("OrderCreated")
            .payload_raw(serde_json::json!({}))
            .build()
    }

    #[test]
    fn accepts_matching_writes_and_messages() {
        let id = AggregateId::new();
        assert!(validate_commit(&[write_for(id)], &[message_for(id)]).is_ok());
    }

    #[test]
    fn accepts_write_without_messages() {
        let id = AggregateId::new();
        assert!(validate_commit(&[write_for(id)], &[]).is_ok());
    }

    #[test]
    fn rejects_orphan_message() {
        let id = AggregateId::new();
        let other = AggregateId::new();
        let result = validate_commit(&[write_for(id)], &[message_for(other)]);
        assert!(matches!(result, Err(OutboxError::Validation(_))));
    }

    #[test]
    fn rejects_duplicate_aggregate_write() {
        let id = AggregateId::new();
        let result = validate_commit(&[write_for(id), write_for(id)], &[]);
        assert!(matches!(result, Err(OutboxError::Validation(_))));
    }
}
