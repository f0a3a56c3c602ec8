//! Unit of work: one business operation, one transaction.
//!
//! A command handler loads aggregates, applies guarded transitions
//! (which buffer events in memory), registers the touched aggregates
//! here, and calls [`UnitOfWork::save_changes`]. State changes and the
//! outbox rows for their events are persisted as a single atomic fact:
//! an outbox row exists if and only if the state change that produced
//! it committed durably.

use chrono::Utc;
use outbox::{AggregateRecord, AggregateWrite, OutboxStore, Revision};

use crate::error::DomainError;
use crate::event::DomainEvent;
use crate::lifecycle::Aggregate;

/// Object-safe view of an aggregate for commit purposes.
///
/// Implemented for every [`Aggregate`] via the blanket impl below; the
/// unit of work works on `&mut dyn Tracked` so one commit can span
/// aggregates of different types.
pub trait Tracked: Send {
    /// Returns the aggregate's ID.
    fn aggregate_id(&self) -> common::AggregateId;

    /// Returns the aggregate type name.
    fn aggregate_type_name(&self) -> &'static str;

    /// Returns the label of the current lifecycle status.
    fn status_label(&self) -> &'static str;

    /// Returns the soft-delete flag.
    fn is_deleted(&self) -> bool;

    /// Returns the revision read when the aggregate was loaded.
    fn revision(&self) -> Revision;

    /// Serializes the aggregate into its state document.
    fn state_document(&self) -> Result<serde_json::Value, serde_json::Error>;

    /// Returns the buffered events awaiting commit.
    fn pending_events(&self) -> &[DomainEvent];

    /// Called after a successful commit: bumps the revision and drains
    /// the pending-event buffer.
    fn mark_committed(&mut self);
}

impl<A: Aggregate> Tracked for A {
    fn aggregate_id(&self) -> common::AggregateId {
        self.id()
    }

    fn aggregate_type_name(&self) -> &'static str {
        A::aggregate_type()
    }

    fn status_label(&self) -> &'static str {
        use crate::lifecycle::Status;
        self.status().label()
    }

    fn is_deleted(&self) -> bool {
        Aggregate::is_deleted(self)
    }

    fn revision(&self) -> Revision {
        Aggregate::revision(self)
    }

    fn state_document(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn pending_events(&self) -> &[DomainEvent] {
        Aggregate::pending_events(self)
    }

    fn mark_committed(&mut self) {
        let next = self.core().revision().next();
        self.core_mut().set_revision(next);
        self.core_mut().clear_pending_events();
    }
}

/// Summary of one committed unit of work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Number of aggregate records written.
    pub aggregates_written: usize,

    /// Number of outbox rows inserted.
    pub events_enqueued: usize,
}

/// Collects the aggregates touched by one business operation and
/// commits their state changes together with their pending events.
///
/// The unit of work borrows each aggregate mutably until
/// [`save_changes`](UnitOfWork::save_changes) consumes it, so the same
/// aggregate cannot be mutated behind the commit's back. Dropping the
/// unit of work (or the `save_changes` future before its commit)
/// abandons the operation without writing anything.
pub struct UnitOfWork<'a, S: OutboxStore> {
    store: &'a S,
    tracked: Vec<&'a mut dyn Tracked>,
}

impl<'a, S: OutboxStore> UnitOfWork<'a, S> {
    /// Creates a unit of work against the given store.
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            tracked: Vec::new(),
        }
    }

    /// Registers an aggregate whose state and pending events should be
    /// part of this commit. Registration order fixes the cross-aggregate
    /// event order; within one aggregate, events keep the order they
    /// were raised in.
    pub fn register(&mut self, aggregate: &'a mut dyn Tracked) {
        self.tracked.push(aggregate);
    }

    /// Returns the number of registered aggregates.
    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    /// Persists all registered aggregates and their pending events in
    /// one transaction.
    ///
    /// On success the aggregates' revisions are bumped and their
    /// pending-event buffers cleared. On any failure nothing is written
    /// and the buffers are left intact; a
    /// [`DomainError::PersistenceConflict`] means a concurrent writer
    /// won and the operation must be retried from the read step.
    #[tracing::instrument(skip(self), fields(aggregates = self.tracked.len()))]
    pub async fn save_changes(mut self) -> Result<CommitReceipt, DomainError> {
        if self.tracked.is_empty() {
            return Ok(CommitReceipt::default());
        }

        let now = Utc::now();
        let mut writes = Vec::with_capacity(self.tracked.len());
        let mut messages = Vec::new();

        for aggregate in &self.tracked {
            let record = AggregateRecord {
                aggregate_id: aggregate.aggregate_id(),
                aggregate_type: aggregate.aggregate_type_name().to_string(),
                status: aggregate.status_label().to_string(),
                is_deleted: aggregate.is_deleted(),
                revision: aggregate.revision().next(),
                state: aggregate.state_document()?,
                updated_at: now,
            };
            writes.push(AggregateWrite::new(record, aggregate.revision()));

            for event in aggregate.pending_events() {
                messages.push(event.to_outbox_message(now));
            }
        }

        let receipt = CommitReceipt {
            aggregates_written: writes.len(),
            events_enqueued: messages.len(),
        };

        self.store.commit(writes, messages).await?;

        for aggregate in &mut self.tracked {
            aggregate.mark_committed();
        }

        metrics::counter!("uow_commits_total").increment(1);
        metrics::counter!("uow_events_enqueued_total").increment(receipt.events_enqueued as u64);
        tracing::debug!(
            aggregates = receipt.aggregates_written,
            events = receipt.events_enqueued,
            "unit of work committed"
        );

        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{CustomerId, Money, Order, OrderLine};
    use outbox::{InMemoryOutboxStore, OutboxStore as _, Revision, SoftDeleteFilter};

    fn order() -> Order {
        Order::create(CustomerId::new(), vec![OrderLine::new(
            "SKU-1",
            "Widget",
            2,
            Money::from_cents(1250),
        )])
        .unwrap()
    }

    #[tokio::test]
    async fn empty_unit_of_work_commits_nothing() {
        let store = InMemoryOutboxStore::new();
        let uow = UnitOfWork::new(&store);

        let receipt = uow.save_changes().await.unwrap();
        assert_eq!(receipt, CommitReceipt::default());
        assert_eq!(store.message_count().await, 0);
    }

    #[tokio::test]
    async fn commit_writes_state_and_events_then_clears_buffer() {
        let store = InMemoryOutboxStore::new();
        let mut order = order();
        let order_id = order.id();

        let mut uow = UnitOfWork::new(&store);
        uow.register(&mut order);
        let receipt = uow.save_changes().await.unwrap();

        assert_eq!(receipt.aggregates_written, 1);
        assert_eq!(receipt.events_enqueued, 1);
        assert!(Aggregate::pending_events(&order).is_empty());
        assert_eq!(Aggregate::revision(&order).as_i64(), 1);

        let record = store
            .load_record(order_id, SoftDeleteFilter::ExcludeDeleted)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.aggregate_type, "Order");
        assert_eq!(record.status, "Created");

        let messages = store.messages_for_aggregate(order_id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].event_type, "OrderCreated");
        assert!(messages[0].processed_at.is_none());
    }

    #[tokio::test]
    async fn second_save_after_commit_enqueues_nothing_new() {
        let store = InMemoryOutboxStore::new();
        let mut order = order();

        let mut uow = UnitOfWork::new(&store);
        uow.register(&mut order);
        uow.save_changes().await.unwrap();

        let mut uow = UnitOfWork::new(&store);
        uow.register(&mut order);
        let receipt = uow.save_changes().await.unwrap();

        assert_eq!(receipt.events_enqueued, 0);
        assert_eq!(store.message_count().await, 1);
    }

    #[tokio::test]
    async fn failed_commit_keeps_pending_events() {
        let store = InMemoryOutboxStore::new();
        let mut order = order();

        let mut uow = UnitOfWork::new(&store);
        uow.register(&mut order);
        uow.save_changes().await.unwrap();

        // A writer whose read went stale: same aggregate, but holding
        // the revision a concurrent loser would have seen.
        let mut conflicting = order.clone();
        conflicting.core_mut().set_revision(Revision::initial());
        conflicting.confirm("PAY-7").unwrap();
        assert_eq!(Aggregate::pending_events(&conflicting).len(), 1);

        let mut uow = UnitOfWork::new(&store);
        uow.register(&mut conflicting);
        let result = uow.save_changes().await;

        assert!(matches!(
            result,
            Err(DomainError::PersistenceConflict { .. })
        ));
        assert_eq!(Aggregate::pending_events(&conflicting).len(), 1);
        assert_eq!(store.message_count().await, 1);
    }
}
