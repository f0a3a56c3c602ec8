//! Soft-delete-aware aggregate loading.

use common::AggregateId;
use outbox::{AggregateRecord, OutboxStore, SoftDeleteFilter};

use crate::error::DomainError;
use crate::lifecycle::Aggregate;

/// Loads aggregates from their stored state documents.
///
/// The soft-delete rule is an explicit predicate chosen per call
/// ([`find`](Repository::find) excludes deleted aggregates,
/// [`find_any`](Repository::find_any) includes them) rather than an
/// implicit framework filter.
pub struct Repository<'a, S> {
    store: &'a S,
}

impl<'a, S: OutboxStore> Repository<'a, S> {
    /// Creates a repository over the given store.
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Loads a live (non-deleted) aggregate, or None.
    pub async fn find<A: Aggregate>(&self, id: AggregateId) -> Result<Option<A>, DomainError> {
        let record = self
            .store
            .load_record(id, SoftDeleteFilter::ExcludeDeleted)
            .await?;
        record.map(Self::hydrate).transpose()
    }

    /// Loads an aggregate even if it was soft-deleted, or None.
    pub async fn find_any<A: Aggregate>(&self, id: AggregateId) -> Result<Option<A>, DomainError> {
        let record = self
            .store
            .load_record(id, SoftDeleteFilter::IncludeDeleted)
            .await?;
        record.map(Self::hydrate).transpose()
    }

    /// Loads a live aggregate, failing with `AggregateNotFound` if it
    /// does not exist (or was soft-deleted).
    pub async fn get<A: Aggregate>(&self, id: AggregateId) -> Result<A, DomainError> {
        self.find(id)
            .await?
            .ok_or(DomainError::AggregateNotFound {
                aggregate_type: A::aggregate_type(),
                aggregate_id: id,
            })
    }

    fn hydrate<A: Aggregate>(record: AggregateRecord) -> Result<A, DomainError> {
        let mut aggregate: A = serde_json::from_value(record.state)?;
        // The document's embedded revision is the one at serialization
        // time; the record column is authoritative.
        aggregate.core_mut().set_revision(record.revision);
        Ok(aggregate)
    }
}
