use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AggregateId;

/// Revision number for an aggregate record, used for optimistic
/// concurrency control.
///
/// Revisions start at 0 for an aggregate that has never been stored and
/// increment by 1 on every committed write.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Revision(i64);

impl Revision {
    /// Creates a revision from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial revision (0) for a never-stored aggregate.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the next revision.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw revision value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Revision {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Revision> for i64 {
    fn from(revision: Revision) -> Self {
        revision.0
    }
}

/// The persisted form of one aggregate: lifecycle columns plus the full
/// state serialized as a JSON document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateRecord {
    /// The aggregate's unique identifier.
    pub aggregate_id: AggregateId,

    /// The aggregate type (e.g. "Order", "Subscription").
    pub aggregate_type: String,

    /// Label of the current lifecycle status, stored denormalized so
    /// operators can filter without parsing the state document.
    pub status: String,

    /// Soft-delete flag.
    pub is_deleted: bool,

    /// Revision after this write.
    pub revision: Revision,

    /// The serialized aggregate state.
    pub state: serde_json::Value,

    /// When this record was last written.
    pub updated_at: DateTime<Utc>,
}

/// One aggregate write inside a commit: the new record plus the revision
/// the writer read, for the conditional update.
#[derive(Debug, Clone)]
pub struct AggregateWrite {
    /// The record to store.
    pub record: AggregateRecord,

    /// The revision the aggregate had when loaded. A mismatch at commit
    /// time means a concurrent writer won and the whole operation must
    /// be retried from the read step.
    pub expected_revision: Revision,
}

impl AggregateWrite {
    /// Creates a write with the given expected revision.
    pub fn new(record: AggregateRecord, expected_revision: Revision) -> Self {
        Self {
            record,
            expected_revision,
        }
    }
}

/// Explicit soft-delete predicate, chosen at query construction.
///
/// There is no implicit global filter: every read path states whether it
/// wants deleted aggregates, so the rule stays visible and testable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SoftDeleteFilter {
    /// Hide soft-deleted aggregates (the common case).
    #[default]
    ExcludeDeleted,

    /// Return the record even if soft-deleted (admin/audit paths).
    IncludeDeleted,
}

impl SoftDeleteFilter {
    /// Returns true if a record with the given flag passes this filter.
    pub fn admits(&self, is_deleted: bool) -> bool {
        match self {
            SoftDeleteFilter::ExcludeDeleted => !is_deleted,
            SoftDeleteFilter::IncludeDeleted => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_starts_at_zero_and_increments() {
        assert_eq!(Revision::initial().as_i64(), 0);
        assert_eq!(Revision::initial().next(), Revision::new(1));
        assert!(Revision::new(1) < Revision::new(2));
    }

    #[test]
    fn exclude_deleted_hides_deleted_records() {
        assert!(SoftDeleteFilter::ExcludeDeleted.admits(false));
        assert!(!SoftDeleteFilter::ExcludeDeleted.admits(true));
        assert!(SoftDeleteFilter::IncludeDeleted.admits(true));
    }
}
