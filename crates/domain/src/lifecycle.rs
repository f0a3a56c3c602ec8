//! Generic lifecycle machinery shared by every aggregate.
//!
//! Each aggregate type declares a status enum, an operation enum, and
//! one [`TransitionTable`] mapping `(status, operation)` to the next
//! status. Guards never mutate: an aggregate method first asks the
//! table (and builds its event payload), and only then applies the new
//! status and enqueues the event. An operation absent from the table
//! fails with a typed error and leaves the aggregate untouched.

use std::collections::HashMap;
use std::hash::Hash;

use common::AggregateId;
use outbox::Revision;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::event::DomainEvent;

/// Trait for lifecycle status enums.
pub trait Status: Copy + Eq + Hash + Send + Sync + 'static {
    /// Returns the status name as a string.
    fn label(&self) -> &'static str;

    /// Returns true if no further transitions are possible from this
    /// status (soft delete included).
    fn is_terminal(&self) -> bool;
}

/// Trait for lifecycle operation enums.
pub trait Operation: Copy + Eq + Hash + Send + Sync + 'static {
    /// Returns the operation name as a string.
    fn label(&self) -> &'static str;
}

/// A deterministic finite automaton over `(status, operation)` pairs.
///
/// Built once per aggregate type (behind a `LazyLock`) and consulted by
/// every guarded transition. Absence of a pair means the operation is
/// forbidden from that status.
#[derive(Debug)]
pub struct TransitionTable<S, O> {
    edges: HashMap<(S, O), S>,
}

impl<S: Status, O: Operation> TransitionTable<S, O> {
    /// Creates a new transition table builder.
    pub fn builder() -> TransitionTableBuilder<S, O> {
        TransitionTableBuilder {
            edges: HashMap::new(),
        }
    }

    /// Returns the status reached by applying `operation` in `from`,
    /// or None if the transition is not allowed.
    pub fn next(&self, from: S, operation: O) -> Option<S> {
        self.edges.get(&(from, operation)).copied()
    }

    /// Returns true if the transition is allowed.
    pub fn allows(&self, from: S, operation: O) -> bool {
        self.edges.contains_key(&(from, operation))
    }

    /// Returns the number of allowed transitions.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Returns true if the table has no transitions.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Builder for transition tables.
#[derive(Debug)]
pub struct TransitionTableBuilder<S, O> {
    edges: HashMap<(S, O), S>,
}

impl<S: Status, O: Operation> TransitionTableBuilder<S, O> {
    /// Allows `operation` from `from`, leading to `to`.
    ///
    /// # Panics
    ///
    /// Panics if the `(from, operation)` pair was already declared: a
    /// duplicate edge is a bug in the aggregate's table definition.
    pub fn allow(mut self, from: S, operation: O, to: S) -> Self {
        let replaced = self.edges.insert((from, operation), to);
        assert!(
            replaced.is_none(),
            "duplicate transition declared for ({}, {})",
            from.label(),
            operation.label()
        );
        self
    }

    /// Builds the transition table.
    pub fn build(self) -> TransitionTable<S, O> {
        TransitionTable { edges: self.edges }
    }
}

/// Checks one transition against a table without touching any state.
///
/// This is the guard used for secondary state machines (e.g. an order's
/// payment status): callers check every involved machine first, then
/// apply all field changes together.
pub fn guard_transition<S: Status, O: Operation>(
    table: &TransitionTable<S, O>,
    current: S,
    operation: O,
    aggregate_type: &'static str,
) -> Result<S, DomainError> {
    table
        .next(current, operation)
        .ok_or(DomainError::InvalidTransition {
            aggregate_type,
            status: current.label(),
            operation: operation.label(),
        })
}

/// The lifecycle fields every aggregate embeds (serde-flattened):
/// identity, current status, soft-delete flag, persistence revision and
/// the in-memory pending-event buffer.
///
/// The buffer is append-only and excluded from the persisted state
/// document; the unit of work drains it exactly once, after a
/// successful commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleCore<S> {
    id: AggregateId,
    status: S,
    is_deleted: bool,
    revision: Revision,
    #[serde(skip)]
    pending: Vec<DomainEvent>,
}

impl<S: Status> LifecycleCore<S> {
    /// Creates the core for a brand-new aggregate.
    pub fn new(id: AggregateId, initial: S) -> Self {
        Self {
            id,
            status: initial,
            is_deleted: false,
            revision: Revision::initial(),
            pending: Vec::new(),
        }
    }

    /// Returns the aggregate's ID.
    pub fn id(&self) -> AggregateId {
        self.id
    }

    /// Returns the current status.
    pub fn status(&self) -> S {
        self.status
    }

    /// Returns true if the aggregate was soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    /// Returns the persistence revision.
    pub fn revision(&self) -> Revision {
        self.revision
    }

    /// Sets the persistence revision. Called by the repository after a
    /// load and by the unit of work after a commit.
    pub fn set_revision(&mut self, revision: Revision) {
        self.revision = revision;
    }

    /// Guards one transition of the primary status machine.
    ///
    /// Fails with `AlreadyDeleted` on a soft-deleted aggregate and with
    /// `InvalidTransition` when the table has no edge. Never mutates.
    pub fn guard<O: Operation>(
        &self,
        table: &TransitionTable<S, O>,
        operation: O,
        aggregate_type: &'static str,
    ) -> Result<S, DomainError> {
        if self.is_deleted {
            return Err(DomainError::AlreadyDeleted {
                aggregate_type,
                aggregate_id: self.id,
            });
        }
        guard_transition(table, self.status, operation, aggregate_type)
    }

    /// Applies a guarded transition: sets the new status and enqueues
    /// the event. Infallible; call only after every guard and payload
    /// serialization succeeded.
    pub fn advance(&mut self, next: S, event: DomainEvent) {
        self.status = next;
        self.pending.push(event);
    }

    /// Enqueues an event without a status change (creation events,
    /// field-only mutations).
    pub fn record(&mut self, event: DomainEvent) {
        self.pending.push(event);
    }

    /// Soft-deletes the aggregate.
    ///
    /// Allowed from any non-terminal status; fails with
    /// `AlreadyDeleted` if already deleted and `InvalidTransition` from
    /// terminal statuses.
    pub fn mark_deleted(
        &mut self,
        aggregate_type: &'static str,
        event: DomainEvent,
    ) -> Result<(), DomainError> {
        if self.is_deleted {
            return Err(DomainError::AlreadyDeleted {
                aggregate_type,
                aggregate_id: self.id,
            });
        }
        if self.status.is_terminal() {
            return Err(DomainError::InvalidTransition {
                aggregate_type,
                status: self.status.label(),
                operation: "MarkAsDeleted",
            });
        }
        self.is_deleted = true;
        self.pending.push(event);
        Ok(())
    }

    /// Returns the buffered events awaiting commit.
    pub fn pending_events(&self) -> &[DomainEvent] {
        &self.pending
    }

    /// Drops all buffered events. Called by the unit of work after a
    /// successful commit so a retried caller-level operation cannot
    /// double-enqueue.
    pub fn clear_pending_events(&mut self) {
        self.pending.clear();
    }
}

/// Trait implemented by every lifecycle aggregate.
///
/// Gives the unit of work and the repository uniform access to the
/// embedded [`LifecycleCore`] and the aggregate's serialized form.
pub trait Aggregate: Serialize + DeserializeOwned + Send + Sync {
    /// The aggregate's status enum.
    type Status: Status;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Returns the embedded lifecycle core.
    fn core(&self) -> &LifecycleCore<Self::Status>;

    /// Returns the embedded lifecycle core mutably.
    fn core_mut(&mut self) -> &mut LifecycleCore<Self::Status>;

    /// Returns the aggregate's ID.
    fn id(&self) -> AggregateId {
        self.core().id()
    }

    /// Returns the current lifecycle status.
    fn status(&self) -> Self::Status {
        self.core().status()
    }

    /// Returns true if the aggregate was soft-deleted.
    fn is_deleted(&self) -> bool {
        self.core().is_deleted()
    }

    /// Returns the persistence revision.
    fn revision(&self) -> Revision {
        self.core().revision()
    }

    /// Returns the buffered events awaiting commit.
    fn pending_events(&self) -> &[DomainEvent] {
        self.core().pending_events()
    }
}
