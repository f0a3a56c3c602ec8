use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AggregateId;

/// Unique identifier for a domain event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<EventId> for Uuid {
    fn from(id: EventId) -> Self {
        id.0
    }
}

/// Identifier for one relay worker instance.
///
/// A worker stamps the rows it claims so a competing worker (or the same
/// worker after a restart, with a fresh ID) can tell whose lease it is
/// looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(Uuid);

impl WorkerId {
    /// Creates a new random worker ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a worker ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted outbox row: one committed domain event awaiting delivery.
///
/// Rows are created exclusively by the unit of work, in the same
/// transaction as the aggregate state change that produced the event.
/// Only the dispatch relay mutates the delivery bookkeeping
/// (`claimed_by`, `processed_at`, `retry_count`). Rows are never deleted
/// synchronously; processed rows are pruned by a separate maintenance
/// pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxMessage {
    /// Global monotonic ordering key, assigned by the store on insert.
    /// Per aggregate, sequence order is commit order.
    pub sequence: i64,

    /// Unique identifier of the domain event carried by this row.
    pub event_id: EventId,

    /// The aggregate whose state change produced the event.
    pub aggregate_id: AggregateId,

    /// The aggregate type (e.g. "Order", "PickPack").
    pub aggregate_type: String,

    /// The event type (e.g. "OrderConfirmed").
    pub event_type: String,

    /// Payload schema version, for consumers that migrate shapes.
    pub schema_version: i16,

    /// The serialized event payload.
    pub payload: serde_json::Value,

    /// When the event occurred (in the producing request).
    pub occurred_at: DateTime<Utc>,

    /// Earliest time the row may be claimed; pushed forward on retry.
    pub available_at: DateTime<Utc>,

    /// Set exactly once, by the one dispatch that delivered the event to
    /// every handler. Null means pending.
    pub processed_at: Option<DateTime<Utc>>,

    /// Number of failed delivery attempts so far.
    pub retry_count: i32,

    /// Error message from the most recent failed attempt.
    pub last_error: Option<String>,

    /// Worker currently holding the delivery lease, if any.
    pub claimed_by: Option<WorkerId>,

    /// When the current lease expires; an expired lease makes the row
    /// claimable again (worker-crash recovery).
    pub claimed_until: Option<DateTime<Utc>>,

    /// True once the retry ceiling was exhausted. Dead-lettered rows are
    /// parked for operator inspection and never claimed automatically.
    pub dead_lettered: bool,
}

impl OutboxMessage {
    /// Creates a new outbox message builder.
    pub fn builder() -> OutboxMessageBuilder {
        OutboxMessageBuilder::default()
    }

    /// Returns true if the row still awaits delivery (not processed, not
    /// dead-lettered).
    pub fn is_pending(&self) -> bool {
        self.processed_at.is_none() && !self.dead_lettered
    }

    /// Returns true if the row was delivered to all handlers.
    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }

    /// Returns true if the lease (if any) has expired at `now`.
    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        match self.claimed_until {
            Some(until) => until < now,
            None => true,
        }
    }

    /// Returns true if the row may be claimed at `now`: pending, past its
    /// backoff time, and not under an active lease.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.available_at <= now && self.lease_expired(now)
    }
}

/// Builder for constructing outbox messages.
#[derive(Debug, Default)]
pub struct OutboxMessageBuilder {
    event_id: Option<EventId>,
    aggregate_id: Option<AggregateId>,
    aggregate_type: Option<String>,
    event_type: Option<String>,
    schema_version: Option<i16>,
    payload: Option<serde_json::Value>,
    occurred_at: Option<DateTime<Utc>>,
    available_at: Option<DateTime<Utc>>,
}

impl OutboxMessageBuilder {
    /// Sets the event ID. A new ID is generated if not set.
    pub fn event_id(mut self, id: EventId) -> Self {
        self.event_id = Some(id);
        self
    }

    /// Sets the aggregate ID.
    pub fn aggregate_id(mut self, id: AggregateId) -> Self {
        self.aggregate_id = Some(id);
        self
    }

    /// Sets the aggregate type.
    pub fn aggregate_type(mut self, aggregate_type: impl Into<String>) -> Self {
        self.aggregate_type = Some(aggregate_type.into());
        self
    }

    /// Sets the event type.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Sets the payload schema version (defaults to 1).
    pub fn schema_version(mut self, version: i16) -> Self {
        self.schema_version = Some(version);
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self, serde_json::Error> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sets the occurrence timestamp. Current time is used if not set.
    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(at);
        self
    }

    /// Sets the earliest claim time. Defaults to the occurrence time.
    pub fn available_at(mut self, at: DateTime<Utc>) -> Self {
        self.available_at = Some(at);
        self
    }

    /// Builds the outbox message with zeroed delivery bookkeeping.
    ///
    /// # Panics
    ///
    /// Panics if `aggregate_id`, `aggregate_type`, `event_type` or
    /// `payload` are not set.
    pub fn build(self) -> OutboxMessage {
        let occurred_at = self.occurred_at.unwrap_or_else(Utc::now);
        OutboxMessage {
            sequence: 0,
            event_id: self.event_id.unwrap_or_default(),
            aggregate_id: self.aggregate_id.expect("aggregate_id is required"),
            aggregate_type: self.aggregate_type.expect("aggregate_type is required"),
            event_type: self.event_type.expect("event_type is required"),
            schema_version: self.schema_version.unwrap_or(1),
            payload: self.payload.expect("payload is required"),
            occurred_at,
            available_at: self.available_at.unwrap_or(occurred_at),
            processed_at: None,
            retry_count: 0,
            last_error: None,
            claimed_by: None,
            claimed_until: None,
            dead_lettered: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(EventId::new(), EventId::new());
        assert_ne!(WorkerId::new(), WorkerId::new());
    }

    #[test]
    fn builder_defaults() {
        let aggregate_id = AggregateId::new();
        let message = OutboxMessage::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("Order")
            .event_type("OrderConfirmed")
            .payload_raw(serde_json::json!({"x": 1}))
            .build();

        assert_eq!(message.aggregate_id, aggregate_id);
        assert_eq!(message.schema_version, 1);
        assert_eq!(message.retry_count, 0);
        assert_eq!(message.available_at, message.occurred_at);
        assert!(message.is_pending());
        assert!(!message.is_processed());
    }

    #[test]
    fn claimable_respects_backoff_and_lease() {
        let now = Utc::now();
        let mut message = OutboxMessage::builder()
            .aggregate_id(AggregateId::new())
            .aggregate_type("Order")
            .event_type("OrderConfirmed")
            .payload_raw(serde_json::json!({}))
            .occurred_at(now)
            .build();

        assert!(message.is_claimable(now));

        message.available_at = now + chrono::Duration::seconds(10);
        assert!(!message.is_claimable(now));

        message.available_at = now;
        message.claimed_by = Some(WorkerId::new());
        message.claimed_until = Some(now + chrono::Duration::seconds(30));
        assert!(!message.is_claimable(now));

        // Expired lease makes the row claimable again.
        message.claimed_until = Some(now - chrono::Duration::seconds(1));
        assert!(message.is_claimable(now));
    }

    #[test]
    fn processed_and_dead_lettered_are_not_pending() {
        let mut message = OutboxMessage::builder()
            .aggregate_id(AggregateId::new())
            .aggregate_type("Order")
            .event_type("OrderConfirmed")
            .payload_raw(serde_json::json!({}))
            .build();

        message.processed_at = Some(Utc::now());
        assert!(!message.is_pending());

        message.processed_at = None;
        message.dead_lettered = true;
        assert!(!message.is_pending());
        assert!(!message.is_claimable(Utc::now()));
    }
}
