//! Domain event record and typed payload trait.

use chrono::{DateTime, Utc};
use common::AggregateId;
use outbox::{EventId, OutboxMessage};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Trait for typed domain event payloads.
///
/// Aggregates define one payload enum each (`OrderEvent`,
/// `PickPackEvent`, ...); the variants name facts in past tense.
pub trait EventPayload: Serialize {
    /// Returns the event type name used for routing and storage.
    fn event_type(&self) -> &'static str;

    /// Returns the payload schema version.
    fn schema_version(&self) -> u16 {
        1
    }
}

/// An immutable record of something that happened to one aggregate.
///
/// Events are created by aggregate transitions, buffered in memory on
/// the aggregate, and drained exactly once by the unit of work into
/// outbox rows. Fields are private; once constructed a record is never
/// mutated. Equality is by `event_id` alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    event_id: EventId,
    aggregate_id: AggregateId,
    aggregate_type: String,
    event_type: String,
    schema_version: u16,
    occurred_at: DateTime<Utc>,
    payload: serde_json::Value,
}

impl DomainEvent {
    /// Records a new event for an aggregate from a typed payload.
    pub fn record<P: EventPayload>(
        aggregate_id: AggregateId,
        aggregate_type: &'static str,
        payload: &P,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_id: EventId::new(),
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: payload.event_type().to_string(),
            schema_version: payload.schema_version(),
            occurred_at: Utc::now(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Reconstitutes the event carried by a stored outbox row.
    pub fn from_message(message: &OutboxMessage) -> Self {
        Self {
            event_id: message.event_id,
            aggregate_id: message.aggregate_id,
            aggregate_type: message.aggregate_type.clone(),
            event_type: message.event_type.clone(),
            schema_version: message.schema_version as u16,
            occurred_at: message.occurred_at,
            payload: message.payload.clone(),
        }
    }

    /// Converts the event into an outbox row ready for insertion,
    /// claimable from `available_at`.
    pub fn to_outbox_message(&self, available_at: DateTime<Utc>) -> OutboxMessage {
        OutboxMessage::builder()
            .event_id(self.event_id)
            .aggregate_id(self.aggregate_id)
            .aggregate_type(self.aggregate_type.clone())
            .event_type(self.event_type.clone())
            .schema_version(self.schema_version as i16)
            .payload_raw(self.payload.clone())
            .occurred_at(self.occurred_at)
            .available_at(available_at)
            .build()
    }

    /// Returns the unique event ID.
    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    /// Returns the aggregate this event belongs to.
    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    /// Returns the aggregate type name.
    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    /// Returns the event type name.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Returns the payload schema version.
    pub fn schema_version(&self) -> u16 {
        self.schema_version
    }

    /// Returns when the event occurred.
    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// Returns the raw payload.
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Deserializes the payload into its typed form.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

impl PartialEq for DomainEvent {
    fn eq(&self, other: &Self) -> bool {
        self.event_id == other.event_id
    }
}

impl Eq for DomainEvent {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum TestEvent {
        Happened { value: i32 },
    }

    impl EventPayload for TestEvent {
        fn event_type(&self) -> &'static str {
            "Happened"
        }
    }

    #[test]
    fn record_captures_type_and_payload() {
        let aggregate_id = AggregateId::new();
        let event =
            DomainEvent::record(aggregate_id, "Test", &TestEvent::Happened { value: 7 }).unwrap();

        assert_eq!(event.aggregate_id(), aggregate_id);
        assert_eq!(event.aggregate_type(), "Test");
        assert_eq!(event.event_type(), "Happened");
        assert_eq!(event.schema_version(), 1);

        let TestEvent::Happened { value } = event.payload_as().unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn equality_is_by_event_id() {
        let aggregate_id = AggregateId::new();
        let a =
            DomainEvent::record(aggregate_id, "Test", &TestEvent::Happened { value: 1 }).unwrap();
        let b =
            DomainEvent::record(aggregate_id, "Test", &TestEvent::Happened { value: 1 }).unwrap();

        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn outbox_roundtrip_preserves_identity_and_payload() {
        let event = DomainEvent::record(AggregateId::new(), "Test", &TestEvent::Happened {
            value: 42,
        })
        .unwrap();

        let message = event.to_outbox_message(Utc::now());
        assert_eq!(message.event_id, event.event_id());
        assert_eq!(message.event_type, "Happened");

        let back = DomainEvent::from_message(&message);
        assert_eq!(back, event);
        assert_eq!(back.payload(), event.payload());
    }
}
