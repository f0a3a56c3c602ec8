//! Event handler trait and registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::DomainEvent;
use thiserror::Error;

/// Error returned by an event handler.
///
/// The distinction drives the relay's bookkeeping: transient failures
/// are retried with backoff, permanent ones dead-letter the row
/// immediately (retrying cannot fix a payload the handler can never
/// accept).
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A failure that may succeed on redelivery (I/O, timeouts,
    /// downstream unavailability).
    #[error("{0}")]
    Transient(String),

    /// A failure that no retry can fix (unparseable payload, violated
    /// precondition that cannot change).
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl HandlerError {
    /// Creates a transient failure.
    pub fn transient(message: impl Into<String>) -> Self {
        HandlerError::Transient(message.into())
    }

    /// Creates a permanent failure.
    pub fn permanent(message: impl Into<String>) -> Self {
        HandlerError::Permanent(message.into())
    }

    /// Returns true for [`HandlerError::Permanent`].
    pub fn is_permanent(&self) -> bool {
        matches!(self, HandlerError::Permanent(_))
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(error: serde_json::Error) -> Self {
        HandlerError::Permanent(format!("payload deserialization failed: {error}"))
    }
}

/// A subscriber to domain events.
///
/// Handlers must be idempotent per `event_id`: crash recovery can
/// redeliver a row whose handlers partially succeeded, and the relay
/// guarantees at-least-once, not exactly-once, delivery.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Returns the handler's name, used in logs and error records.
    fn name(&self) -> &'static str;

    /// Handles one event. Deserialize the typed payload with
    /// [`DomainEvent::payload_as`].
    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError>;
}

/// Registry of event handlers, keyed by event type.
///
/// Handlers for one event type are invoked in registration order.
/// Fallback handlers receive every event, after the dedicated ones;
/// they exist for cross-cutting subscribers like audit logging.
#[derive(Default)]
pub struct HandlerRegistry {
    by_type: HashMap<String, Vec<Arc<dyn EventHandler>>>,
    fallback: Vec<Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for one event type.
    pub fn register(&mut self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.by_type.entry(event_type.into()).or_default().push(handler);
    }

    /// Registers a handler that receives every event.
    pub fn register_fallback(&mut self, handler: Arc<dyn EventHandler>) {
        self.fallback.push(handler);
    }

    /// Returns the handlers for an event type: dedicated subscribers in
    /// registration order, then fallbacks.
    pub fn handlers_for(&self, event_type: &str) -> Vec<Arc<dyn EventHandler>> {
        let mut handlers: Vec<_> = self
            .by_type
            .get(event_type)
            .map(|v| v.to_vec())
            .unwrap_or_default();
        handlers.extend(self.fallback.iter().cloned());
        handlers
    }

    /// Returns the number of registered handlers (fallbacks included).
    pub fn handler_count(&self) -> usize {
        self.by_type.values().map(Vec::len).sum::<usize>() + self.fallback.len()
    }
}

/// Fallback handler that logs every delivered event.
///
/// Registered by the relay binary so deliveries stay visible even for
/// event types without a dedicated subscriber.
pub struct AuditLogHandler;

#[async_trait]
impl EventHandler for AuditLogHandler {
    fn name(&self) -> &'static str {
        "audit-log"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        tracing::info!(
            event_id = %event.event_id(),
            aggregate_id = %event.aggregate_id(),
            aggregate_type = %event.aggregate_type(),
            event_type = %event.event_type(),
            "event delivered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::AggregateId;
    use domain::EventPayload;
    use serde::Serialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Serialize)]
    struct Ping;

    impl EventPayload for Ping {
        fn event_type(&self) -> &'static str {
            "Ping"
        }
    }

    struct Counting {
        name: &'static str,
        calls: AtomicUsize,
    }

    impl Counting {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl EventHandler for Counting {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn handle(&self, _event: &DomainEvent) -> Result<(), HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn dedicated_handlers_come_before_fallbacks() {
        let mut registry = HandlerRegistry::new();
        let first = Counting::new("first");
        let second = Counting::new("second");
        let audit = Counting::new("audit");

        registry.register("Ping", first.clone());
        registry.register("Ping", second.clone());
        registry.register_fallback(audit.clone());

        let handlers = registry.handlers_for("Ping");
        let names: Vec<_> = handlers.iter().map(|h| h.name()).collect();
        assert_eq!(names, ["first", "second", "audit"]);

        let event = DomainEvent::record(AggregateId::new(), "Test", &Ping).unwrap();
        for handler in &handlers {
            handler.handle(&event).await.unwrap();
        }
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(audit.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_type_gets_only_fallbacks() {
        let mut registry = HandlerRegistry::new();
        registry.register("Ping", Counting::new("first"));

        assert!(registry.handlers_for("Pong").is_empty());

        registry.register_fallback(Counting::new("audit"));
        assert_eq!(registry.handlers_for("Pong").len(), 1);
        assert_eq!(registry.handler_count(), 2);
    }

    #[test]
    fn serde_errors_are_permanent() {
        let error: HandlerError =
            serde_json::from_str::<i32>("not json").unwrap_err().into();
        assert!(error.is_permanent());
        assert!(!HandlerError::transient("timeout").is_permanent());
    }
}
