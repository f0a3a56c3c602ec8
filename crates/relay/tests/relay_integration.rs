//! End-to-end relay tests: commit through the unit of work, deliver
//! through the worker, and verify retry, ordering, claim exclusivity,
//! dead-lettering and idempotent redelivery.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use domain::{Aggregate, CustomerId, DomainEvent, Money, Order, OrderLine, UnitOfWork};
use outbox::{DeadLetterQuery, EventId, InMemoryOutboxStore, OutboxStore, WorkerId};
use relay::{EventHandler, HandlerError, HandlerRegistry, RelayConfig, RelayWorker, RetryPolicy};
use tokio::sync::Mutex;

/// Handler that fails a configurable number of times, then succeeds.
struct FlakyEmailHandler {
    remaining_failures: AtomicUsize,
    deliveries: AtomicUsize,
}

impl FlakyEmailHandler {
    fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            remaining_failures: AtomicUsize::new(failures),
            deliveries: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl EventHandler for FlakyEmailHandler {
    fn name(&self) -> &'static str {
        "email-sender"
    }

    async fn handle(&self, _event: &DomainEvent) -> Result<(), HandlerError> {
        if self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(HandlerError::transient("smtp connection refused"));
        }
        self.deliveries.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Handler that records the event types it saw, in order.
struct RecordingHandler {
    seen: Mutex<Vec<String>>,
}

impl RecordingHandler {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    fn name(&self) -> &'static str {
        "recorder"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        self.seen.lock().await.push(event.event_type().to_string());
        Ok(())
    }
}

/// Idempotent handler: dedupes on event_id, counts observable effects.
struct IdempotentHandler {
    seen_ids: Mutex<Vec<EventId>>,
    effects: AtomicUsize,
}

impl IdempotentHandler {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            seen_ids: Mutex::new(Vec::new()),
            effects: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl EventHandler for IdempotentHandler {
    fn name(&self) -> &'static str {
        "idempotent"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        let mut seen = self.seen_ids.lock().await;
        if seen.contains(&event.event_id()) {
            return Ok(());
        }
        seen.push(event.event_id());
        self.effects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn fast_config(max_retries: i32) -> RelayConfig {
    RelayConfig {
        poll_interval: std::time::Duration::from_millis(10),
        batch_size: 16,
        lease_duration: chrono::Duration::seconds(30),
        handler_concurrency: 4,
        retry: RetryPolicy::new(
            max_retries,
            chrono::Duration::milliseconds(20),
            chrono::Duration::seconds(1),
        ),
    }
}

async fn committed_confirmed_order(store: &InMemoryOutboxStore) -> common::AggregateId {
    let mut order = Order::create(CustomerId::new(), vec![OrderLine::new(
        "SKU-1",
        "Widget",
        1,
        Money::from_cents(4200),
    )])
    .unwrap();
    let id = order.id();
    order.confirm("PAY-1").unwrap();

    let mut uow = UnitOfWork::new(store);
    uow.register(&mut order);
    uow.save_changes().await.unwrap();
    id
}

/// The §8 example scenario: confirm commits one pending row; the email
/// handler throws once; retry bookkeeping advances; the next attempt
/// succeeds and the row is never claimed again.
#[tokio::test]
async fn confirmed_order_is_delivered_after_one_transient_failure() {
    let store = InMemoryOutboxStore::new();
    let order_id = committed_confirmed_order(&store).await;

    let email = FlakyEmailHandler::new(1);
    let mut registry = HandlerRegistry::new();
    registry.register("OrderConfirmed", email.clone());

    let worker = RelayWorker::new(Arc::new(store.clone()), Arc::new(registry), fast_config(5));

    // Head-of-line claiming: the first pass hands out OrderCreated
    // (no handler -> processed), the second reaches OrderConfirmed,
    // whose handler throws once.
    worker.run_once().await.unwrap();
    worker.run_once().await.unwrap();

    let messages = store.messages_for_aggregate(order_id).await.unwrap();
    let confirmed = messages
        .iter()
        .find(|m| m.event_type == "OrderConfirmed")
        .unwrap();
    assert_eq!(confirmed.retry_count, 1);
    assert!(confirmed.available_at > Utc::now() - chrono::Duration::seconds(1));
    assert!(confirmed.processed_at.is_none());
    assert!(confirmed.claimed_by.is_none());

    // After the backoff: delivery succeeds.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    worker.run_once().await.unwrap();

    let messages = store.messages_for_aggregate(order_id).await.unwrap();
    assert!(messages.iter().all(|m| m.is_processed()));
    assert_eq!(email.deliveries.load(Ordering::SeqCst), 1);

    // Nothing left for anyone.
    assert_eq!(worker.run_once().await.unwrap(), 0);
    assert_eq!(store.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn per_aggregate_order_survives_worker_handoff() {
    let store = InMemoryOutboxStore::new();

    // Three committed transitions on one order, in three commits.
    let mut order = Order::create(CustomerId::new(), vec![OrderLine::new(
        "SKU-1",
        "Widget",
        1,
        Money::from_cents(100),
    )])
    .unwrap();
    {
        let mut uow = UnitOfWork::new(&store);
        uow.register(&mut order);
        uow.save_changes().await.unwrap();
    }
    order.confirm("PAY-1").unwrap();
    {
        let mut uow = UnitOfWork::new(&store);
        uow.register(&mut order);
        uow.save_changes().await.unwrap();
    }
    order.ship("TRK-1", None).unwrap();
    {
        let mut uow = UnitOfWork::new(&store);
        uow.register(&mut order);
        uow.save_changes().await.unwrap();
    }

    let recorder = RecordingHandler::new();
    let mut registry = HandlerRegistry::new();
    for event_type in ["OrderCreated", "OrderConfirmed", "OrderShipped"] {
        registry.register(event_type, recorder.clone());
    }
    let registry = Arc::new(registry);

    // Head-of-line claiming hands out one row per aggregate per poll,
    // so alternating workers (as after a restart) still deliver in
    // commit order.
    let mut config = fast_config(5);
    config.batch_size = 16;
    let first = RelayWorker::new(Arc::new(store.clone()), registry.clone(), config.clone());
    let second = RelayWorker::new(Arc::new(store.clone()), registry.clone(), config);

    assert_eq!(first.run_once().await.unwrap(), 1);
    assert_eq!(second.run_once().await.unwrap(), 1);
    assert_eq!(first.run_once().await.unwrap(), 1);

    let seen = recorder.seen.lock().await;
    assert_eq!(
        seen.as_slice(),
        ["OrderCreated", "OrderConfirmed", "OrderShipped"]
    );
}

#[tokio::test]
async fn two_workers_never_process_the_same_row() {
    let store = InMemoryOutboxStore::new();
    for _ in 0..8 {
        committed_confirmed_order(&store).await;
    }

    let recorder = RecordingHandler::new();
    let mut registry = HandlerRegistry::new();
    registry.register("OrderCreated", recorder.clone());
    registry.register("OrderConfirmed", recorder.clone());
    let registry = Arc::new(registry);

    let first = RelayWorker::new(
        Arc::new(store.clone()),
        registry.clone(),
        fast_config(5),
    );
    let second = RelayWorker::new(
        Arc::new(store.clone()),
        registry.clone(),
        fast_config(5),
    );

    // Both poll simultaneously, repeatedly, until the queue drains.
    for _ in 0..8 {
        let (a, b) = tokio::join!(first.run_once(), second.run_once());
        a.unwrap();
        b.unwrap();
    }

    // 8 orders x 2 events, each delivered exactly once.
    assert_eq!(recorder.seen.lock().await.len(), 16);
    assert_eq!(store.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn exhausted_retries_dead_letter_and_operator_replay_recovers() {
    let store = InMemoryOutboxStore::new();
    let order_id = committed_confirmed_order(&store).await;

    // Fails far more often than the ceiling allows.
    let email = FlakyEmailHandler::new(100);
    let mut registry = HandlerRegistry::new();
    registry.register("OrderConfirmed", email.clone());

    let worker = RelayWorker::new(
        Arc::new(store.clone()),
        Arc::new(registry),
        fast_config(2),
    );

    for _ in 0..4 {
        worker.run_once().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
    }

    let messages = store.messages_for_aggregate(order_id).await.unwrap();
    let confirmed = messages
        .iter()
        .find(|m| m.event_type == "OrderConfirmed")
        .unwrap();
    assert!(confirmed.dead_lettered);
    assert_eq!(confirmed.retry_count, 2);
    assert!(confirmed.processed_at.is_none());
    let event_id = confirmed.event_id;

    // Parked rows are not claimed again.
    assert_eq!(worker.run_once().await.unwrap(), 0);

    // Operator queries the parked row, fixes the downstream, replays.
    let parked = store
        .dead_letters(DeadLetterQuery::new().event_type("OrderConfirmed"))
        .await
        .unwrap();
    assert_eq!(parked.len(), 1);
    assert!(
        parked[0]
            .last_error
            .as_deref()
            .unwrap()
            .contains("smtp connection refused")
    );

    email.remaining_failures.store(0, Ordering::SeqCst);
    assert!(store.replay_dead_letter(event_id).await.unwrap());

    worker.run_once().await.unwrap();
    let messages = store.messages_for_aggregate(order_id).await.unwrap();
    assert!(messages.iter().all(|m| m.is_processed()));
}

#[tokio::test]
async fn crash_redelivery_is_safe_with_an_idempotent_handler() {
    let store = InMemoryOutboxStore::new();
    let order_id = committed_confirmed_order(&store).await;

    let handler = IdempotentHandler::new();

    // A worker claims with an already-expired lease (a stand-in for a
    // worker that crashed mid-batch), handles the event, but dies
    // before acknowledging.
    let crashed = WorkerId::new();
    let claimed = store
        .claim_batch(crashed, 10, chrono::Duration::seconds(-1))
        .await
        .unwrap();
    assert!(!claimed.is_empty());
    let event = DomainEvent::from_message(&claimed[0]);
    handler.handle(&event).await.unwrap();

    // A healthy worker re-claims and redelivers the same event_id.
    let mut registry = HandlerRegistry::new();
    registry.register("OrderCreated", handler.clone());
    registry.register("OrderConfirmed", handler.clone());
    let worker = RelayWorker::new(
        Arc::new(store.clone()),
        Arc::new(registry),
        fast_config(5),
    );
    worker.run_once().await.unwrap();
    worker.run_once().await.unwrap();

    // Both events processed; the redelivered one had its effect once.
    let messages = store.messages_for_aggregate(order_id).await.unwrap();
    assert!(messages.iter().all(|m| m.is_processed()));
    assert_eq!(handler.effects.load(Ordering::SeqCst), 2);
    assert_eq!(handler.seen_ids.lock().await.len(), 2);
}
