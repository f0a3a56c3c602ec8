//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p outbox --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use outbox::{
    AggregateId, AggregateRecord, AggregateWrite, DeadLetterQuery, FailureDisposition,
    OutboxError, OutboxMessage, OutboxStore, PostgresOutboxStore, Revision, SoftDeleteFilter,
    WorkerId,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            // Create a temporary pool just for migrations
            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_backoffice_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresOutboxStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE aggregates, outbox_messages")
        .execute(&pool)
        .await
        .unwrap();

    PostgresOutboxStore::new(pool)
}

fn record(aggregate_id: AggregateId, revision: i64, status: &str) -> AggregateRecord {
    AggregateRecord {
        aggregate_id,
        aggregate_type: "Order".to_string(),
        status: status.to_string(),
        is_deleted: false,
        revision: Revision::new(revision),
        state: serde_json::json!({"status": status}),
        updated_at: Utc::now(),
    }
}

fn message(aggregate_id: AggregateId, event_type: &str) -> OutboxMessage {
    OutboxMessage::builder()
        .aggregate_id(aggregate_id)
        .aggregate_type("Order")
        .event_type(event_type)
        .payload_raw(serde_json::json!({"type": event_type}))
        .build()
}

async fn seed(store: &PostgresOutboxStore, aggregate_id: AggregateId, events: &[&str]) {
    let messages = events.iter().map(|e| message(aggregate_id, e)).collect();
    store
        .commit(
            vec![AggregateWrite::new(
                record(aggregate_id, 1, "Created"),
                Revision::initial(),
            )],
            messages,
        )
        .await
        .unwrap();
}

#[tokio::test]
#[serial]
async fn commit_then_load_roundtrip() {
    let store = get_test_store().await;
    let aggregate_id = AggregateId::new();
    seed(&store, aggregate_id, &["OrderCreated"]).await;

    let loaded = store
        .load_record(aggregate_id, SoftDeleteFilter::ExcludeDeleted)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.aggregate_id, aggregate_id);
    assert_eq!(loaded.status, "Created");
    assert_eq!(loaded.revision, Revision::new(1));

    let messages = store.messages_for_aggregate(aggregate_id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].event_type, "OrderCreated");
    assert!(messages[0].is_pending());
    assert!(messages[0].sequence > 0);
}

#[tokio::test]
#[serial]
async fn conflicting_commit_rolls_back_entirely() {
    let store = get_test_store().await;
    let a = AggregateId::new();
    let b = AggregateId::new();
    seed(&store, b, &["OrderCreated"]).await;

    // Second write holds a stale expected revision for b.
    let result = store
        .commit(
            vec![
                AggregateWrite::new(record(a, 1, "Created"), Revision::initial()),
                AggregateWrite::new(record(b, 1, "Confirmed"), Revision::initial()),
            ],
            vec![message(a, "OrderCreated")],
        )
        .await;

    assert!(matches!(result, Err(OutboxError::RevisionConflict { .. })));
    assert!(
        store
            .load_record(a, SoftDeleteFilter::IncludeDeleted)
            .await
            .unwrap()
            .is_none()
    );
    assert!(store.messages_for_aggregate(a).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn soft_delete_filter_is_applied_in_sql() {
    let store = get_test_store().await;
    let aggregate_id = AggregateId::new();

    let mut deleted = record(aggregate_id, 1, "Created");
    deleted.is_deleted = true;
    store
        .commit(
            vec![AggregateWrite::new(deleted, Revision::initial())],
            vec![message(aggregate_id, "OrderDeleted")],
        )
        .await
        .unwrap();

    assert!(
        store
            .load_record(aggregate_id, SoftDeleteFilter::ExcludeDeleted)
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        store
            .load_record(aggregate_id, SoftDeleteFilter::IncludeDeleted)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
#[serial]
async fn concurrent_claims_are_disjoint() {
    let store = get_test_store().await;
    for _ in 0..6 {
        seed(&store, AggregateId::new(), &["OrderCreated"]).await;
    }

    let first = WorkerId::new();
    let second = WorkerId::new();
    let (a, b) = tokio::join!(
        store.claim_batch(first, 10, Duration::seconds(30)),
        store.claim_batch(second, 10, Duration::seconds(30)),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    assert_eq!(a.len() + b.len(), 6);
    for claimed in &a {
        assert!(b.iter().all(|m| m.event_id != claimed.event_id));
    }
}

#[tokio::test]
#[serial]
async fn claim_respects_per_aggregate_head_of_line() {
    let store = get_test_store().await;
    let aggregate_id = AggregateId::new();
    seed(
        &store,
        aggregate_id,
        &["OrderCreated", "OrderConfirmed", "OrderShipped"],
    )
    .await;

    let worker = WorkerId::new();
    let claimed = store
        .claim_batch(worker, 10, Duration::seconds(30))
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].event_type, "OrderCreated");

    store.mark_processed(claimed[0].event_id, worker).await.unwrap();

    let next = store
        .claim_batch(worker, 10, Duration::seconds(30))
        .await
        .unwrap();
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].event_type, "OrderConfirmed");
}

#[tokio::test]
#[serial]
async fn mark_processed_is_guarded_by_the_lease() {
    let store = get_test_store().await;
    let aggregate_id = AggregateId::new();
    seed(&store, aggregate_id, &["OrderCreated"]).await;

    let owner = WorkerId::new();
    let claimed = store
        .claim_batch(owner, 10, Duration::seconds(30))
        .await
        .unwrap();
    let event_id = claimed[0].event_id;

    // A worker that never claimed the row cannot complete it.
    let intruder = WorkerId::new();
    let result = store.mark_processed(event_id, intruder).await;
    assert!(matches!(result, Err(OutboxError::LeaseLost { .. })));

    store.mark_processed(event_id, owner).await.unwrap();

    // And it cannot be completed twice.
    let again = store.mark_processed(event_id, owner).await;
    assert!(matches!(again, Err(OutboxError::LeaseLost { .. })));
}

#[tokio::test]
#[serial]
async fn expired_lease_is_reclaimable_by_another_worker() {
    let store = get_test_store().await;
    let aggregate_id = AggregateId::new();
    seed(&store, aggregate_id, &["OrderCreated"]).await;

    let crashed = WorkerId::new();
    let claimed = store
        .claim_batch(crashed, 10, Duration::seconds(-1))
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);

    let survivor = WorkerId::new();
    let reclaimed = store
        .claim_batch(survivor, 10, Duration::seconds(30))
        .await
        .unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].event_id, claimed[0].event_id);
    assert_eq!(reclaimed[0].claimed_by, Some(survivor));
}

#[tokio::test]
#[serial]
async fn retry_and_dead_letter_bookkeeping() {
    let store = get_test_store().await;
    let aggregate_id = AggregateId::new();
    seed(&store, aggregate_id, &["OrderConfirmed"]).await;

    let worker = WorkerId::new();
    let claimed = store
        .claim_batch(worker, 10, Duration::seconds(30))
        .await
        .unwrap();
    let event_id = claimed[0].event_id;

    let retry_at = Utc::now() + Duration::seconds(5);
    store
        .mark_failed(
            event_id,
            worker,
            "email-sender: smtp timeout",
            FailureDisposition::Retry {
                available_at: retry_at,
            },
        )
        .await
        .unwrap();

    let messages = store.messages_for_aggregate(aggregate_id).await.unwrap();
    assert_eq!(messages[0].retry_count, 1);
    assert!(messages[0].available_at > Utc::now());

    // Backed off: nothing claimable right now.
    assert!(
        store
            .claim_batch(worker, 10, Duration::seconds(30))
            .await
            .unwrap()
            .is_empty()
    );

    // Re-claim after forcing availability, then dead-letter.
    sqlx::query("UPDATE outbox_messages SET available_at = NOW()")
        .execute(store.pool())
        .await
        .unwrap();
    let claimed = store
        .claim_batch(worker, 10, Duration::seconds(30))
        .await
        .unwrap();
    store
        .mark_failed(
            claimed[0].event_id,
            worker,
            "email-sender: smtp timeout",
            FailureDisposition::DeadLetter,
        )
        .await
        .unwrap();

    let parked = store
        .dead_letters(DeadLetterQuery::new().error_contains("smtp"))
        .await
        .unwrap();
    assert_eq!(parked.len(), 1);
    assert_eq!(parked[0].retry_count, 2);
    assert!(parked[0].processed_at.is_none());

    // Dead letters stay parked until replayed.
    assert!(
        store
            .claim_batch(worker, 10, Duration::seconds(30))
            .await
            .unwrap()
            .is_empty()
    );
    assert!(store.replay_dead_letter(event_id).await.unwrap());
    let replayed = store
        .claim_batch(worker, 10, Duration::seconds(30))
        .await
        .unwrap();
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0].retry_count, 0);
}

#[tokio::test]
#[serial]
async fn prune_removes_only_old_processed_rows() {
    let store = get_test_store().await;
    let aggregate_id = AggregateId::new();
    seed(&store, aggregate_id, &["OrderCreated", "OrderConfirmed"]).await;

    let worker = WorkerId::new();
    let claimed = store
        .claim_batch(worker, 10, Duration::seconds(30))
        .await
        .unwrap();
    store.mark_processed(claimed[0].event_id, worker).await.unwrap();

    let pruned = store
        .prune_processed(Utc::now() + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(pruned, 1);
    assert_eq!(store.pending_count().await.unwrap(), 1);
}
