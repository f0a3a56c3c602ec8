use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, AggregateRecord, AggregateWrite, DeadLetterQuery, EventId, OutboxError,
    OutboxMessage, Result, Revision, SoftDeleteFilter, WorkerId,
    store::{FailureDisposition, OutboxStore, validate_commit},
};

const MESSAGE_COLUMNS: &str = "sequence, event_id, aggregate_id, aggregate_type, event_type, \
     schema_version, payload, occurred_at, available_at, processed_at, retry_count, last_error, \
     claimed_by, claimed_until, dead_lettered";

/// PostgreSQL-backed outbox store.
///
/// Commits run in one transaction; claiming uses `FOR UPDATE SKIP
/// LOCKED` so concurrent relay workers never block on or double-claim
/// the same row.
#[derive(Clone)]
pub struct PostgresOutboxStore {
    pool: PgPool,
}

impl PostgresOutboxStore {
    /// Creates a new PostgreSQL outbox store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_message(row: PgRow) -> Result<OutboxMessage> {
        Ok(OutboxMessage {
            sequence: row.try_get("sequence")?,
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            event_type: row.try_get("event_type")?,
            schema_version: row.try_get("schema_version")?,
            payload: row.try_get("payload")?,
            occurred_at: row.try_get("occurred_at")?,
            available_at: row.try_get("available_at")?,
            processed_at: row.try_get("processed_at")?,
            retry_count: row.try_get("retry_count")?,
            last_error: row.try_get("last_error")?,
            claimed_by: row
                .try_get::<Option<Uuid>, _>("claimed_by")?
                .map(WorkerId::from_uuid),
            claimed_until: row.try_get("claimed_until")?,
            dead_lettered: row.try_get("dead_lettered")?,
        })
    }

    fn row_to_record(row: PgRow) -> Result<AggregateRecord> {
        Ok(AggregateRecord {
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            status: row.try_get("status")?,
            is_deleted: row.try_get("is_deleted")?,
            revision: Revision::new(row.try_get("revision")?),
            state: row.try_get("state")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn current_revision(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        aggregate_id: AggregateId,
    ) -> Result<Revision> {
        let revision: Option<i64> =
            sqlx::query_scalar("SELECT revision FROM aggregates WHERE aggregate_id = $1")
                .bind(aggregate_id.as_uuid())
                .fetch_optional(&mut **tx)
                .await?;
        Ok(revision.map(Revision::new).unwrap_or_default())
    }
}

#[async_trait]
impl OutboxStore for PostgresOutboxStore {
    async fn commit(
        &self,
        writes: Vec<AggregateWrite>,
        messages: Vec<OutboxMessage>,
    ) -> Result<()> {
        validate_commit(&writes, &messages)?;

        let mut tx = self.pool.begin().await?;

        for write in &writes {
            let record = &write.record;
            let affected = if write.expected_revision == Revision::initial() {
                sqlx::query(
                    r#"
                    INSERT INTO aggregates (aggregate_id, aggregate_type, status, is_deleted, revision, state, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    ON CONFLICT (aggregate_id) DO NOTHING
                    "#,
                )
                .bind(record.aggregate_id.as_uuid())
                .bind(&record.aggregate_type)
                .bind(&record.status)
                .bind(record.is_deleted)
                .bind(record.revision.as_i64())
                .bind(&record.state)
                .bind(record.updated_at)
                .execute(&mut *tx)
                .await?
                .rows_affected()
            } else {
                sqlx::query(
                    r#"
                    UPDATE aggregates
                    SET status = $3, is_deleted = $4, revision = $5, state = $6, updated_at = $7
                    WHERE aggregate_id = $1 AND revision = $2
                    "#,
                )
                .bind(record.aggregate_id.as_uuid())
                .bind(write.expected_revision.as_i64())
                .bind(&record.status)
                .bind(record.is_deleted)
                .bind(record.revision.as_i64())
                .bind(&record.state)
                .bind(record.updated_at)
                .execute(&mut *tx)
                .await?
                .rows_affected()
            };

            if affected == 0 {
                let actual = Self::current_revision(&mut tx, record.aggregate_id).await?;
                return Err(OutboxError::RevisionConflict {
                    aggregate_id: record.aggregate_id,
                    expected: write.expected_revision,
                    actual,
                });
            }
        }

        for message in &messages {
            sqlx::query(
                r#"
                INSERT INTO outbox_messages
                    (event_id, aggregate_id, aggregate_type, event_type, schema_version,
                     payload, occurred_at, available_at, retry_count, dead_lettered)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, FALSE)
                "#,
            )
            .bind(message.event_id.as_uuid())
            .bind(message.aggregate_id.as_uuid())
            .bind(&message.aggregate_type)
            .bind(&message.event_type)
            .bind(message.schema_version)
            .bind(&message.payload)
            .bind(message.occurred_at)
            .bind(message.available_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        metrics::counter!("outbox_messages_committed_total").increment(messages.len() as u64);
        tracing::debug!(
            writes = writes.len(),
            messages = messages.len(),
            "outbox commit applied"
        );
        Ok(())
    }

    async fn load_record(
        &self,
        aggregate_id: AggregateId,
        filter: SoftDeleteFilter,
    ) -> Result<Option<AggregateRecord>> {
        let sql = match filter {
            SoftDeleteFilter::ExcludeDeleted => {
                "SELECT aggregate_id, aggregate_type, status, is_deleted, revision, state, updated_at
                 FROM aggregates WHERE aggregate_id = $1 AND NOT is_deleted"
            }
            SoftDeleteFilter::IncludeDeleted => {
                "SELECT aggregate_id, aggregate_type, status, is_deleted, revision, state, updated_at
                 FROM aggregates WHERE aggregate_id = $1"
            }
        };

        let row = sqlx::query(sql)
            .bind(aggregate_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn claim_batch(
        &self,
        worker: WorkerId,
        limit: usize,
        lease: Duration,
    ) -> Result<Vec<OutboxMessage>> {
        let now = Utc::now();
        let claimed_until = now + lease;

        // Head-of-line rule: a row is claimable only if no earlier
        // unresolved row exists for its aggregate. SKIP LOCKED keeps
        // concurrent workers from blocking on each other's candidates.
        let sql = r#"
            WITH eligible AS (
                SELECT o.sequence
                FROM outbox_messages o
                WHERE o.processed_at IS NULL
                  AND NOT o.dead_lettered
                  AND o.available_at <= $2
                  AND (o.claimed_until IS NULL OR o.claimed_until < $2)
                  AND NOT EXISTS (
                      SELECT 1 FROM outbox_messages e
                      WHERE e.aggregate_id = o.aggregate_id
                        AND e.sequence < o.sequence
                        AND e.processed_at IS NULL
                        AND NOT e.dead_lettered
                  )
                ORDER BY o.sequence
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            UPDATE outbox_messages m
            SET claimed_by = $1, claimed_until = $4
            FROM eligible
            WHERE m.sequence = eligible.sequence
            RETURNING m.sequence, m.event_id, m.aggregate_id, m.aggregate_type, m.event_type,
                      m.schema_version, m.payload, m.occurred_at, m.available_at, m.processed_at,
                      m.retry_count, m.last_error, m.claimed_by, m.claimed_until, m.dead_lettered
            "#;

        let rows = sqlx::query(sql)
            .bind(worker.as_uuid())
            .bind(now)
            .bind(limit as i64)
            .bind(claimed_until)
            .fetch_all(&self.pool)
            .await?;

        let mut messages = rows
            .into_iter()
            .map(Self::row_to_message)
            .collect::<Result<Vec<_>>>()?;
        // UPDATE ... RETURNING gives no ordering guarantee.
        messages.sort_by_key(|m| m.sequence);
        Ok(messages)
    }

    async fn mark_processed(&self, event_id: EventId, worker: WorkerId) -> Result<()> {
        let affected = sqlx::query(
            r#"
            UPDATE outbox_messages
            SET processed_at = $3, claimed_by = NULL, claimed_until = NULL
            WHERE event_id = $1 AND claimed_by = $2 AND processed_at IS NULL
            "#,
        )
        .bind(event_id.as_uuid())
        .bind(worker.as_uuid())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM outbox_messages WHERE event_id = $1)",
            )
            .bind(event_id.as_uuid())
            .fetch_one(&self.pool)
            .await?;
            return Err(if exists {
                OutboxError::LeaseLost { event_id }
            } else {
                OutboxError::MessageNotFound(event_id)
            });
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        event_id: EventId,
        worker: WorkerId,
        error: &str,
        disposition: FailureDisposition,
    ) -> Result<()> {
        let affected = match disposition {
            FailureDisposition::Retry { available_at } => sqlx::query(
                r#"
                UPDATE outbox_messages
                SET retry_count = retry_count + 1, last_error = $3,
                    claimed_by = NULL, claimed_until = NULL, available_at = $4
                WHERE event_id = $1 AND claimed_by = $2 AND processed_at IS NULL
                "#,
            )
            .bind(event_id.as_uuid())
            .bind(worker.as_uuid())
            .bind(error)
            .bind(available_at)
            .execute(&self.pool)
            .await?
            .rows_affected(),
            FailureDisposition::DeadLetter => sqlx::query(
                r#"
                UPDATE outbox_messages
                SET retry_count = retry_count + 1, last_error = $3,
                    claimed_by = NULL, claimed_until = NULL, dead_lettered = TRUE
                WHERE event_id = $1 AND claimed_by = $2 AND processed_at IS NULL
                "#,
            )
            .bind(event_id.as_uuid())
            .bind(worker.as_uuid())
            .bind(error)
            .execute(&self.pool)
            .await?
            .rows_affected(),
        };

        if affected == 0 {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM outbox_messages WHERE event_id = $1)",
            )
            .bind(event_id.as_uuid())
            .fetch_one(&self.pool)
            .await?;
            return Err(if exists {
                OutboxError::LeaseLost { event_id }
            } else {
                OutboxError::MessageNotFound(event_id)
            });
        }
        Ok(())
    }

    async fn messages_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<OutboxMessage>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM outbox_messages WHERE aggregate_id = $1 ORDER BY sequence"
        );
        let rows = sqlx::query(&sql)
            .bind(aggregate_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_message).collect()
    }

    async fn pending_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM outbox_messages WHERE processed_at IS NULL AND NOT dead_lettered",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn dead_letters(&self, query: DeadLetterQuery) -> Result<Vec<OutboxMessage>> {
        let mut sql =
            format!("SELECT {MESSAGE_COLUMNS} FROM outbox_messages WHERE dead_lettered");
        let mut param_count = 0;

        if query.event_type.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND event_type = ${param_count}"));
        }
        if query.occurred_from.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND occurred_at >= ${param_count}"));
        }
        if query.occurred_to.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND occurred_at <= ${param_count}"));
        }
        if query.error_contains.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND last_error LIKE ${param_count}"));
        }
        sql.push_str(" ORDER BY sequence");
        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);
        if let Some(event_type) = query.event_type {
            sqlx_query = sqlx_query.bind(event_type);
        }
        if let Some(from) = query.occurred_from {
            sqlx_query = sqlx_query.bind(from);
        }
        if let Some(to) = query.occurred_to {
            sqlx_query = sqlx_query.bind(to);
        }
        if let Some(needle) = query.error_contains {
            sqlx_query = sqlx_query.bind(format!("%{needle}%"));
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_message).collect()
    }

    async fn replay_dead_letter(&self, event_id: EventId) -> Result<bool> {
        let affected = sqlx::query(
            r#"
            UPDATE outbox_messages
            SET dead_lettered = FALSE, retry_count = 0, last_error = NULL,
                available_at = $2, claimed_by = NULL, claimed_until = NULL
            WHERE event_id = $1 AND dead_lettered
            "#,
        )
        .bind(event_id.as_uuid())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected > 0)
    }

    async fn prune_processed(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let affected = sqlx::query(
            "DELETE FROM outbox_messages WHERE processed_at IS NOT NULL AND processed_at < $1",
        )
        .bind(older_than)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected)
    }
}
