use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::{
    AggregateId, AggregateRecord, AggregateWrite, DeadLetterQuery, EventId, OutboxError,
    OutboxMessage, Result, SoftDeleteFilter, WorkerId,
    store::{FailureDisposition, OutboxStore, validate_commit},
};

#[derive(Default)]
struct Inner {
    records: HashMap<AggregateId, AggregateRecord>,
    messages: Vec<OutboxMessage>,
    next_sequence: i64,
}

/// In-memory store implementation for testing.
///
/// Commit atomicity comes from a single write-locked critical section
/// that validates every revision before applying anything. The claim
/// path mirrors the PostgreSQL implementation's eligibility rules so
/// tests exercise the same semantics.
#[derive(Clone, Default)]
pub struct InMemoryOutboxStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryOutboxStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of outbox rows.
    pub async fn message_count(&self) -> usize {
        self.inner.read().await.messages.len()
    }

    /// Clears all records and messages.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.records.clear();
        inner.messages.clear();
        inner.next_sequence = 0;
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn commit(
        &self,
        writes: Vec<AggregateWrite>,
        messages: Vec<OutboxMessage>,
    ) -> Result<()> {
        validate_commit(&writes, &messages)?;

        let mut inner = self.inner.write().await;

        // Validate every revision before touching anything, so a
        // conflict on the second aggregate cannot leave the first one
        // half-written.
        for write in &writes {
            let actual = inner
                .records
                .get(&write.record.aggregate_id)
                .map(|r| r.revision)
                .unwrap_or_default();
            if actual != write.expected_revision {
                return Err(OutboxError::RevisionConflict {
                    aggregate_id: write.record.aggregate_id,
                    expected: write.expected_revision,
                    actual,
                });
            }
        }

        for write in writes {
            inner.records.insert(write.record.aggregate_id, write.record);
        }
        for mut message in messages {
            inner.next_sequence += 1;
            message.sequence = inner.next_sequence;
            inner.messages.push(message);
        }

        Ok(())
    }

    async fn load_record(
        &self,
        aggregate_id: AggregateId,
        filter: SoftDeleteFilter,
    ) -> Result<Option<AggregateRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .get(&aggregate_id)
            .filter(|record| filter.admits(record.is_deleted))
            .cloned())
    }

    async fn claim_batch(
        &self,
        worker: WorkerId,
        limit: usize,
        lease: Duration,
    ) -> Result<Vec<OutboxMessage>> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        let mut claimed = Vec::new();

        // Messages are stored in sequence order. `seen` tracks
        // aggregates whose head row was already reached in this scan;
        // anything after the head is skipped so delivery stays FIFO per
        // aggregate even when the head is backed off or leased.
        let mut seen: HashSet<AggregateId> = HashSet::new();

        for message in inner.messages.iter_mut() {
            if claimed.len() >= limit {
                break;
            }
            if message.is_processed() || message.dead_lettered {
                continue;
            }
            if !seen.insert(message.aggregate_id) {
                continue;
            }
            if message.available_at > now || !message.lease_expired(now) {
                continue;
            }

            message.claimed_by = Some(worker);
            message.claimed_until = Some(now + lease);
            claimed.push(message.clone());
        }

        Ok(claimed)
    }

    async fn mark_processed(&self, event_id: EventId, worker: WorkerId) -> Result<()> {
        let mut inner = self.inner.write().await;
        let message = inner
            .messages
            .iter_mut()
            .find(|m| m.event_id == event_id)
            .ok_or(OutboxError::MessageNotFound(event_id))?;

        if message.is_processed() || message.claimed_by != Some(worker) {
            return Err(OutboxError::LeaseLost { event_id });
        }

        message.processed_at = Some(Utc::now());
        message.claimed_by = None;
        message.claimed_until = None;
        Ok(())
    }

    async fn mark_failed(
        &self,
        event_id: EventId,
        worker: WorkerId,
        error: &str,
        disposition: FailureDisposition,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let message = inner
            .messages
            .iter_mut()
            .find(|m| m.event_id == event_id)
            .ok_or(OutboxError::MessageNotFound(event_id))?;

        if message.is_processed() || message.claimed_by != Some(worker) {
            return Err(OutboxError::LeaseLost { event_id });
        }

        message.retry_count += 1;
        message.last_error = Some(error.to_string());
        message.claimed_by = None;
        message.claimed_until = None;
        match disposition {
            FailureDisposition::Retry { available_at } => {
                message.available_at = available_at;
            }
            FailureDisposition::DeadLetter => {
                message.dead_lettered = true;
            }
        }
        Ok(())
    }

    async fn messages_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<OutboxMessage>> {
        let inner = self.inner.read().await;
        let mut messages: Vec<_> = inner
            .messages
            .iter()
            .filter(|m| m.aggregate_id == aggregate_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.sequence);
        Ok(messages)
    }

    async fn pending_count(&self) -> Result<u64> {
        let inner = self.inner.read().await;
        Ok(inner.messages.iter().filter(|m| m.is_pending()).count() as u64)
    }

    async fn dead_letters(&self, query: DeadLetterQuery) -> Result<Vec<OutboxMessage>> {
        let inner = self.inner.read().await;
        let mut matching: Vec<_> = inner
            .messages
            .iter()
            .filter(|m| m.dead_lettered && query.matches(m))
            .cloned()
            .collect();
        matching.sort_by_key(|m| m.sequence);
        if let Some(limit) = query.limit {
            matching.truncate(limit);
        }
        Ok(matching)
    }

    async fn replay_dead_letter(&self, event_id: EventId) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(message) = inner
            .messages
            .iter_mut()
            .find(|m| m.event_id == event_id && m.dead_lettered)
        else {
            return Ok(false);
        };

        message.dead_lettered = false;
        message.retry_count = 0;
        message.last_error = None;
        message.available_at = Utc::now();
        message.claimed_by = None;
        message.claimed_until = None;
        Ok(true)
    }

    async fn prune_processed(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.messages.len();
        inner
            .messages
            .retain(|m| !matches!(m.processed_at, Some(at) if at < older_than));
        Ok((before - inner.messages.len()) as u64)
    }
}
