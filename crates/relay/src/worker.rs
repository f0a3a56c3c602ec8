//! The relay worker: claim, dispatch, acknowledge.

use std::sync::Arc;

use chrono::Utc;
use domain::DomainEvent;
use futures_util::StreamExt;
use futures_util::stream;
use outbox::{FailureDisposition, OutboxError, OutboxMessage, OutboxStore, WorkerId};
use tokio::sync::watch;

use crate::handler::HandlerRegistry;
use crate::retry::RetryPolicy;

/// Tuning for one relay worker.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Sleep between polls that found nothing to do.
    pub poll_interval: std::time::Duration,

    /// Maximum rows claimed per poll.
    pub batch_size: usize,

    /// Lease length on claimed rows; must comfortably exceed the
    /// slowest expected handler so live rows are not re-claimed.
    pub lease_duration: chrono::Duration,

    /// Rows processed concurrently within one claimed batch.
    pub handler_concurrency: usize,

    /// Retry/backoff/dead-letter policy.
    pub retry: RetryPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: std::time::Duration::from_millis(500),
            batch_size: 32,
            lease_duration: chrono::Duration::seconds(30),
            handler_concurrency: 8,
            retry: RetryPolicy::default(),
        }
    }
}

/// One long-lived relay worker.
///
/// Runs the poll loop: claim a batch of deliverable rows under a
/// lease, dispatch each row's event to its handlers, and record the
/// outcome. Failures are isolated per row; a handler error never
/// stops the rest of the batch or the loop.
pub struct RelayWorker<S> {
    store: Arc<S>,
    registry: Arc<HandlerRegistry>,
    config: RelayConfig,
    worker_id: WorkerId,
}

impl<S: OutboxStore> RelayWorker<S> {
    /// Creates a worker with a fresh worker ID.
    pub fn new(store: Arc<S>, registry: Arc<HandlerRegistry>, config: RelayConfig) -> Self {
        Self {
            store,
            registry,
            config,
            worker_id: WorkerId::new(),
        }
    }

    /// Returns this worker's ID.
    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    /// Runs the poll loop until the shutdown flag flips.
    ///
    /// An in-flight batch always finishes (its leases are released by
    /// the mark calls) before the loop exits; the flag is only checked
    /// between batches.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(worker = %self.worker_id, "relay worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.run_once().await {
                Ok(0) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown.changed() => break,
                    }
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::error!(worker = %self.worker_id, %error, "relay poll failed");
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }
        tracing::info!(worker = %self.worker_id, "relay worker stopped");
    }

    /// Claims and processes one batch. Returns the number of rows
    /// claimed (0 means nothing was deliverable).
    pub async fn run_once(&self) -> Result<usize, OutboxError> {
        let batch = self
            .store
            .claim_batch(self.worker_id, self.config.batch_size, self.config.lease_duration)
            .await?;
        if batch.is_empty() {
            return Ok(0);
        }

        let claimed = batch.len();
        tracing::debug!(worker = %self.worker_id, claimed, "claimed outbox batch");

        stream::iter(batch)
            .for_each_concurrent(self.config.handler_concurrency, |message| async move {
                self.dispatch(message).await;
            })
            .await;

        Ok(claimed)
    }

    /// Delivers one claimed row to its handlers and records the
    /// outcome. Never returns an error: failures become retry
    /// bookkeeping on the row itself.
    #[tracing::instrument(
        skip(self, message),
        fields(worker = %self.worker_id, event_id = %message.event_id, event_type = %message.event_type)
    )]
    async fn dispatch(&self, message: OutboxMessage) {
        let event = DomainEvent::from_message(&message);
        let handlers = self.registry.handlers_for(&message.event_type);

        if handlers.is_empty() {
            // Delivered to zero subscribers; leaving the row pending
            // would poison the aggregate's delivery queue forever.
            tracing::debug!("no handlers registered, marking processed");
            self.acknowledge_success(&message).await;
            return;
        }

        let mut failure: Option<(&'static str, crate::handler::HandlerError)> = None;
        for handler in &handlers {
            if let Err(error) = handler.handle(&event).await {
                failure = Some((handler.name(), error));
                break;
            }
        }

        match failure {
            None => {
                metrics::counter!("relay_messages_processed_total").increment(1);
                self.acknowledge_success(&message).await;
            }
            Some((handler_name, error)) => {
                let retry_count = message.retry_count + 1;
                let disposition = if error.is_permanent() {
                    FailureDisposition::DeadLetter
                } else {
                    self.config.retry.disposition(retry_count, Utc::now())
                };

                match disposition {
                    FailureDisposition::Retry { available_at } => {
                        metrics::counter!("relay_messages_retried_total").increment(1);
                        tracing::warn!(
                            handler = handler_name,
                            %error,
                            retry_count,
                            %available_at,
                            "delivery failed, rescheduled"
                        );
                    }
                    FailureDisposition::DeadLetter => {
                        metrics::counter!("relay_messages_dead_lettered_total").increment(1);
                        tracing::error!(
                            handler = handler_name,
                            %error,
                            retry_count,
                            "delivery failed permanently, dead-lettered"
                        );
                    }
                }

                let error_record = format!("{handler_name}: {error}");
                if let Err(mark_error) = self
                    .store
                    .mark_failed(message.event_id, self.worker_id, &error_record, disposition)
                    .await
                {
                    self.log_mark_error(&message, mark_error);
                }
            }
        }
    }

    async fn acknowledge_success(&self, message: &OutboxMessage) {
        if let Err(error) = self.store.mark_processed(message.event_id, self.worker_id).await {
            self.log_mark_error(message, error);
        }
    }

    /// A lost lease is expected after a stall longer than the lease
    /// (another worker took over); anything else is a real store
    /// problem.
    fn log_mark_error(&self, message: &OutboxMessage, error: OutboxError) {
        match error {
            OutboxError::LeaseLost { event_id } => {
                tracing::warn!(%event_id, "lease lost before acknowledgement");
            }
            other => {
                tracing::error!(event_id = %message.event_id, error = %other, "failed to acknowledge outbox row");
            }
        }
    }
}
