//! Dead-letter inspection and replay endpoints.
//!
//! Dead-lettered rows are parked, never dropped; these endpoints let an
//! operator find them (by event type, occurrence window, error text)
//! and push them back into the delivery pipeline.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use outbox::{DeadLetterQuery, EventId, OutboxMessage, OutboxStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OpsError;

/// Query parameters for `GET /dead-letters`.
#[derive(Debug, Deserialize)]
pub struct DeadLetterParams {
    pub event_type: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub error_contains: Option<String>,
    pub limit: Option<usize>,
}

impl DeadLetterParams {
    fn into_query(self) -> DeadLetterQuery {
        let mut query = DeadLetterQuery::new();
        if let Some(event_type) = self.event_type {
            query = query.event_type(event_type);
        }
        if let Some(from) = self.from {
            query = query.occurred_from(from);
        }
        if let Some(to) = self.to {
            query = query.occurred_to(to);
        }
        if let Some(needle) = self.error_contains {
            query = query.error_contains(needle);
        }
        query.limit(self.limit.unwrap_or(100))
    }
}

/// One dead-lettered row as shown to operators.
#[derive(Debug, Serialize)]
pub struct DeadLetterView {
    pub event_id: EventId,
    pub aggregate_id: common::AggregateId,
    pub aggregate_type: String,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub retry_count: i32,
    pub last_error: Option<String>,
}

impl From<OutboxMessage> for DeadLetterView {
    fn from(message: OutboxMessage) -> Self {
        Self {
            event_id: message.event_id,
            aggregate_id: message.aggregate_id,
            aggregate_type: message.aggregate_type,
            event_type: message.event_type,
            occurred_at: message.occurred_at,
            retry_count: message.retry_count,
            last_error: message.last_error,
        }
    }
}

/// GET /dead-letters — lists dead-lettered rows matching the filters.
pub async fn list<S: OutboxStore>(
    State(store): State<Arc<S>>,
    Query(params): Query<DeadLetterParams>,
) -> Result<Json<Vec<DeadLetterView>>, OpsError> {
    let messages = store.dead_letters(params.into_query()).await?;
    Ok(Json(messages.into_iter().map(DeadLetterView::from).collect()))
}

/// POST /dead-letters/{event_id}/replay — resets a dead-lettered row so
/// it re-enters the claim loop.
pub async fn replay<S: OutboxStore>(
    State(store): State<Arc<S>>,
    Path(event_id): Path<Uuid>,
) -> Result<StatusCode, OpsError> {
    let replayed = store.replay_dead_letter(EventId::from_uuid(event_id)).await?;
    if replayed {
        tracing::info!(%event_id, "dead letter replayed by operator");
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(OpsError::NotFound(format!(
            "no dead-lettered message with event_id {event_id}"
        )))
    }
}
