use chrono::{DateTime, Utc};

use crate::OutboxMessage;

/// Builder for dead-letter queries.
///
/// Operators narrow the parked rows by event type, occurrence window and
/// error text before deciding what to replay.
#[derive(Debug, Clone, Default)]
pub struct DeadLetterQuery {
    /// Filter by event type.
    pub event_type: Option<String>,

    /// Filter by events that occurred at or after this time.
    pub occurred_from: Option<DateTime<Utc>>,

    /// Filter by events that occurred at or before this time.
    pub occurred_to: Option<DateTime<Utc>>,

    /// Filter by a substring of the recorded last error.
    pub error_contains: Option<String>,

    /// Maximum number of rows to return.
    pub limit: Option<usize>,
}

impl DeadLetterQuery {
    /// Creates a new empty query (all dead letters).
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by event type.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Filters by events occurring at or after the given time.
    pub fn occurred_from(mut self, from: DateTime<Utc>) -> Self {
        self.occurred_from = Some(from);
        self
    }

    /// Filters by events occurring at or before the given time.
    pub fn occurred_to(mut self, to: DateTime<Utc>) -> Self {
        self.occurred_to = Some(to);
        self
    }

    /// Filters by a substring of the recorded error.
    pub fn error_contains(mut self, needle: impl Into<String>) -> Self {
        self.error_contains = Some(needle.into());
        self
    }

    /// Limits the number of returned rows.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if a dead-lettered row matches every set filter.
    /// Used by the in-memory store; the PostgreSQL store translates the
    /// same filters to SQL.
    pub fn matches(&self, message: &OutboxMessage) -> bool {
        if let Some(ref event_type) = self.event_type
            && &message.event_type != event_type
        {
            return false;
        }
        if let Some(from) = self.occurred_from
            && message.occurred_at < from
        {
            return false;
        }
        if let Some(to) = self.occurred_to
            && message.occurred_at > to
        {
            return false;
        }
        if let Some(ref needle) = self.error_contains {
            match &message.last_error {
                Some(error) if error.contains(needle.as_str()) => {}
                _ => return false,
            }
        }
        true
    }
}
