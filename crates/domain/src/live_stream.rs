//! Live shopping stream aggregate.
//!
//! ```text
//! Scheduled ──► Live ──► Ended
//!     │
//!     └──► Cancelled
//! ```

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::event::{DomainEvent, EventPayload};
use crate::lifecycle::{Aggregate, LifecycleCore, Operation, Status, TransitionTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LiveStreamStatus {
    #[default]
    Scheduled,
    Live,
    Ended,
    Cancelled,
}

impl Status for LiveStreamStatus {
    fn label(&self) -> &'static str {
        match self {
            LiveStreamStatus::Scheduled => "Scheduled",
            LiveStreamStatus::Live => "Live",
            LiveStreamStatus::Ended => "Ended",
            LiveStreamStatus::Cancelled => "Cancelled",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, LiveStreamStatus::Ended | LiveStreamStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiveStreamOperation {
    GoLive,
    End,
    Cancel,
}

impl Operation for LiveStreamOperation {
    fn label(&self) -> &'static str {
        match self {
            LiveStreamOperation::GoLive => "GoLive",
            LiveStreamOperation::End => "End",
            LiveStreamOperation::Cancel => "Cancel",
        }
    }
}

static TRANSITIONS: LazyLock<TransitionTable<LiveStreamStatus, LiveStreamOperation>> =
    LazyLock::new(|| {
        TransitionTable::builder()
            .allow(
                LiveStreamStatus::Scheduled,
                LiveStreamOperation::GoLive,
                LiveStreamStatus::Live,
            )
            .allow(LiveStreamStatus::Live, LiveStreamOperation::End, LiveStreamStatus::Ended)
            .allow(
                LiveStreamStatus::Scheduled,
                LiveStreamOperation::Cancel,
                LiveStreamStatus::Cancelled,
            )
            .build()
    });

/// Events raised by the live stream aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum LiveStreamEvent {
    LiveStreamScheduled {
        title: String,
        scheduled_for: DateTime<Utc>,
    },
    LiveStreamStarted {
        started_at: DateTime<Utc>,
    },
    LiveStreamEnded {
        ended_at: DateTime<Utc>,
        peak_viewers: u32,
    },
    LiveStreamCancelled {
        reason: String,
        cancelled_at: DateTime<Utc>,
    },
    LiveStreamDeleted {
        deleted_at: DateTime<Utc>,
    },
}

impl EventPayload for LiveStreamEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LiveStreamEvent::LiveStreamScheduled { .. } => "LiveStreamScheduled",
            LiveStreamEvent::LiveStreamStarted { .. } => "LiveStreamStarted",
            LiveStreamEvent::LiveStreamEnded { .. } => "LiveStreamEnded",
            LiveStreamEvent::LiveStreamCancelled { .. } => "LiveStreamCancelled",
            LiveStreamEvent::LiveStreamDeleted { .. } => "LiveStreamDeleted",
        }
    }
}

/// A scheduled live shopping broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveStream {
    #[serde(flatten)]
    core: LifecycleCore<LiveStreamStatus>,
    title: String,
    scheduled_for: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl Aggregate for LiveStream {
    type Status = LiveStreamStatus;

    fn aggregate_type() -> &'static str {
        "LiveStream"
    }

    fn core(&self) -> &LifecycleCore<LiveStreamStatus> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LifecycleCore<LiveStreamStatus> {
        &mut self.core
    }
}

impl LiveStream {
    /// Schedules a new stream.
    pub fn schedule(
        title: impl Into<String>,
        scheduled_for: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(DomainError::Validation {
                aggregate_type: Self::aggregate_type(),
                message: "a stream needs a title".to_string(),
            });
        }

        let id = AggregateId::new();
        let mut stream = Self {
            core: LifecycleCore::new(id, LiveStreamStatus::Scheduled),
            title: title.clone(),
            scheduled_for,
            started_at: None,
            ended_at: None,
        };
        let event = DomainEvent::record(
            id,
            Self::aggregate_type(),
            &LiveStreamEvent::LiveStreamScheduled {
                title,
                scheduled_for,
            },
        )?;
        stream.core.record(event);
        Ok(stream)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn scheduled_for(&self) -> DateTime<Utc> {
        self.scheduled_for
    }

    /// Starts the broadcast.
    pub fn go_live(&mut self) -> Result<(), DomainError> {
        let next = self
            .core
            .guard(&TRANSITIONS, LiveStreamOperation::GoLive, Self::aggregate_type())?;
        let started_at = Utc::now();
        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &LiveStreamEvent::LiveStreamStarted { started_at },
        )?;
        self.started_at = Some(started_at);
        self.core.advance(next, event);
        Ok(())
    }

    /// Ends the broadcast.
    pub fn end(&mut self, peak_viewers: u32) -> Result<(), DomainError> {
        let next = self
            .core
            .guard(&TRANSITIONS, LiveStreamOperation::End, Self::aggregate_type())?;
        let ended_at = Utc::now();
        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &LiveStreamEvent::LiveStreamEnded {
                ended_at,
                peak_viewers,
            },
        )?;
        self.ended_at = Some(ended_at);
        self.core.advance(next, event);
        Ok(())
    }

    /// Cancels a stream that has not gone live.
    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        let next = self
            .core
            .guard(&TRANSITIONS, LiveStreamOperation::Cancel, Self::aggregate_type())?;
        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &LiveStreamEvent::LiveStreamCancelled {
                reason: reason.into(),
                cancelled_at: Utc::now(),
            },
        )?;
        self.core.advance(next, event);
        Ok(())
    }

    /// Soft-deletes the stream.
    pub fn mark_as_deleted(&mut self) -> Result<(), DomainError> {
        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &LiveStreamEvent::LiveStreamDeleted {
                deleted_at: Utc::now(),
            },
        )?;
        self.core.mark_deleted(Self::aggregate_type(), event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduled_stream_goes_live_then_ends() {
        let mut stream = LiveStream::schedule("Summer drop", Utc::now()).unwrap();
        stream.go_live().unwrap();
        stream.end(1200).unwrap();

        assert_eq!(stream.status(), LiveStreamStatus::Ended);
        assert!(stream.started_at.is_some());
        assert!(stream.ended_at.is_some());
    }

    #[test]
    fn live_stream_cannot_be_cancelled() {
        let mut stream = LiveStream::schedule("Summer drop", Utc::now()).unwrap();
        stream.go_live().unwrap();

        assert!(matches!(
            stream.cancel("host ill"),
            Err(DomainError::InvalidTransition {
                status: "Live",
                operation: "Cancel",
                ..
            })
        ));
    }
}
