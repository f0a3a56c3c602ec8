//! Support ticket aggregate.
//!
//! ```text
//! Open ──► InProgress ──► Resolved ──► Closed
//!  ▲                         │
//!  └─────────────────────────┘  (reopen)
//! ```

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::event::{DomainEvent, EventPayload};
use crate::lifecycle::{Aggregate, LifecycleCore, Operation, Status, TransitionTable};
use crate::order::CustomerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TicketStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl Status for TicketStatus {
    fn label(&self) -> &'static str {
        match self {
            TicketStatus::Open => "Open",
            TicketStatus::InProgress => "InProgress",
            TicketStatus::Resolved => "Resolved",
            TicketStatus::Closed => "Closed",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, TicketStatus::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketOperation {
    StartProgress,
    Resolve,
    Close,
    Reopen,
}

impl Operation for TicketOperation {
    fn label(&self) -> &'static str {
        match self {
            TicketOperation::StartProgress => "StartProgress",
            TicketOperation::Resolve => "Resolve",
            TicketOperation::Close => "Close",
            TicketOperation::Reopen => "Reopen",
        }
    }
}

static TRANSITIONS: LazyLock<TransitionTable<TicketStatus, TicketOperation>> =
    LazyLock::new(|| {
        TransitionTable::builder()
            .allow(TicketStatus::Open, TicketOperation::StartProgress, TicketStatus::InProgress)
            .allow(TicketStatus::InProgress, TicketOperation::Resolve, TicketStatus::Resolved)
            .allow(TicketStatus::Resolved, TicketOperation::Close, TicketStatus::Closed)
            .allow(TicketStatus::Resolved, TicketOperation::Reopen, TicketStatus::Open)
            .build()
    });

/// Events raised by the support ticket aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TicketEvent {
    TicketOpened {
        customer_id: CustomerId,
        subject: String,
        opened_at: DateTime<Utc>,
    },
    TicketAssigned {
        assignee: String,
        assigned_at: DateTime<Utc>,
    },
    TicketResolved {
        resolution: String,
        resolved_at: DateTime<Utc>,
    },
    TicketClosed {
        closed_at: DateTime<Utc>,
    },
    TicketReopened {
        reason: String,
        reopened_at: DateTime<Utc>,
    },
    TicketDeleted {
        deleted_at: DateTime<Utc>,
    },
}

impl EventPayload for TicketEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TicketEvent::TicketOpened { .. } => "TicketOpened",
            TicketEvent::TicketAssigned { .. } => "TicketAssigned",
            TicketEvent::TicketResolved { .. } => "TicketResolved",
            TicketEvent::TicketClosed { .. } => "TicketClosed",
            TicketEvent::TicketReopened { .. } => "TicketReopened",
            TicketEvent::TicketDeleted { .. } => "TicketDeleted",
        }
    }
}

/// A customer support ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportTicket {
    #[serde(flatten)]
    core: LifecycleCore<TicketStatus>,
    customer_id: CustomerId,
    subject: String,
    assignee: Option<String>,
    resolution: Option<String>,
}

impl Aggregate for SupportTicket {
    type Status = TicketStatus;

    fn aggregate_type() -> &'static str {
        "SupportTicket"
    }

    fn core(&self) -> &LifecycleCore<TicketStatus> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LifecycleCore<TicketStatus> {
        &mut self.core
    }
}

impl SupportTicket {
    /// Opens a ticket for a customer.
    pub fn open(
        customer_id: CustomerId,
        subject: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let subject = subject.into();
        if subject.trim().is_empty() {
            return Err(DomainError::Validation {
                aggregate_type: Self::aggregate_type(),
                message: "a ticket needs a subject".to_string(),
            });
        }

        let id = AggregateId::new();
        let mut ticket = Self {
            core: LifecycleCore::new(id, TicketStatus::Open),
            customer_id,
            subject: subject.clone(),
            assignee: None,
            resolution: None,
        };
        let event = DomainEvent::record(
            id,
            Self::aggregate_type(),
            &TicketEvent::TicketOpened {
                customer_id,
                subject,
                opened_at: Utc::now(),
            },
        )?;
        ticket.core.record(event);
        Ok(ticket)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn assignee(&self) -> Option<&str> {
        self.assignee.as_deref()
    }

    /// Assigns an agent and starts work.
    pub fn start_progress(&mut self, assignee: impl Into<String>) -> Result<(), DomainError> {
        let next = self.core.guard(
            &TRANSITIONS,
            TicketOperation::StartProgress,
            Self::aggregate_type(),
        )?;
        let assignee = assignee.into();
        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &TicketEvent::TicketAssigned {
                assignee: assignee.clone(),
                assigned_at: Utc::now(),
            },
        )?;
        self.assignee = Some(assignee);
        self.core.advance(next, event);
        Ok(())
    }

    /// Resolves the ticket with a resolution note.
    pub fn resolve(&mut self, resolution: impl Into<String>) -> Result<(), DomainError> {
        let next = self
            .core
            .guard(&TRANSITIONS, TicketOperation::Resolve, Self::aggregate_type())?;
        let resolution = resolution.into();
        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &TicketEvent::TicketResolved {
                resolution: resolution.clone(),
                resolved_at: Utc::now(),
            },
        )?;
        self.resolution = Some(resolution);
        self.core.advance(next, event);
        Ok(())
    }

    /// Closes a resolved ticket.
    pub fn close(&mut self) -> Result<(), DomainError> {
        let next = self
            .core
            .guard(&TRANSITIONS, TicketOperation::Close, Self::aggregate_type())?;
        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &TicketEvent::TicketClosed {
                closed_at: Utc::now(),
            },
        )?;
        self.core.advance(next, event);
        Ok(())
    }

    /// Reopens a resolved ticket; clears the previous resolution.
    pub fn reopen(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        let next = self
            .core
            .guard(&TRANSITIONS, TicketOperation::Reopen, Self::aggregate_type())?;
        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &TicketEvent::TicketReopened {
                reason: reason.into(),
                reopened_at: Utc::now(),
            },
        )?;
        self.resolution = None;
        self.core.advance(next, event);
        Ok(())
    }

    /// Soft-deletes the ticket.
    pub fn mark_as_deleted(&mut self) -> Result<(), DomainError> {
        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &TicketEvent::TicketDeleted {
                deleted_at: Utc::now(),
            },
        )?;
        self.core.mark_deleted(Self::aggregate_type(), event)
    }
}
