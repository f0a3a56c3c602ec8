//! Return request aggregate.
//!
//! ```text
//! Requested ──► Approved ──► Completed
//!     │
//!     └──► Rejected
//! ```

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::event::{DomainEvent, EventPayload};
use crate::lifecycle::{Aggregate, LifecycleCore, Operation, Status, TransitionTable};
use crate::order::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ReturnRequestStatus {
    #[default]
    Requested,
    Approved,
    Rejected,
    Completed,
}

impl Status for ReturnRequestStatus {
    fn label(&self) -> &'static str {
        match self {
            ReturnRequestStatus::Requested => "Requested",
            ReturnRequestStatus::Approved => "Approved",
            ReturnRequestStatus::Rejected => "Rejected",
            ReturnRequestStatus::Completed => "Completed",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReturnRequestStatus::Rejected | ReturnRequestStatus::Completed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnRequestOperation {
    Approve,
    Reject,
    Complete,
}

impl Operation for ReturnRequestOperation {
    fn label(&self) -> &'static str {
        match self {
            ReturnRequestOperation::Approve => "Approve",
            ReturnRequestOperation::Reject => "Reject",
            ReturnRequestOperation::Complete => "Complete",
        }
    }
}

static TRANSITIONS: LazyLock<TransitionTable<ReturnRequestStatus, ReturnRequestOperation>> =
    LazyLock::new(|| {
        TransitionTable::builder()
            .allow(
                ReturnRequestStatus::Requested,
                ReturnRequestOperation::Approve,
                ReturnRequestStatus::Approved,
            )
            .allow(
                ReturnRequestStatus::Requested,
                ReturnRequestOperation::Reject,
                ReturnRequestStatus::Rejected,
            )
            .allow(
                ReturnRequestStatus::Approved,
                ReturnRequestOperation::Complete,
                ReturnRequestStatus::Completed,
            )
            .build()
    });

/// Events raised by the return request aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ReturnRequestEvent {
    ReturnRequested {
        order_id: AggregateId,
        reason: String,
        requested_at: DateTime<Utc>,
    },
    ReturnApproved {
        note: Option<String>,
        approved_at: DateTime<Utc>,
    },
    ReturnRejected {
        note: String,
        rejected_at: DateTime<Utc>,
    },
    ReturnCompleted {
        refund_amount: Money,
        completed_at: DateTime<Utc>,
    },
    ReturnRequestDeleted {
        deleted_at: DateTime<Utc>,
    },
}

impl EventPayload for ReturnRequestEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReturnRequestEvent::ReturnRequested { .. } => "ReturnRequested",
            ReturnRequestEvent::ReturnApproved { .. } => "ReturnApproved",
            ReturnRequestEvent::ReturnRejected { .. } => "ReturnRejected",
            ReturnRequestEvent::ReturnCompleted { .. } => "ReturnCompleted",
            ReturnRequestEvent::ReturnRequestDeleted { .. } => "ReturnRequestDeleted",
        }
    }
}

/// A customer's request to return a delivered order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnRequest {
    #[serde(flatten)]
    core: LifecycleCore<ReturnRequestStatus>,
    order_id: AggregateId,
    reason: String,
    resolution_note: Option<String>,
}

impl Aggregate for ReturnRequest {
    type Status = ReturnRequestStatus;

    fn aggregate_type() -> &'static str {
        "ReturnRequest"
    }

    fn core(&self) -> &LifecycleCore<ReturnRequestStatus> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LifecycleCore<ReturnRequestStatus> {
        &mut self.core
    }
}

impl ReturnRequest {
    /// Opens a return request for an order.
    pub fn create(order_id: AggregateId, reason: impl Into<String>) -> Result<Self, DomainError> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(DomainError::Validation {
                aggregate_type: Self::aggregate_type(),
                message: "a return request needs a reason".to_string(),
            });
        }

        let id = AggregateId::new();
        let mut request = Self {
            core: LifecycleCore::new(id, ReturnRequestStatus::Requested),
            order_id,
            reason: reason.clone(),
            resolution_note: None,
        };
        let event = DomainEvent::record(
            id,
            Self::aggregate_type(),
            &ReturnRequestEvent::ReturnRequested {
                order_id,
                reason,
                requested_at: Utc::now(),
            },
        )?;
        request.core.record(event);
        Ok(request)
    }

    pub fn order_id(&self) -> AggregateId {
        self.order_id
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn resolution_note(&self) -> Option<&str> {
        self.resolution_note.as_deref()
    }

    /// Approves the return.
    pub fn approve(&mut self, note: Option<String>) -> Result<(), DomainError> {
        let next = self.core.guard(
            &TRANSITIONS,
            ReturnRequestOperation::Approve,
            Self::aggregate_type(),
        )?;
        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &ReturnRequestEvent::ReturnApproved {
                note: note.clone(),
                approved_at: Utc::now(),
            },
        )?;
        self.resolution_note = note;
        self.core.advance(next, event);
        Ok(())
    }

    /// Rejects the return with a mandatory note for the customer.
    pub fn reject(&mut self, note: impl Into<String>) -> Result<(), DomainError> {
        let next = self.core.guard(
            &TRANSITIONS,
            ReturnRequestOperation::Reject,
            Self::aggregate_type(),
        )?;
        let note = note.into();
        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &ReturnRequestEvent::ReturnRejected {
                note: note.clone(),
                rejected_at: Utc::now(),
            },
        )?;
        self.resolution_note = Some(note);
        self.core.advance(next, event);
        Ok(())
    }

    /// Completes an approved return once the goods arrived back.
    pub fn complete(&mut self, refund_amount: Money) -> Result<(), DomainError> {
        let next = self.core.guard(
            &TRANSITIONS,
            ReturnRequestOperation::Complete,
            Self::aggregate_type(),
        )?;
        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &ReturnRequestEvent::ReturnCompleted {
                refund_amount,
                completed_at: Utc::now(),
            },
        )?;
        self.core.advance(next, event);
        Ok(())
    }

    /// Soft-deletes the return request.
    pub fn mark_as_deleted(&mut self) -> Result<(), DomainError> {
        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &ReturnRequestEvent::ReturnRequestDeleted {
                deleted_at: Utc::now(),
            },
        )?;
        self.core.mark_deleted(Self::aggregate_type(), event)
    }
}
