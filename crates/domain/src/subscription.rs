//! Subscription aggregate.
//!
//! ```text
//! Trial ──► Active ◄──► Suspended
//!   │          │            │
//!   └──────────┴────────────┴──► Cancelled
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
pub enum SubscriptionStatus {
    #[default]
    Trial,
    Active,
    Suspended,
    Cancelled,
}

impl Status for SubscriptionStatus {
    fn label(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trial => "Trial",
            SubscriptionStatus::Active => "Active",
            SubscriptionStatus::Suspended => "Suspended",
            SubscriptionStatus::Cancelled => "Cancelled",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionOperation {
    Activate,
    Suspend,
    Resume,
    Cancel,
}

impl Operation for SubscriptionOperation {
    fn label(&self) -> &'static str {
        match self {
            SubscriptionOperation::Activate => "Activate",
            SubscriptionOperation::Suspend => "Suspend",
            SubscriptionOperation::Resume => "Resume",
            SubscriptionOperation::Cancel => "Cancel",
        }
    }
}

static TRANSITIONS: LazyLock<TransitionTable<SubscriptionStatus, SubscriptionOperation>> =
    LazyLock::new(|| {
        TransitionTable::builder()
            .allow(
                SubscriptionStatus::Trial,
                SubscriptionOperation::Activate,
                SubscriptionStatus::Active,
            )
            .allow(
                SubscriptionStatus::Active,
                SubscriptionOperation::Suspend,
                SubscriptionStatus::Suspended,
            )
            .allow(
                SubscriptionStatus::Suspended,
                SubscriptionOperation::Resume,
                SubscriptionStatus::Active,
            )
            .allow(
                SubscriptionStatus::Trial,
                SubscriptionOperation::Cancel,
                SubscriptionStatus::Cancelled,
            )
            .allow(
                SubscriptionStatus::Active,
                SubscriptionOperation::Cancel,
                SubscriptionStatus::Cancelled,
            )
            .allow(
                SubscriptionStatus::Suspended,
                SubscriptionOperation::Cancel,
                SubscriptionStatus::Cancelled,
            )
            .build()
    });

/// Events raised by the subscription aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SubscriptionEvent {
    SubscriptionStarted {
        customer_id: CustomerId,
        plan_code: String,
        started_at: DateTime<Utc>,
    },
    SubscriptionActivated {
        activated_at: DateTime<Utc>,
    },
    SubscriptionSuspended {
        reason: String,
        suspended_at: DateTime<Utc>,
    },
    SubscriptionResumed {
        resumed_at: DateTime<Utc>,
    },
    SubscriptionCancelled {
        reason: Option<String>,
        cancelled_at: DateTime<Utc>,
    },
    SubscriptionDeleted {
        deleted_at: DateTime<Utc>,
    },
}

impl EventPayload for SubscriptionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SubscriptionEvent::SubscriptionStarted { .. } => "SubscriptionStarted",
            SubscriptionEvent::SubscriptionActivated { .. } => "SubscriptionActivated",
            SubscriptionEvent::SubscriptionSuspended { .. } => "SubscriptionSuspended",
            SubscriptionEvent::SubscriptionResumed { .. } => "SubscriptionResumed",
            SubscriptionEvent::SubscriptionCancelled { .. } => "SubscriptionCancelled",
            SubscriptionEvent::SubscriptionDeleted { .. } => "SubscriptionDeleted",
        }
    }
}

/// A customer's recurring plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(flatten)]
    core: LifecycleCore<SubscriptionStatus>,
    customer_id: CustomerId,
    plan_code: String,
}

impl Aggregate for Subscription {
    type Status = SubscriptionStatus;

    fn aggregate_type() -> &'static str {
        "Subscription"
    }

    fn core(&self) -> &LifecycleCore<SubscriptionStatus> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LifecycleCore<SubscriptionStatus> {
        &mut self.core
    }
}

impl Subscription {
    /// Starts a trial subscription on a plan.
    pub fn start(customer_id: CustomerId, plan_code: impl Into<String>) -> Result<Self, DomainError> {
        let plan_code = plan_code.into();
        let id = AggregateId::new();
        let mut subscription = Self {
            core: LifecycleCore::new(id, SubscriptionStatus::Trial),
            customer_id,
            plan_code: plan_code.clone(),
        };
        let event = DomainEvent::record(
            id,
            Self::aggregate_type(),
            &SubscriptionEvent::SubscriptionStarted {
                customer_id,
                plan_code,
                started_at: Utc::now(),
            },
        )?;
        subscription.core.record(event);
        Ok(subscription)
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn plan_code(&self) -> &str {
        &self.plan_code
    }

    /// Converts the trial into a paying subscription.
    pub fn activate(&mut self) -> Result<(), DomainError> {
        self.transition(
            SubscriptionOperation::Activate,
            SubscriptionEvent::SubscriptionActivated {
                activated_at: Utc::now(),
            },
        )
    }

    /// Suspends an active subscription (payment failure, abuse).
    pub fn suspend(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.transition(
            SubscriptionOperation::Suspend,
            SubscriptionEvent::SubscriptionSuspended {
                reason: reason.into(),
                suspended_at: Utc::now(),
            },
        )
    }

    /// Resumes a suspended subscription.
    pub fn resume(&mut self) -> Result<(), DomainError> {
        self.transition(SubscriptionOperation::Resume, SubscriptionEvent::SubscriptionResumed {
            resumed_at: Utc::now(),
        })
    }

    /// Cancels the subscription from any non-terminal state.
    pub fn cancel(&mut self, reason: Option<String>) -> Result<(), DomainError> {
        self.transition(
            SubscriptionOperation::Cancel,
            SubscriptionEvent::SubscriptionCancelled {
                reason,
                cancelled_at: Utc::now(),
            },
        )
    }

    /// Soft-deletes the subscription.
    pub fn mark_as_deleted(&mut self) -> Result<(), DomainError> {
        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &SubscriptionEvent::SubscriptionDeleted {
                deleted_at: Utc::now(),
            },
        )?;
        self.core.mark_deleted(Self::aggregate_type(), event)
    }

    fn transition(
        &mut self,
        operation: SubscriptionOperation,
        payload: SubscriptionEvent,
    ) -> Result<(), DomainError> {
        let next = self.core.guard(&TRANSITIONS, operation, Self::aggregate_type())?;
        let event = DomainEvent::record(self.id(), Self::aggregate_type(), &payload)?;
        self.core.advance(next, event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trial_to_active_to_suspended_and_back() {
        let mut subscription = Subscription::start(CustomerId::new(), "pro-monthly").unwrap();
        subscription.activate().unwrap();
        subscription.suspend("card declined").unwrap();
        subscription.resume().unwrap();

        assert_eq!(subscription.status(), SubscriptionStatus::Active);
        assert_eq!(subscription.pending_events().len(), 4);
    }

    #[test]
    fn trial_cannot_be_suspended() {
        let mut subscription = Subscription::start(CustomerId::new(), "pro-monthly").unwrap();

        assert!(matches!(
            subscription.suspend("card declined"),
            Err(DomainError::InvalidTransition {
                status: "Trial",
                operation: "Suspend",
                ..
            })
        ));
    }

    #[test]
    fn cancelled_is_terminal() {
        let mut subscription = Subscription::start(CustomerId::new(), "pro-monthly").unwrap();
        subscription.cancel(None).unwrap();

        assert!(subscription.activate().is_err());
        assert!(subscription.mark_as_deleted().is_err());
        assert_eq!(subscription.status(), SubscriptionStatus::Cancelled);
    }
}
