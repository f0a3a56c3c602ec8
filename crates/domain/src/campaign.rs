//! Email campaign aggregate.
//!
//! ```text
//! Draft ──► Scheduled ──► Sending ──► Sent
//!   │           │
//!   └───────────┴──► Cancelled
//! ```

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::event::{DomainEvent, EventPayload};
use crate::lifecycle::{Aggregate, LifecycleCore, Operation, Status, TransitionTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CampaignStatus {
    #[default]
    Draft,
    Scheduled,
    Sending,
    Sent,
    Cancelled,
}

impl Status for CampaignStatus {
    fn label(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "Draft",
            CampaignStatus::Scheduled => "Scheduled",
            CampaignStatus::Sending => "Sending",
            CampaignStatus::Sent => "Sent",
            CampaignStatus::Cancelled => "Cancelled",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Sent | CampaignStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CampaignOperation {
    Schedule,
    StartSending,
    CompleteSending,
    Cancel,
}

impl Operation for CampaignOperation {
    fn label(&self) -> &'static str {
        match self {
            CampaignOperation::Schedule => "Schedule",
            CampaignOperation::StartSending => "StartSending",
            CampaignOperation::CompleteSending => "CompleteSending",
            CampaignOperation::Cancel => "Cancel",
        }
    }
}

static TRANSITIONS: LazyLock<TransitionTable<CampaignStatus, CampaignOperation>> =
    LazyLock::new(|| {
        TransitionTable::builder()
            .allow(CampaignStatus::Draft, CampaignOperation::Schedule, CampaignStatus::Scheduled)
            .allow(
                CampaignStatus::Scheduled,
                CampaignOperation::StartSending,
                CampaignStatus::Sending,
            )
            .allow(
                CampaignStatus::Sending,
                CampaignOperation::CompleteSending,
                CampaignStatus::Sent,
            )
            .allow(CampaignStatus::Draft, CampaignOperation::Cancel, CampaignStatus::Cancelled)
            .allow(
                CampaignStatus::Scheduled,
                CampaignOperation::Cancel,
                CampaignStatus::Cancelled,
            )
            .build()
    });

/// Events raised by the campaign aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CampaignEvent {
    CampaignDrafted {
        name: String,
        subject: String,
        drafted_at: DateTime<Utc>,
    },
    CampaignScheduled {
        send_at: DateTime<Utc>,
    },
    CampaignSendingStarted {
        started_at: DateTime<Utc>,
    },
    CampaignSent {
        recipients: u64,
        sent_at: DateTime<Utc>,
    },
    CampaignCancelled {
        cancelled_at: DateTime<Utc>,
    },
    CampaignDeleted {
        deleted_at: DateTime<Utc>,
    },
}

impl EventPayload for CampaignEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CampaignEvent::CampaignDrafted { .. } => "CampaignDrafted",
            CampaignEvent::CampaignScheduled { .. } => "CampaignScheduled",
            CampaignEvent::CampaignSendingStarted { .. } => "CampaignSendingStarted",
            CampaignEvent::CampaignSent { .. } => "CampaignSent",
            CampaignEvent::CampaignCancelled { .. } => "CampaignCancelled",
            CampaignEvent::CampaignDeleted { .. } => "CampaignDeleted",
        }
    }
}

/// A marketing email campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailCampaign {
    #[serde(flatten)]
    core: LifecycleCore<CampaignStatus>,
    name: String,
    subject: String,
    send_at: Option<DateTime<Utc>>,
}

impl Aggregate for EmailCampaign {
    type Status = CampaignStatus;

    fn aggregate_type() -> &'static str {
        "EmailCampaign"
    }

    fn core(&self) -> &LifecycleCore<CampaignStatus> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LifecycleCore<CampaignStatus> {
        &mut self.core
    }
}

impl EmailCampaign {
    /// Drafts a new campaign.
    pub fn draft(
        name: impl Into<String>,
        subject: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        let subject = subject.into();
        if name.trim().is_empty() || subject.trim().is_empty() {
            return Err(DomainError::Validation {
                aggregate_type: Self::aggregate_type(),
                message: "campaign name and subject are required".to_string(),
            });
        }

        let id = AggregateId::new();
        let mut campaign = Self {
            core: LifecycleCore::new(id, CampaignStatus::Draft),
            name: name.clone(),
            subject: subject.clone(),
            send_at: None,
        };
        let event = DomainEvent::record(
            id,
            Self::aggregate_type(),
            &CampaignEvent::CampaignDrafted {
                name,
                subject,
                drafted_at: Utc::now(),
            },
        )?;
        campaign.core.record(event);
        Ok(campaign)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn send_at(&self) -> Option<DateTime<Utc>> {
        self.send_at
    }

    /// Schedules the campaign for delivery at `send_at`.
    pub fn schedule(&mut self, send_at: DateTime<Utc>) -> Result<(), DomainError> {
        let next = self
            .core
            .guard(&TRANSITIONS, CampaignOperation::Schedule, Self::aggregate_type())?;
        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &CampaignEvent::CampaignScheduled { send_at },
        )?;
        self.send_at = Some(send_at);
        self.core.advance(next, event);
        Ok(())
    }

    /// Marks delivery as started.
    pub fn start_sending(&mut self) -> Result<(), DomainError> {
        let next = self.core.guard(
            &TRANSITIONS,
            CampaignOperation::StartSending,
            Self::aggregate_type(),
        )?;
        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &CampaignEvent::CampaignSendingStarted {
                started_at: Utc::now(),
            },
        )?;
        self.core.advance(next, event);
        Ok(())
    }

    /// Marks delivery as finished with the final recipient count.
    pub fn complete_sending(&mut self, recipients: u64) -> Result<(), DomainError> {
        let next = self.core.guard(
            &TRANSITIONS,
            CampaignOperation::CompleteSending,
            Self::aggregate_type(),
        )?;
        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &CampaignEvent::CampaignSent {
                recipients,
                sent_at: Utc::now(),
            },
        )?;
        self.core.advance(next, event);
        Ok(())
    }

    /// Cancels a campaign that has not started sending.
    pub fn cancel(&mut self) -> Result<(), DomainError> {
        let next = self
            .core
            .guard(&TRANSITIONS, CampaignOperation::Cancel, Self::aggregate_type())?;
        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &CampaignEvent::CampaignCancelled {
                cancelled_at: Utc::now(),
            },
        )?;
        self.core.advance(next, event);
        Ok(())
    }

    /// Soft-deletes the campaign.
    pub fn mark_as_deleted(&mut self) -> Result<(), DomainError> {
        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &CampaignEvent::CampaignDeleted {
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
    fn draft_schedule_send() {
        let mut campaign = EmailCampaign::draft("spring-sale", "Everything 20% off").unwrap();
        campaign.schedule(Utc::now()).unwrap();
        campaign.start_sending().unwrap();
        campaign.complete_sending(15_000).unwrap();

        assert_eq!(campaign.status(), CampaignStatus::Sent);
        assert_eq!(campaign.pending_events().len(), 4);
    }

    #[test]
    fn sending_campaign_cannot_be_cancelled() {
        let mut campaign = EmailCampaign::draft("spring-sale", "Everything 20% off").unwrap();
        campaign.schedule(Utc::now()).unwrap();
        campaign.start_sending().unwrap();

        assert!(matches!(
            campaign.cancel(),
            Err(DomainError::InvalidTransition {
                status: "Sending",
                ..
            })
        ));
    }
}
