//! Pick-pack operation aggregate: warehouse fulfilment of one order.
//!
//! ```text
//! Pending ──► Picking ──► Picked ──► Packing ──► Packed ──► Shipped
//! ```

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::event::{DomainEvent, EventPayload};
use crate::lifecycle::{Aggregate, LifecycleCore, Operation, Status, TransitionTable};

/// Fulfilment state of a pick-pack operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PickPackStatus {
    #[default]
    Pending,
    Picking,
    Picked,
    Packing,
    Packed,
    Shipped,
}

impl Status for PickPackStatus {
    fn label(&self) -> &'static str {
        match self {
            PickPackStatus::Pending => "Pending",
            PickPackStatus::Picking => "Picking",
            PickPackStatus::Picked => "Picked",
            PickPackStatus::Packing => "Packing",
            PickPackStatus::Packed => "Packed",
            PickPackStatus::Shipped => "Shipped",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, PickPackStatus::Shipped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PickPackOperation {
    StartPicking,
    CompletePicking,
    StartPacking,
    CompletePacking,
    Ship,
}

impl Operation for PickPackOperation {
    fn label(&self) -> &'static str {
        match self {
            PickPackOperation::StartPicking => "StartPicking",
            PickPackOperation::CompletePicking => "CompletePicking",
            PickPackOperation::StartPacking => "StartPacking",
            PickPackOperation::CompletePacking => "CompletePacking",
            PickPackOperation::Ship => "Ship",
        }
    }
}

static TRANSITIONS: LazyLock<TransitionTable<PickPackStatus, PickPackOperation>> =
    LazyLock::new(|| {
        TransitionTable::builder()
            .allow(
                PickPackStatus::Pending,
                PickPackOperation::StartPicking,
                PickPackStatus::Picking,
            )
            .allow(
                PickPackStatus::Picking,
                PickPackOperation::CompletePicking,
                PickPackStatus::Picked,
            )
            .allow(
                PickPackStatus::Picked,
                PickPackOperation::StartPacking,
                PickPackStatus::Packing,
            )
            .allow(
                PickPackStatus::Packing,
                PickPackOperation::CompletePacking,
                PickPackStatus::Packed,
            )
            .allow(PickPackStatus::Packed, PickPackOperation::Ship, PickPackStatus::Shipped)
            .build()
    });

/// Events raised by the pick-pack aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PickPackEvent {
    PickPackCreated {
        order_id: AggregateId,
        created_at: DateTime<Utc>,
    },
    PickingStarted {
        picker: String,
        started_at: DateTime<Utc>,
    },
    PickingCompleted {
        completed_at: DateTime<Utc>,
    },
    PackingStarted {
        started_at: DateTime<Utc>,
    },
    PackingCompleted {
        completed_at: DateTime<Utc>,
    },
    PickPackShipped {
        tracking_number: String,
        shipped_at: DateTime<Utc>,
    },
    PickPackDeleted {
        deleted_at: DateTime<Utc>,
    },
}

impl EventPayload for PickPackEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PickPackEvent::PickPackCreated { .. } => "PickPackCreated",
            PickPackEvent::PickingStarted { .. } => "PickingStarted",
            PickPackEvent::PickingCompleted { .. } => "PickingCompleted",
            PickPackEvent::PackingStarted { .. } => "PackingStarted",
            PickPackEvent::PackingCompleted { .. } => "PackingCompleted",
            PickPackEvent::PickPackShipped { .. } => "PickPackShipped",
            PickPackEvent::PickPackDeleted { .. } => "PickPackDeleted",
        }
    }
}

/// Pick-pack aggregate root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickPack {
    #[serde(flatten)]
    core: LifecycleCore<PickPackStatus>,
    order_id: AggregateId,
    picker: Option<String>,
    tracking_number: Option<String>,
}

impl Aggregate for PickPack {
    type Status = PickPackStatus;

    fn aggregate_type() -> &'static str {
        "PickPack"
    }

    fn core(&self) -> &LifecycleCore<PickPackStatus> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LifecycleCore<PickPackStatus> {
        &mut self.core
    }
}

impl PickPack {
    /// Opens a pick-pack operation for an order.
    pub fn create(order_id: AggregateId) -> Result<Self, DomainError> {
        let id = AggregateId::new();
        let mut pick_pack = Self {
            core: LifecycleCore::new(id, PickPackStatus::Pending),
            order_id,
            picker: None,
            tracking_number: None,
        };
        let event = DomainEvent::record(
            id,
            Self::aggregate_type(),
            &PickPackEvent::PickPackCreated {
                order_id,
                created_at: Utc::now(),
            },
        )?;
        pick_pack.core.record(event);
        Ok(pick_pack)
    }

    /// Returns the order being fulfilled.
    pub fn order_id(&self) -> AggregateId {
        self.order_id
    }

    /// Returns the assigned picker, once picking started.
    pub fn picker(&self) -> Option<&str> {
        self.picker.as_deref()
    }

    /// Assigns a picker and starts picking.
    pub fn start_picking(&mut self, picker: impl Into<String>) -> Result<(), DomainError> {
        let next =
            self.core
                .guard(&TRANSITIONS, PickPackOperation::StartPicking, Self::aggregate_type())?;
        let picker = picker.into();
        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &PickPackEvent::PickingStarted {
                picker: picker.clone(),
                started_at: Utc::now(),
            },
        )?;
        self.picker = Some(picker);
        self.core.advance(next, event);
        Ok(())
    }

    /// Marks all lines as picked.
    pub fn complete_picking(&mut self) -> Result<(), DomainError> {
        self.transition(PickPackOperation::CompletePicking, PickPackEvent::PickingCompleted {
            completed_at: Utc::now(),
        })
    }

    /// Starts packing the picked items.
    pub fn start_packing(&mut self) -> Result<(), DomainError> {
        self.transition(PickPackOperation::StartPacking, PickPackEvent::PackingStarted {
            started_at: Utc::now(),
        })
    }

    /// Marks the parcel as packed.
    pub fn complete_packing(&mut self) -> Result<(), DomainError> {
        self.transition(PickPackOperation::CompletePacking, PickPackEvent::PackingCompleted {
            completed_at: Utc::now(),
        })
    }

    /// Hands the parcel to the carrier.
    pub fn ship(&mut self, tracking_number: impl Into<String>) -> Result<(), DomainError> {
        let next = self
            .core
            .guard(&TRANSITIONS, PickPackOperation::Ship, Self::aggregate_type())?;
        let tracking_number = tracking_number.into();
        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &PickPackEvent::PickPackShipped {
                tracking_number: tracking_number.clone(),
                shipped_at: Utc::now(),
            },
        )?;
        self.tracking_number = Some(tracking_number);
        self.core.advance(next, event);
        Ok(())
    }

    /// Soft-deletes the pick-pack operation.
    pub fn mark_as_deleted(&mut self) -> Result<(), DomainError> {
        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &PickPackEvent::PickPackDeleted {
                deleted_at: Utc::now(),
            },
        )?;
        self.core.mark_deleted(Self::aggregate_type(), event)
    }

    fn transition(
        &mut self,
        operation: PickPackOperation,
        payload: PickPackEvent,
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
    fn full_fulfilment_path() {
        let mut pick_pack = PickPack::create(AggregateId::new()).unwrap();
        pick_pack.start_picking("sam").unwrap();
        pick_pack.complete_picking().unwrap();
        pick_pack.start_packing().unwrap();
        pick_pack.complete_packing().unwrap();
        pick_pack.ship("TRK-77").unwrap();

        assert_eq!(pick_pack.status(), PickPackStatus::Shipped);
        assert_eq!(pick_pack.picker(), Some("sam"));
        assert_eq!(pick_pack.pending_events().len(), 6);
    }

    #[test]
    fn no_stage_skipping() {
        let mut pick_pack = PickPack::create(AggregateId::new()).unwrap();

        assert!(matches!(
            pick_pack.ship("TRK-1"),
            Err(DomainError::InvalidTransition {
                status: "Pending",
                operation: "Ship",
                ..
            })
        ));
        assert!(pick_pack.complete_picking().is_err());
        assert_eq!(pick_pack.status(), PickPackStatus::Pending);
        assert_eq!(pick_pack.pending_events().len(), 1);
    }

    #[test]
    fn shipped_is_terminal_and_undeletable() {
        let mut pick_pack = PickPack::create(AggregateId::new()).unwrap();
        pick_pack.start_picking("sam").unwrap();
        pick_pack.complete_picking().unwrap();
        pick_pack.start_packing().unwrap();
        pick_pack.complete_packing().unwrap();
        pick_pack.ship("TRK-77").unwrap();

        assert!(pick_pack.mark_as_deleted().is_err());
    }
}
