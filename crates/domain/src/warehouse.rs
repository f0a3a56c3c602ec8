//! Warehouse aggregate: mostly static, but still lifecycle-guarded.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::event::{DomainEvent, EventPayload};
use crate::lifecycle::{Aggregate, LifecycleCore, Operation, Status, TransitionTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum WarehouseStatus {
    #[default]
    Active,
    Inactive,
}

impl Status for WarehouseStatus {
    fn label(&self) -> &'static str {
        match self {
            WarehouseStatus::Active => "Active",
            WarehouseStatus::Inactive => "Inactive",
        }
    }

    fn is_terminal(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarehouseOperation {
    Activate,
    Deactivate,
}

impl Operation for WarehouseOperation {
    fn label(&self) -> &'static str {
        match self {
            WarehouseOperation::Activate => "Activate",
            WarehouseOperation::Deactivate => "Deactivate",
        }
    }
}

static TRANSITIONS: LazyLock<TransitionTable<WarehouseStatus, WarehouseOperation>> =
    LazyLock::new(|| {
        TransitionTable::builder()
            .allow(
                WarehouseStatus::Active,
                WarehouseOperation::Deactivate,
                WarehouseStatus::Inactive,
            )
            .allow(
                WarehouseStatus::Inactive,
                WarehouseOperation::Activate,
                WarehouseStatus::Active,
            )
            .build()
    });

/// Events raised by the warehouse aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WarehouseEvent {
    WarehouseRegistered {
        name: String,
        region: String,
        registered_at: DateTime<Utc>,
    },
    WarehouseDeactivated {
        deactivated_at: DateTime<Utc>,
    },
    WarehouseActivated {
        activated_at: DateTime<Utc>,
    },
    WarehouseDeleted {
        deleted_at: DateTime<Utc>,
    },
}

impl EventPayload for WarehouseEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WarehouseEvent::WarehouseRegistered { .. } => "WarehouseRegistered",
            WarehouseEvent::WarehouseDeactivated { .. } => "WarehouseDeactivated",
            WarehouseEvent::WarehouseActivated { .. } => "WarehouseActivated",
            WarehouseEvent::WarehouseDeleted { .. } => "WarehouseDeleted",
        }
    }
}

/// A fulfilment site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warehouse {
    #[serde(flatten)]
    core: LifecycleCore<WarehouseStatus>,
    name: String,
    region: String,
}

impl Aggregate for Warehouse {
    type Status = WarehouseStatus;

    fn aggregate_type() -> &'static str {
        "Warehouse"
    }

    fn core(&self) -> &LifecycleCore<WarehouseStatus> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LifecycleCore<WarehouseStatus> {
        &mut self.core
    }
}

impl Warehouse {
    /// Registers a new warehouse.
    pub fn register(
        name: impl Into<String>,
        region: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        let region = region.into();
        let id = AggregateId::new();
        let mut warehouse = Self {
            core: LifecycleCore::new(id, WarehouseStatus::Active),
            name: name.clone(),
            region: region.clone(),
        };
        let event = DomainEvent::record(
            id,
            Self::aggregate_type(),
            &WarehouseEvent::WarehouseRegistered {
                name,
                region,
                registered_at: Utc::now(),
            },
        )?;
        warehouse.core.record(event);
        Ok(warehouse)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Takes the warehouse out of rotation.
    pub fn deactivate(&mut self) -> Result<(), DomainError> {
        let next = self
            .core
            .guard(&TRANSITIONS, WarehouseOperation::Deactivate, Self::aggregate_type())?;
        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &WarehouseEvent::WarehouseDeactivated {
                deactivated_at: Utc::now(),
            },
        )?;
        self.core.advance(next, event);
        Ok(())
    }

    /// Puts the warehouse back into rotation.
    pub fn activate(&mut self) -> Result<(), DomainError> {
        let next = self
            .core
            .guard(&TRANSITIONS, WarehouseOperation::Activate, Self::aggregate_type())?;
        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &WarehouseEvent::WarehouseActivated {
                activated_at: Utc::now(),
            },
        )?;
        self.core.advance(next, event);
        Ok(())
    }

    /// Soft-deletes the warehouse.
    pub fn mark_as_deleted(&mut self) -> Result<(), DomainError> {
        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &WarehouseEvent::WarehouseDeleted {
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
    fn deactivate_and_reactivate() {
        let mut warehouse = Warehouse::register("Leipzig DC", "eu-central").unwrap();
        warehouse.deactivate().unwrap();
        warehouse.activate().unwrap();

        assert_eq!(warehouse.status(), WarehouseStatus::Active);
        assert!(warehouse.activate().is_err());
    }

    #[test]
    fn deleted_warehouse_is_frozen() {
        let mut warehouse = Warehouse::register("Leipzig DC", "eu-central").unwrap();
        warehouse.mark_as_deleted().unwrap();

        assert!(matches!(
            warehouse.deactivate(),
            Err(DomainError::AlreadyDeleted { .. })
        ));
    }
}
