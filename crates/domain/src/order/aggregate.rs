//! Order aggregate implementation.

use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::event::DomainEvent;
use crate::lifecycle::{Aggregate, LifecycleCore, guard_transition};

use super::state::{self, OrderOperation, OrderStatus, PaymentOperation, PaymentStatus};
use super::{CustomerId, Money, OrderEvent, OrderLine, ProductId};

/// Order aggregate root.
///
/// Carries two state machines: the order lifecycle and the payment
/// status. The transitions that touch both (`confirm`,
/// `mark_returned`) validate both machines before mutating either
/// field, so a rejected operation leaves no partial change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    #[serde(flatten)]
    core: LifecycleCore<OrderStatus>,

    /// Customer who placed the order.
    customer_id: CustomerId,

    /// Payment state, advanced in lockstep with the lifecycle.
    payment_status: PaymentStatus,

    /// Order lines, fixed at placement.
    lines: Vec<OrderLine>,

    /// Payment provider reference, set on confirmation.
    payment_reference: Option<String>,

    /// Carrier tracking number, set on shipping.
    tracking_number: Option<String>,
}

impl Aggregate for Order {
    type Status = OrderStatus;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn core(&self) -> &LifecycleCore<OrderStatus> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LifecycleCore<OrderStatus> {
        &mut self.core
    }
}

// Query methods
impl Order {
    /// Returns the customer who placed the order.
    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    /// Returns the payment status.
    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    /// Returns the order lines.
    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    /// Returns a line by product ID.
    pub fn line(&self, product_id: &ProductId) -> Option<&OrderLine> {
        self.lines.iter().find(|l| &l.product_id == product_id)
    }

    /// Returns the order total.
    pub fn total(&self) -> Money {
        self.lines.iter().map(OrderLine::line_total).sum()
    }

    /// Returns the payment provider reference, if confirmed.
    pub fn payment_reference(&self) -> Option<&str> {
        self.payment_reference.as_deref()
    }

    /// Returns the tracking number, if shipped.
    pub fn tracking_number(&self) -> Option<&str> {
        self.tracking_number.as_deref()
    }
}

// Command methods
impl Order {
    /// Places a new order for a customer.
    ///
    /// Fails if there are no lines or a line has zero quantity or a
    /// non-positive price.
    pub fn create(customer_id: CustomerId, lines: Vec<OrderLine>) -> Result<Self, DomainError> {
        if lines.is_empty() {
            return Err(DomainError::Validation {
                aggregate_type: Self::aggregate_type(),
                message: "order must have at least one line".to_string(),
            });
        }
        for line in &lines {
            if line.quantity == 0 {
                return Err(DomainError::Validation {
                    aggregate_type: Self::aggregate_type(),
                    message: format!("line {} has zero quantity", line.product_id),
                });
            }
            if !line.unit_price.is_positive() {
                return Err(DomainError::Validation {
                    aggregate_type: Self::aggregate_type(),
                    message: format!("line {} has a non-positive price", line.product_id),
                });
            }
        }

        let id = AggregateId::new();
        let mut order = Self {
            core: LifecycleCore::new(id, OrderStatus::Created),
            customer_id,
            payment_status: PaymentStatus::Pending,
            lines,
            payment_reference: None,
            tracking_number: None,
        };

        let event = DomainEvent::record(
            id,
            Self::aggregate_type(),
            &OrderEvent::created(id, customer_id, order.lines.len(), order.total()),
        )?;
        order.core.record(event);
        Ok(order)
    }

    /// Confirms the order after payment capture.
    ///
    /// Multi-field transition: the order machine (Created → Confirmed)
    /// and the payment machine (Pending → Paid) are both checked before
    /// either field changes.
    pub fn confirm(&mut self, payment_reference: impl Into<String>) -> Result<(), DomainError> {
        let next = self
            .core
            .guard(state::transitions(), OrderOperation::Confirm, Self::aggregate_type())?;
        let next_payment = guard_transition(
            state::payment_transitions(),
            self.payment_status,
            PaymentOperation::Capture,
            Self::aggregate_type(),
        )?;

        let payment_reference = payment_reference.into();
        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &OrderEvent::confirmed(payment_reference.clone(), self.total()),
        )?;

        self.payment_status = next_payment;
        self.payment_reference = Some(payment_reference);
        self.core.advance(next, event);
        Ok(())
    }

    /// Marks the order as shipped with a tracking number.
    pub fn ship(
        &mut self,
        tracking_number: impl Into<String>,
        carrier: Option<String>,
    ) -> Result<(), DomainError> {
        let next = self
            .core
            .guard(state::transitions(), OrderOperation::Ship, Self::aggregate_type())?;

        let tracking_number = tracking_number.into();
        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &OrderEvent::shipped(tracking_number.clone(), carrier),
        )?;

        self.tracking_number = Some(tracking_number);
        self.core.advance(next, event);
        Ok(())
    }

    /// Marks the order as delivered.
    pub fn deliver(&mut self) -> Result<(), DomainError> {
        let next = self
            .core
            .guard(state::transitions(), OrderOperation::Deliver, Self::aggregate_type())?;
        let event =
            DomainEvent::record(self.id(), Self::aggregate_type(), &OrderEvent::delivered())?;
        self.core.advance(next, event);
        Ok(())
    }

    /// Cancels the order. Allowed until it ships.
    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        let next = self
            .core
            .guard(state::transitions(), OrderOperation::Cancel, Self::aggregate_type())?;
        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &OrderEvent::cancelled(reason.into()),
        )?;
        self.core.advance(next, event);
        Ok(())
    }

    /// Records a return of a delivered order and the matching refund.
    ///
    /// Multi-field transition: Delivered → Returned and Paid →
    /// Refunded, validated together.
    pub fn mark_returned(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        let next = self.core.guard(
            state::transitions(),
            OrderOperation::MarkReturned,
            Self::aggregate_type(),
        )?;
        let next_payment = guard_transition(
            state::payment_transitions(),
            self.payment_status,
            PaymentOperation::Refund,
            Self::aggregate_type(),
        )?;

        let event = DomainEvent::record(
            self.id(),
            Self::aggregate_type(),
            &OrderEvent::returned(reason.into(), self.total()),
        )?;

        self.payment_status = next_payment;
        self.core.advance(next, event);
        Ok(())
    }

    /// Soft-deletes the order.
    pub fn mark_as_deleted(&mut self) -> Result<(), DomainError> {
        let event =
            DomainEvent::record(self.id(), Self::aggregate_type(), &OrderEvent::deleted())?;
        self.core.mark_deleted(Self::aggregate_type(), event)
    }
}
