//! Order state machines.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::lifecycle::{Operation, Status, TransitionTable};

/// The state of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Created ──► Confirmed ──► Shipped ──► Delivered ──► Returned
///    │            │
///    └────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Order was placed and awaits payment confirmation.
    #[default]
    Created,

    /// Payment captured, order accepted for fulfilment.
    Confirmed,

    /// Handed to the carrier.
    Shipped,

    /// Delivered to the customer; a return is still possible.
    Delivered,

    /// Cancelled before shipping (terminal).
    Cancelled,

    /// Returned and refunded after delivery (terminal).
    Returned,
}

impl Status for OrderStatus {
    fn label(&self) -> &'static str {
        match self {
            OrderStatus::Created => "Created",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Returned => "Returned",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Returned)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Operations that move an order through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderOperation {
    Confirm,
    Ship,
    Deliver,
    Cancel,
    MarkReturned,
}

impl Operation for OrderOperation {
    fn label(&self) -> &'static str {
        match self {
            OrderOperation::Confirm => "Confirm",
            OrderOperation::Ship => "Ship",
            OrderOperation::Deliver => "Deliver",
            OrderOperation::Cancel => "Cancel",
            OrderOperation::MarkReturned => "MarkReturned",
        }
    }
}

/// Payment state of an order, driven in lockstep with the order status
/// by the multi-field transitions (`confirm`, `mark_returned`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentStatus {
    /// No payment captured yet.
    #[default]
    Pending,

    /// Payment captured.
    Paid,

    /// Payment refunded after a return (terminal).
    Refunded,
}

impl Status for PaymentStatus {
    fn label(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Refunded => "Refunded",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Refunded)
    }
}

/// Operations on the payment machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentOperation {
    Capture,
    Refund,
}

impl Operation for PaymentOperation {
    fn label(&self) -> &'static str {
        match self {
            PaymentOperation::Capture => "Capture",
            PaymentOperation::Refund => "Refund",
        }
    }
}

static TRANSITIONS: LazyLock<TransitionTable<OrderStatus, OrderOperation>> =
    LazyLock::new(|| {
        TransitionTable::builder()
            .allow(OrderStatus::Created, OrderOperation::Confirm, OrderStatus::Confirmed)
            .allow(OrderStatus::Confirmed, OrderOperation::Ship, OrderStatus::Shipped)
            .allow(OrderStatus::Shipped, OrderOperation::Deliver, OrderStatus::Delivered)
            .allow(OrderStatus::Created, OrderOperation::Cancel, OrderStatus::Cancelled)
            .allow(OrderStatus::Confirmed, OrderOperation::Cancel, OrderStatus::Cancelled)
            .allow(
                OrderStatus::Delivered,
                OrderOperation::MarkReturned,
                OrderStatus::Returned,
            )
            .build()
    });

static PAYMENT_TRANSITIONS: LazyLock<TransitionTable<PaymentStatus, PaymentOperation>> =
    LazyLock::new(|| {
        TransitionTable::builder()
            .allow(PaymentStatus::Pending, PaymentOperation::Capture, PaymentStatus::Paid)
            .allow(PaymentStatus::Paid, PaymentOperation::Refund, PaymentStatus::Refunded)
            .build()
    });

/// Returns the order status transition table.
pub fn transitions() -> &'static TransitionTable<OrderStatus, OrderOperation> {
    &TRANSITIONS
}

/// Returns the payment status transition table.
pub fn payment_transitions() -> &'static TransitionTable<PaymentStatus, PaymentOperation> {
    &PAYMENT_TRANSITIONS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let table = transitions();
        assert_eq!(
            table.next(OrderStatus::Created, OrderOperation::Confirm),
            Some(OrderStatus::Confirmed)
        );
        assert_eq!(
            table.next(OrderStatus::Confirmed, OrderOperation::Ship),
            Some(OrderStatus::Shipped)
        );
        assert_eq!(
            table.next(OrderStatus::Shipped, OrderOperation::Deliver),
            Some(OrderStatus::Delivered)
        );
    }

    #[test]
    fn no_state_skipping() {
        let table = transitions();
        assert!(!table.allows(OrderStatus::Created, OrderOperation::Ship));
        assert!(!table.allows(OrderStatus::Created, OrderOperation::Deliver));
        assert!(!table.allows(OrderStatus::Confirmed, OrderOperation::Deliver));
    }

    #[test]
    fn cancel_only_before_shipping() {
        let table = transitions();
        assert!(table.allows(OrderStatus::Created, OrderOperation::Cancel));
        assert!(table.allows(OrderStatus::Confirmed, OrderOperation::Cancel));
        assert!(!table.allows(OrderStatus::Shipped, OrderOperation::Cancel));
        assert!(!table.allows(OrderStatus::Delivered, OrderOperation::Cancel));
    }

    #[test]
    fn return_only_after_delivery() {
        let table = transitions();
        assert!(table.allows(OrderStatus::Delivered, OrderOperation::MarkReturned));
        assert!(!table.allows(OrderStatus::Shipped, OrderOperation::MarkReturned));
    }

    #[test]
    fn terminal_statuses_have_no_outgoing_edges() {
        let table = transitions();
        for operation in [
            OrderOperation::Confirm,
            OrderOperation::Ship,
            OrderOperation::Deliver,
            OrderOperation::Cancel,
            OrderOperation::MarkReturned,
        ] {
            assert!(!table.allows(OrderStatus::Cancelled, operation));
            assert!(!table.allows(OrderStatus::Returned, operation));
        }
    }

    #[test]
    fn payment_machine_is_linear() {
        let table = payment_transitions();
        assert_eq!(
            table.next(PaymentStatus::Pending, PaymentOperation::Capture),
            Some(PaymentStatus::Paid)
        );
        assert_eq!(
            table.next(PaymentStatus::Paid, PaymentOperation::Refund),
            Some(PaymentStatus::Refunded)
        );
        assert!(!table.allows(PaymentStatus::Pending, PaymentOperation::Refund));
        assert!(!table.allows(PaymentStatus::Paid, PaymentOperation::Capture));
    }
}
