//! Order domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::event::EventPayload;

use super::{CustomerId, Money};

/// Events raised by the order aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order was placed by a customer.
    OrderCreated(OrderCreatedData),

    /// Payment captured; order accepted for fulfilment.
    OrderConfirmed(OrderConfirmedData),

    /// Order handed to the carrier.
    OrderShipped(OrderShippedData),

    /// Order delivered to the customer.
    OrderDelivered(OrderDeliveredData),

    /// Order cancelled before shipping.
    OrderCancelled(OrderCancelledData),

    /// Order returned and refunded after delivery.
    OrderReturned(OrderReturnedData),

    /// Order soft-deleted.
    OrderDeleted { deleted_at: DateTime<Utc> },
}

impl EventPayload for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "OrderCreated",
            OrderEvent::OrderConfirmed(_) => "OrderConfirmed",
            OrderEvent::OrderShipped(_) => "OrderShipped",
            OrderEvent::OrderDelivered(_) => "OrderDelivered",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
            OrderEvent::OrderReturned(_) => "OrderReturned",
            OrderEvent::OrderDeleted { .. } => "OrderDeleted",
        }
    }
}

/// Data for OrderCreated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreatedData {
    /// The new order's ID.
    pub order_id: AggregateId,

    /// The customer who placed the order.
    pub customer_id: CustomerId,

    /// Number of lines at placement.
    pub line_count: usize,

    /// Order total at placement.
    pub total: Money,

    /// When the order was placed.
    pub created_at: DateTime<Utc>,
}

/// Data for OrderConfirmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderConfirmedData {
    /// Reference returned by the payment provider.
    pub payment_reference: String,

    /// Amount captured.
    pub amount: Money,

    /// When the order was confirmed.
    pub confirmed_at: DateTime<Utc>,
}

/// Data for OrderShipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderShippedData {
    /// Carrier tracking number.
    pub tracking_number: String,

    /// Carrier name, when known.
    pub carrier: Option<String>,

    /// When the order was shipped.
    pub shipped_at: DateTime<Utc>,
}

/// Data for OrderDelivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDeliveredData {
    /// When the order was delivered.
    pub delivered_at: DateTime<Utc>,
}

/// Data for OrderCancelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledData {
    /// Why the order was cancelled.
    pub reason: String,

    /// When the order was cancelled.
    pub cancelled_at: DateTime<Utc>,
}

/// Data for OrderReturned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReturnedData {
    /// Why the order came back.
    pub reason: String,

    /// Amount refunded.
    pub refund_amount: Money,

    /// When the return was recorded.
    pub returned_at: DateTime<Utc>,
}

impl OrderEvent {
    /// Creates an OrderCreated event.
    pub fn created(
        order_id: AggregateId,
        customer_id: CustomerId,
        line_count: usize,
        total: Money,
    ) -> Self {
        OrderEvent::OrderCreated(OrderCreatedData {
            order_id,
            customer_id,
            line_count,
            total,
            created_at: Utc::now(),
        })
    }

    /// Creates an OrderConfirmed event.
    pub fn confirmed(payment_reference: impl Into<String>, amount: Money) -> Self {
        OrderEvent::OrderConfirmed(OrderConfirmedData {
            payment_reference: payment_reference.into(),
            amount,
            confirmed_at: Utc::now(),
        })
    }

    /// Creates an OrderShipped event.
    pub fn shipped(tracking_number: impl Into<String>, carrier: Option<String>) -> Self {
        OrderEvent::OrderShipped(OrderShippedData {
            tracking_number: tracking_number.into(),
            carrier,
            shipped_at: Utc::now(),
        })
    }

    /// Creates an OrderDelivered event.
    pub fn delivered() -> Self {
        OrderEvent::OrderDelivered(OrderDeliveredData {
            delivered_at: Utc::now(),
        })
    }

    /// Creates an OrderCancelled event.
    pub fn cancelled(reason: impl Into<String>) -> Self {
        OrderEvent::OrderCancelled(OrderCancelledData {
            reason: reason.into(),
            cancelled_at: Utc::now(),
        })
    }

    /// Creates an OrderReturned event.
    pub fn returned(reason: impl Into<String>, refund_amount: Money) -> Self {
        OrderEvent::OrderReturned(OrderReturnedData {
            reason: reason.into(),
            refund_amount,
            returned_at: Utc::now(),
        })
    }

    /// Creates an OrderDeleted event.
    pub fn deleted() -> Self {
        OrderEvent::OrderDeleted {
            deleted_at: Utc::now(),
        }
    }
}
