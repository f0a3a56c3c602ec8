//! Domain layer for the back-office core.
//!
//! This crate provides:
//! - the generic lifecycle machinery: [`TransitionTable`] plus
//!   [`LifecycleCore`], shared by every aggregate's state machine
//! - [`DomainEvent`] and the [`EventPayload`] trait for typed payloads
//! - the lifecycle aggregates (orders, pick-pack operations, return
//!   requests, subscriptions, live streams, campaigns, tickets,
//!   warehouses)
//! - [`UnitOfWork`], which persists aggregate state and outbox rows as
//!   one atomic fact, and [`Repository`] for soft-delete-aware loads

pub mod campaign;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod live_stream;
pub mod order;
pub mod pick_pack;
pub mod repository;
pub mod return_request;
pub mod subscription;
pub mod ticket;
pub mod unit_of_work;
pub mod warehouse;

pub use campaign::{CampaignEvent, CampaignStatus, EmailCampaign};
pub use error::DomainError;
pub use event::{DomainEvent, EventPayload};
pub use lifecycle::{
    Aggregate, LifecycleCore, Operation, Status, TransitionTable, TransitionTableBuilder,
    guard_transition,
};
pub use live_stream::{LiveStream, LiveStreamEvent, LiveStreamStatus};
pub use order::{
    CustomerId, Money, Order, OrderEvent, OrderLine, OrderStatus, PaymentStatus, ProductId,
};
pub use pick_pack::{PickPack, PickPackEvent, PickPackStatus};
pub use repository::Repository;
pub use return_request::{ReturnRequest, ReturnRequestEvent, ReturnRequestStatus};
pub use subscription::{Subscription, SubscriptionEvent, SubscriptionStatus};
pub use ticket::{SupportTicket, TicketEvent, TicketStatus};
pub use unit_of_work::{CommitReceipt, Tracked, UnitOfWork};
pub use warehouse::{Warehouse, WarehouseEvent, WarehouseStatus};
