//! Storage layer for the transactional outbox.
//!
//! One relational store holds both aggregate state documents and the
//! append-only outbox of committed-but-undelivered domain events. The
//! [`OutboxStore`] trait exposes the two sides of the table:
//! - the unit of work writes aggregate records and outbox rows in a
//!   single atomic commit;
//! - the dispatch relay claims pending rows under a lease and records
//!   delivery outcomes.
//!
//! Two implementations are provided: [`InMemoryOutboxStore`] for tests
//! and [`PostgresOutboxStore`] for production.

pub mod error;
pub mod memory;
pub mod message;
pub mod postgres;
pub mod query;
pub mod record;
pub mod store;

pub use common::AggregateId;
pub use error::{OutboxError, Result};
pub use memory::InMemoryOutboxStore;
pub use message::{EventId, OutboxMessage, OutboxMessageBuilder, WorkerId};
pub use postgres::PostgresOutboxStore;
pub use query::DeadLetterQuery;
pub use record::{AggregateRecord, AggregateWrite, Revision, SoftDeleteFilter};
pub use store::{FailureDisposition, OutboxStore, validate_commit};
