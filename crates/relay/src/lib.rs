//! Dispatch relay for the transactional outbox.
//!
//! Delivers committed outbox rows to registered event handlers,
//! at-least-once, without touching the write path:
//! - [`RelayWorker`] claims pending rows under a lease, dispatches each
//!   row's event to the [`HandlerRegistry`], and records success or
//!   retry/dead-letter bookkeeping
//! - [`RetryPolicy`] provides exponential backoff with a cap and the
//!   dead-letter ceiling
//! - the operational router exposes health, Prometheus metrics, and
//!   dead-letter inspection/replay

pub mod config;
pub mod error;
pub mod handler;
pub mod retry;
pub mod routes;
pub mod worker;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use outbox::OutboxStore;
use tower_http::trace::TraceLayer;

pub use config::RelaySettings;
pub use error::OpsError;
pub use handler::{AuditLogHandler, EventHandler, HandlerError, HandlerRegistry};
pub use retry::RetryPolicy;
pub use worker::{RelayConfig, RelayWorker};

/// Creates the operational HTTP router: health, metrics, dead-letter
/// inspection and replay.
pub fn ops_router<S: OutboxStore + 'static>(
    store: Arc<S>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/dead-letters", get(routes::dead_letters::list::<S>))
        .route(
            "/dead-letters/{event_id}/replay",
            post(routes::dead_letters::replay::<S>),
        )
        .with_state(store)
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http())
}
