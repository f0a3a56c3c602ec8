//! Relay process entry point.
//!
//! Runs N relay workers against the PostgreSQL outbox plus the
//! operational HTTP surface, with graceful shutdown: workers finish
//! their in-flight batch and release leases before the process exits.

use std::sync::Arc;

use outbox::PostgresOutboxStore;
use relay::{AuditLogHandler, HandlerRegistry, RelaySettings, RelayWorker};
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() {
    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Load settings and connect to the store
    let settings = RelaySettings::from_env();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(settings.workers as u32 + 4)
        .connect(&database_url)
        .await
        .expect("failed to connect to PostgreSQL");

    let store = Arc::new(PostgresOutboxStore::new(pool));
    store.run_migrations().await.expect("migrations failed");

    // 4. Register handlers. Dedicated subscribers (email sender,
    //    inventory updater, analytics) are wired here per deployment;
    //    the audit fallback keeps every delivery visible.
    let mut registry = HandlerRegistry::new();
    registry.register_fallback(Arc::new(AuditLogHandler));
    let registry = Arc::new(registry);

    // 5. Start workers
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = JoinSet::new();
    for _ in 0..settings.workers {
        let worker = RelayWorker::new(
            store.clone(),
            registry.clone(),
            settings.worker_config.clone(),
        );
        workers.spawn(worker.run(shutdown_rx.clone()));
    }
    tracing::info!(workers = settings.workers, "relay workers started");

    // 6. Serve the operational surface until a shutdown signal arrives
    let app = relay::ops_router(store.clone(), metrics_handle);
    let addr = settings.addr();
    tracing::info!(%addr, "starting operational server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 7. Stop workers: in-flight batches finish, leases get released
    shutdown_tx.send(true).expect("shutdown channel closed");
    while workers.join_next().await.is_some() {}

    tracing::info!("relay shut down gracefully");
}
