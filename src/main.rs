mod config;
mod db;
mod routes;
mod services;
mod state;
mod store;

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let config = ServerConfig::from_env();

    let store: Arc<dyn Store> = match config.database_url.as_deref() {
        Some(database_url) => {
            let pool = db::init_pool(database_url, config.db_max_connections)
                .await
                .expect("database init failed");
            tracing::info!(max_connections = config.db_max_connections, "using postgres store");
            Arc::new(PgStore::new(pool))
        }
        None => Arc::new(MemoryStore::new(config.memory_telemetry_per_session, config.memory_failure_cap)),
    };

    let state = state::AppState::new(store, config.dashboard_channel_capacity);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .expect("failed to bind");

    tracing::info!(port = config.port, "blackbox listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server failed");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
