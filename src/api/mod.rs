pub mod handlers;
pub mod types;

use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::snapshot::history::SnapshotBook;
use crate::stream::connector::ConnectionState;
use crate::wallet::registry::SubscriptionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SubscriptionRegistry>,
    pub snapshots: Arc<SnapshotBook>,
    pub feed: Option<watch::Receiver<ConnectionState>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/wallets", get(handlers::list_wallets))
        .route(
            "/api/v1/wallets/{address}/snapshots",
            get(handlers::wallet_snapshots),
        )
        .route(
            "/api/v1/wallets/{address}/changes",
            get(handlers::wallet_changes),
        )
        .with_state(Arc::new(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(
    state: AppState,
    host: &str,
    port: u16,
    shutdown: CancellationToken,
) -> eyre::Result<()> {
    let app = router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| eyre::eyre!("Failed to bind API server to '{}': {}", addr, e))?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    tracing::info!("API server stopped");
    Ok(())
}
