use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use wallet_sentinel::alert::notify::{build_sink, NotificationSink};
use wallet_sentinel::api::{self, AppState};
use wallet_sentinel::config::Config;
use wallet_sentinel::db::memory::MemoryStore;
use wallet_sentinel::db::postgres::PgStore;
use wallet_sentinel::db::Store;
use wallet_sentinel::service::{Collaborators, MonitorService};
use wallet_sentinel::snapshot::fetcher::{NoditClient, SnapshotSource};
use wallet_sentinel::threat::deny_list::DenyList;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path)?;

    // Initialize structured logging (set RUST_LOG=info for output)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    tracing::info!("Wallet Sentinel starting");
    tracing::info!(
        feed = config.feed.enabled,
        poll = config.poll.enabled,
        seed_wallets = config.wallets.len(),
        "Configuration loaded from {}",
        config_path
    );

    let store: Arc<dyn Store> = match &config.database {
        Some(database) => Arc::new(PgStore::connect(database).await?),
        None => {
            tracing::warn!("No [database] section, using in-memory store; nothing survives a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let threat_intel = Arc::new(DenyList::load(&config.threat_intel)?);
    let notifier: Arc<dyn NotificationSink> = Arc::from(build_sink(&config.notifications)?);

    let snapshot_source: Option<Arc<dyn SnapshotSource>> = if config.poll.enabled {
        Some(Arc::new(NoditClient::new(&config.poll)?))
    } else {
        None
    };

    let service = MonitorService::init(
        &config,
        Collaborators {
            store,
            threat_intel,
            notifier,
            snapshot_source,
        },
    )
    .await?;

    // Seed wallets from config
    for seed in &config.wallets {
        if let Err(e) = service.track_wallet(&seed.address, &seed.chains).await {
            tracing::error!(wallet = %seed.address, error = %e, "Failed to track seed wallet");
        }
    }

    // Spawn API server
    let api_handle = if config.api.enabled {
        let state = AppState {
            registry: service.registry(),
            snapshots: service.snapshots(),
            feed: service.connection_state(),
        };
        let host = config.api.host.clone();
        let port = config.api.port;
        let shutdown = service.shutdown_token();
        Some(tokio::spawn(async move {
            if let Err(e) = api::serve(state, &host, port, shutdown).await {
                tracing::error!(error = %e, "API server failed");
            }
        }))
    } else {
        None
    };

    tracing::info!("Wallet Sentinel running. Press Ctrl+C to stop.");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping...");
    service.shutdown().await;

    if let Some(handle) = api_handle {
        let _ = handle.await;
    }

    tracing::info!("Wallet Sentinel stopped gracefully");
    Ok(())
}
