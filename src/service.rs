use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::alert::notify::NotificationSink;
use crate::config::Config;
use crate::db::Store;
use crate::pipeline::IngestPipeline;
use crate::snapshot::fetcher::SnapshotSource;
use crate::snapshot::history::SnapshotBook;
use crate::snapshot::scheduler::PollScheduler;
use crate::stream::connector::{ConnectionState, StreamConnector, StreamHandle};
use crate::stream::router::{event_channels, spawn_workers};
use crate::threat::ThreatIntel;
use crate::wallet::registry::{Subscription, SubscriptionRegistry};
use crate::wallet::types::{normalize_address, normalize_chains, TrackedWallet};

/// External collaborators handed to [`MonitorService::init`].
pub struct Collaborators {
    pub store: Arc<dyn Store>,
    pub threat_intel: Arc<dyn ThreatIntel>,
    pub notifier: Arc<dyn NotificationSink>,
    /// Snapshot API client. Poll mode runs only when this is present and
    /// `[poll].enabled` is set.
    pub snapshot_source: Option<Arc<dyn SnapshotSource>>,
}

/// The running monitor: feed connector, per-event workers and snapshot poller,
/// all sharing one ingestion pipeline.
///
/// Lifecycle is explicit: [`init`](Self::init) loads state and starts the
/// background tasks, [`shutdown`](Self::shutdown) stops them and waits for
/// in-flight units to finish.
pub struct MonitorService {
    store: Arc<dyn Store>,
    registry: Arc<SubscriptionRegistry>,
    book: Arc<SnapshotBook>,
    stream: Option<StreamHandle>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl MonitorService {
    pub async fn init(config: &Config, collaborators: Collaborators) -> eyre::Result<Self> {
        let Collaborators {
            store,
            threat_intel,
            notifier,
            snapshot_source,
        } = collaborators;

        let registry = Arc::new(SubscriptionRegistry::new());
        let wallets = store.active_wallets().await?;
        for wallet in &wallets {
            registry.add(&wallet.address, &wallet.chains);
        }
        tracing::info!(wallets = wallets.len(), "Loaded active wallets");

        let pipeline = Arc::new(IngestPipeline::new(
            &config.risk,
            store.clone(),
            threat_intel,
            notifier,
        ));
        let book = Arc::new(SnapshotBook::new(config.poll.history_limit));
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();

        let stream = if config.feed.enabled {
            let (router, channels) = event_channels();
            let (connector, handle) = StreamConnector::new(&config.feed, registry.clone(), router);
            spawn_workers(channels, pipeline.clone(), &tracker);

            let token = shutdown.clone();
            tracker.spawn(async move {
                if let Err(e) = connector.run(token).await {
                    tracing::error!(error = %e, "Feed connector stopped");
                }
            });
            Some(handle)
        } else {
            tracing::info!("Live feed disabled");
            None
        };

        match snapshot_source {
            Some(source) if config.poll.enabled => {
                let scheduler = PollScheduler::new(
                    &config.poll,
                    registry.clone(),
                    source,
                    book.clone(),
                    pipeline,
                );
                let token = shutdown.clone();
                tracker.spawn(async move { scheduler.run(token).await });
            }
            _ => tracing::info!("Snapshot polling disabled"),
        }

        Ok(Self {
            store,
            registry,
            book,
            stream,
            shutdown,
            tracker,
        })
    }

    /// Start monitoring `address` on `chains`. Chains merge into any existing
    /// subscription and an inactive wallet is reactivated.
    pub async fn track_wallet<I, S>(&self, address: &str, chains: I) -> eyre::Result<TrackedWallet>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let address = normalize_address(address)?;
        let chains = normalize_chains(chains);
        if chains.is_empty() {
            return Err(eyre::eyre!("No chains given for wallet '{}'", address));
        }

        let wallet = self.store.upsert_wallet(&address, &chains).await?;
        let subscription = self.subscribe(&wallet.address, &wallet.chains);

        tracing::info!(
            wallet = %wallet.address,
            chains = ?subscription.chains,
            "Wallet tracked"
        );
        Ok(wallet)
    }

    /// Stop monitoring `address`. Stored transactions and alerts are kept.
    /// Returns false when the wallet was not being tracked.
    pub async fn untrack_wallet(&self, address: &str) -> eyre::Result<bool> {
        let address = normalize_address(address)?;
        let deactivated = self.store.deactivate_wallet(&address).await?;

        let removed = match &self.stream {
            Some(stream) => stream.unsubscribe(&address),
            None => self.registry.remove(&address),
        };
        let dropped = self.book.forget(&address).await;

        tracing::info!(
            wallet = %address,
            deactivated,
            snapshots_dropped = dropped,
            "Wallet untracked"
        );
        Ok(deactivated || removed.is_some())
    }

    fn subscribe(&self, address: &str, chains: &BTreeSet<String>) -> Subscription {
        match &self.stream {
            Some(stream) => stream.subscribe(address, chains),
            None => self.registry.add(address, chains),
        }
    }

    pub fn registry(&self) -> Arc<SubscriptionRegistry> {
        self.registry.clone()
    }

    pub fn snapshots(&self) -> Arc<SnapshotBook> {
        self.book.clone()
    }

    /// Live feed state, `None` when the feed is disabled.
    pub fn connection_state(&self) -> Option<watch::Receiver<ConnectionState>> {
        self.stream.as_ref().map(StreamHandle::state_receiver)
    }

    /// Token cancelled by [`shutdown`](Self::shutdown); other tasks (the API
    /// server) can tie their lifetime to it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop the feed and poller, then wait for queued and in-flight events to finish.
    pub async fn shutdown(self) {
        tracing::info!("Stopping monitor service");
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("Monitor service stopped");
    }
}
