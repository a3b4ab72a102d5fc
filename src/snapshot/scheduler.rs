use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::PollConfig;
use crate::ingest::types::IncomingTransaction;
use crate::pipeline::{IngestOutcome, IngestPipeline, Origin};
use crate::wallet::registry::SubscriptionRegistry;

use super::differ::SnapshotChange;
use super::fetcher::{fetch_snapshot, SnapshotSource};
use super::history::{Observation, SnapshotBook};
use super::types::SnapshotKey;

/// Totals for one poll cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub accounts: usize,
    pub baselines: usize,
    pub changed: usize,
    pub failed: usize,
    pub ingested: usize,
}

enum AccountOutcome {
    Baseline,
    Quiet,
    Changed { ingested: usize },
}

/// Periodically snapshots every subscribed (wallet, chain) and feeds new
/// activity into the ingestion pipeline.
pub struct PollScheduler {
    registry: Arc<SubscriptionRegistry>,
    source: Arc<dyn SnapshotSource>,
    book: Arc<SnapshotBook>,
    pipeline: Arc<IngestPipeline>,
    interval: Duration,
    concurrency: usize,
    fetch_timeout: Duration,
}

impl PollScheduler {
    pub fn new(
        config: &PollConfig,
        registry: Arc<SubscriptionRegistry>,
        source: Arc<dyn SnapshotSource>,
        book: Arc<SnapshotBook>,
        pipeline: Arc<IngestPipeline>,
    ) -> Self {
        Self {
            registry,
            source,
            book,
            pipeline,
            interval: Duration::from_secs(config.interval_secs),
            concurrency: config.concurrency.max(1),
            fetch_timeout: Duration::from_millis(config.fetch_timeout_ms),
        }
    }

    /// Poll on a fixed period until `shutdown` fires. The first cycle runs immediately.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            concurrency = self.concurrency,
            "Snapshot polling active"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown received, stopping snapshot poller");
                    break;
                }
            }

            let report = tokio::select! {
                report = self.poll_cycle() => report,
                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown received mid-cycle, stopping snapshot poller");
                    break;
                }
            };

            tracing::info!(
                accounts = report.accounts,
                baselines = report.baselines,
                changed = report.changed,
                failed = report.failed,
                ingested = report.ingested,
                "Poll cycle complete"
            );
        }
    }

    /// One pass over every subscribed account with bounded concurrency.
    /// A failing account is logged and counted; it never stops the others.
    pub async fn poll_cycle(&self) -> CycleReport {
        let keys: Vec<SnapshotKey> = self
            .registry
            .list_active()
            .into_iter()
            .flat_map(|sub| {
                let address = sub.address;
                sub.chains
                    .into_iter()
                    .map(move |chain| SnapshotKey::new(&address, &chain))
            })
            .collect();

        let mut report = CycleReport {
            accounts: keys.len(),
            ..CycleReport::default()
        };

        let mut results = futures::stream::iter(keys)
            .map(|key| async move {
                let outcome = self.poll_account(&key).await;
                (key, outcome)
            })
            .buffer_unordered(self.concurrency);

        while let Some((key, outcome)) = results.next().await {
            match outcome {
                Ok(AccountOutcome::Baseline) => report.baselines += 1,
                Ok(AccountOutcome::Quiet) => {}
                Ok(AccountOutcome::Changed { ingested }) => {
                    report.changed += 1;
                    report.ingested += ingested;
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        wallet = %key.address,
                        chain = %key.chain,
                        error = %e,
                        "Failed to poll wallet"
                    );
                }
            }
        }

        report
    }

    async fn poll_account(&self, key: &SnapshotKey) -> eyre::Result<AccountOutcome> {
        let snapshot = fetch_snapshot(self.source.as_ref(), key, self.fetch_timeout).await;
        if snapshot.is_empty() {
            let reasons: Vec<String> = snapshot
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.field.as_str(), e.error))
                .collect();
            return Err(eyre::eyre!("Every snapshot fetch failed ({})", reasons.join("; ")));
        }

        let changes = match self.book.observe(key, snapshot).await {
            Observation::Baseline => {
                tracing::info!(wallet = %key.address, chain = %key.chain, "Baseline snapshot stored");
                return Ok(AccountOutcome::Baseline);
            }
            Observation::Unchanged | Observation::Refreshed => return Ok(AccountOutcome::Quiet),
            Observation::Changed(changes) => changes,
        };

        tracing::info!(
            wallet = %key.address,
            chain = %key.chain,
            changes = changes.len(),
            "Snapshot changes detected"
        );

        let origin = Origin::Poll {
            wallet: key.address.clone(),
        };
        let mut ingested = 0usize;

        for tx in new_activity(changes, &key.chain) {
            let hash = tx.hash.clone();
            match self.pipeline.ingest(tx, &origin).await {
                Ok(IngestOutcome::Accepted { .. }) => ingested += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(
                        wallet = %key.address,
                        chain = %key.chain,
                        hash = %hash,
                        error = %e,
                        "Failed to ingest polled transaction"
                    );
                }
            }
        }

        Ok(AccountOutcome::Changed { ingested })
    }
}

/// Transactions to ingest from a change set. New transactions come first in
/// change order; a token transfer is attached to the transaction with the same
/// hash, or becomes a transaction of its own when there is none. Missing chains
/// default to `chain`.
pub fn new_activity(changes: Vec<SnapshotChange>, chain: &str) -> Vec<IncomingTransaction> {
    let mut txs: Vec<IncomingTransaction> = Vec::new();
    let mut transfers = Vec::new();
    for change in changes {
        match change {
            SnapshotChange::BalanceChange { .. } => {}
            SnapshotChange::NewTransactions { transactions, .. } => txs.extend(transactions),
            SnapshotChange::NewTokenTransfers { transfers: batch, .. } => transfers.extend(batch),
        }
    }

    for transfer in transfers {
        let folded = transfer.into_token_transaction();
        let hash = folded.hash.trim();
        match txs.iter_mut().find(|tx| tx.hash.trim().eq_ignore_ascii_case(hash)) {
            Some(carrier) => carrier.token_transfers.extend(folded.token_transfers),
            None => txs.push(folded),
        }
    }

    for tx in &mut txs {
        if tx.chain.is_empty() {
            tx.chain = chain.to_string();
        }
    }
    txs
}
