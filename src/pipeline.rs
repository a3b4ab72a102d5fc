use std::sync::Arc;

use crate::alert::factory::AlertFactory;
use crate::alert::notify::NotificationSink;
use crate::config::RiskConfig;
use crate::db::Store;
use crate::ingest::classifier;
use crate::ingest::types::{IncomingTransaction, TransactionRecord};
use crate::risk::scorer::RiskScorer;
use crate::threat::ThreatIntel;
use crate::wallet::stats::WalletStatsAggregator;
use crate::wallet::types::TrackedWallet;

/// Where a transaction entered the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Live feed: the owner is resolved from the from/to addresses.
    Stream,
    /// Snapshot diff for a wallet already known to own it.
    Poll { wallet: String },
}

/// What happened to one ingested transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// No active tracked wallet on either side.
    Unowned,
    /// The hash was already stored.
    Duplicate,
    /// Persisted. `risk_score` is `None` when scoring failed.
    Accepted {
        risk_score: Option<u8>,
        alert_raised: bool,
    },
}

/// Orchestrates every step after a transaction arrives:
/// 1. Owner resolution
/// 2. Classification and persistence (dedup on hash)
/// 3. Wallet stats, in parallel with
/// 4. Risk scoring and alerting
pub struct IngestPipeline {
    store: Arc<dyn Store>,
    scorer: RiskScorer,
    alerts: AlertFactory,
    stats: WalletStatsAggregator,
}

impl IngestPipeline {
    pub fn new(
        config: &RiskConfig,
        store: Arc<dyn Store>,
        threat_intel: Arc<dyn ThreatIntel>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            scorer: RiskScorer::new(config, store.clone(), threat_intel),
            alerts: AlertFactory::new(config.alert_threshold, store.clone(), sink),
            stats: WalletStatsAggregator::new(store.clone()),
            store,
        }
    }

    /// Run one transaction through the pipeline. Only failures before the
    /// transaction is stored are returned as errors; stats, scoring and
    /// alerting failures after that are logged and leave the record in place.
    pub async fn ingest(
        &self,
        tx: IncomingTransaction,
        origin: &Origin,
    ) -> eyre::Result<IngestOutcome> {
        let Some(wallet) = self.resolve_owner(&tx, origin).await? else {
            tracing::debug!(hash = %tx.hash, "No tracked wallet for transaction, skipping");
            return Ok(IngestOutcome::Unowned);
        };

        let transaction_type = classifier::classify(&tx);
        let record = TransactionRecord::from_incoming(wallet.id, tx, transaction_type)?;

        if !self.store.insert_transaction(&record).await? {
            tracing::debug!(hash = %record.hash, "Duplicate transaction, skipping");
            return Ok(IngestOutcome::Duplicate);
        }

        tracing::info!(
            wallet = %wallet.address,
            chain = %record.chain,
            hash = %record.hash,
            transaction_type = record.transaction_type.as_str(),
            value_usd = record.value_usd,
            "Transaction stored"
        );

        let (stats_result, (risk_score, alert_raised)) =
            tokio::join!(self.stats.record(&record), self.assess(&record));

        if let Err(e) = stats_result {
            tracing::error!(
                wallet_id = record.wallet_id,
                hash = %record.hash,
                error = %e,
                "Failed to update wallet stats"
            );
        }

        Ok(IngestOutcome::Accepted {
            risk_score,
            alert_raised,
        })
    }

    async fn resolve_owner(
        &self,
        tx: &IncomingTransaction,
        origin: &Origin,
    ) -> eyre::Result<Option<TrackedWallet>> {
        match origin {
            Origin::Poll { wallet } => {
                let address = wallet.to_ascii_lowercase();
                self.store.find_wallet_by_addresses(&[address.as_str()]).await
            }
            Origin::Stream => {
                let candidates: Vec<String> = [tx.from.as_deref(), tx.to.as_deref()]
                    .into_iter()
                    .flatten()
                    .map(|a| a.trim().to_ascii_lowercase())
                    .filter(|a| !a.is_empty())
                    .collect();
                if candidates.is_empty() {
                    return Ok(None);
                }
                let refs: Vec<&str> = candidates.iter().map(String::as_str).collect();
                self.store.find_wallet_by_addresses(&refs).await
            }
        }
    }

    /// Score, attach the analysis, then alert. Returns the score (if scoring
    /// succeeded) and whether an alert was stored.
    async fn assess(&self, record: &TransactionRecord) -> (Option<u8>, bool) {
        let analysis = match self.scorer.analyze(record).await {
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::error!(hash = %record.hash, error = %e, "Risk analysis failed");
                return (None, false);
            }
        };

        if let Err(e) = self.store.attach_risk_analysis(&record.hash, &analysis).await {
            tracing::error!(hash = %record.hash, error = %e, "Failed to store risk analysis");
        }

        let alert_raised = match self.alerts.raise(record, &analysis).await {
            Ok(alert) => alert.is_some(),
            Err(e) => {
                tracing::error!(hash = %record.hash, error = %e, "Failed to raise alert");
                false
            }
        };

        (Some(analysis.score), alert_raised)
    }
}
