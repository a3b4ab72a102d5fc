use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::Mutex;

use crate::alert::types::Alert;
use crate::ingest::types::{TransactionRecord, TransactionType};
use crate::risk::types::RiskAnalysis;
use crate::wallet::types::{AlertThresholds, TrackedWallet, WalletStats};

use super::Store;

#[derive(Default)]
struct Inner {
    next_wallet_id: i64,
    wallets: HashMap<String, TrackedWallet>,
    transactions: HashMap<String, TransactionRecord>,
    alerts: Vec<Alert>,
}

/// Process-local store with the same contract as the PostgreSQL one.
/// Every operation runs under one lock, so check-and-insert is atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn transaction(&self, hash: &str) -> Option<TransactionRecord> {
        self.inner.lock().await.transactions.get(hash).cloned()
    }

    pub async fn transaction_count(&self) -> usize {
        self.inner.lock().await.transactions.len()
    }

    pub async fn alerts(&self) -> Vec<Alert> {
        self.inner.lock().await.alerts.clone()
    }

    /// Wallet by address, active or not.
    pub async fn wallet(&self, address: &str) -> Option<TrackedWallet> {
        self.inner.lock().await.wallets.get(address).cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_wallet(
        &self,
        address: &str,
        chains: &BTreeSet<String>,
    ) -> eyre::Result<TrackedWallet> {
        let mut inner = self.inner.lock().await;
        if let Some(wallet) = inner.wallets.get_mut(address) {
            wallet.chains.extend(chains.iter().cloned());
            wallet.is_active = true;
            return Ok(wallet.clone());
        }

        inner.next_wallet_id += 1;
        let wallet = TrackedWallet {
            id: inner.next_wallet_id,
            address: address.to_string(),
            chains: chains.clone(),
            thresholds: AlertThresholds::default(),
            is_active: true,
            stats: WalletStats::default(),
        };
        inner.wallets.insert(address.to_string(), wallet.clone());
        Ok(wallet)
    }

    async fn deactivate_wallet(&self, address: &str) -> eyre::Result<bool> {
        let mut inner = self.inner.lock().await;
        Ok(match inner.wallets.get_mut(address) {
            Some(wallet) if wallet.is_active => {
                wallet.is_active = false;
                true
            }
            _ => false,
        })
    }

    async fn active_wallets(&self) -> eyre::Result<Vec<TrackedWallet>> {
        let inner = self.inner.lock().await;
        let mut wallets: Vec<TrackedWallet> = inner
            .wallets
            .values()
            .filter(|w| w.is_active)
            .cloned()
            .collect();
        wallets.sort_by_key(|w| w.id);
        Ok(wallets)
    }

    async fn find_wallet_by_addresses(
        &self,
        addresses: &[&str],
    ) -> eyre::Result<Option<TrackedWallet>> {
        let inner = self.inner.lock().await;
        Ok(addresses
            .iter()
            .filter_map(|a| inner.wallets.get(*a))
            .filter(|w| w.is_active)
            .min_by_key(|w| w.id)
            .cloned())
    }

    async fn increment_wallet_stats(
        &self,
        wallet_id: i64,
        value_usd: f64,
        activity_at: DateTime<Utc>,
    ) -> eyre::Result<()> {
        let mut inner = self.inner.lock().await;
        let wallet = inner
            .wallets
            .values_mut()
            .find(|w| w.id == wallet_id)
            .ok_or_else(|| eyre::eyre!("Unknown wallet id {}", wallet_id))?;

        let stats = &mut wallet.stats;
        stats.total_transactions += 1;
        stats.total_value_usd += value_usd;
        stats.last_activity = Some(match stats.last_activity {
            Some(prev) if prev > activity_at => prev,
            _ => activity_at,
        });
        Ok(())
    }

    async fn insert_transaction(&self, tx: &TransactionRecord) -> eyre::Result<bool> {
        let mut inner = self.inner.lock().await;
        if inner.transactions.contains_key(&tx.hash) {
            return Ok(false);
        }
        inner.transactions.insert(tx.hash.clone(), tx.clone());
        Ok(true)
    }

    async fn attach_risk_analysis(&self, hash: &str, analysis: &RiskAnalysis) -> eyre::Result<()> {
        let mut inner = self.inner.lock().await;
        let tx = inner
            .transactions
            .get_mut(hash)
            .ok_or_else(|| eyre::eyre!("No transaction with hash {} to attach analysis to", hash))?;
        tx.risk_analysis = Some(analysis.clone());
        Ok(())
    }

    async fn count_recent_transactions(
        &self,
        wallet_id: i64,
        since: DateTime<Utc>,
    ) -> eyre::Result<i64> {
        let inner = self.inner.lock().await;
        Ok(inner
            .transactions
            .values()
            .filter(|t| t.wallet_id == wallet_id && t.recorded_at >= since)
            .count() as i64)
    }

    async fn count_block_transactions(
        &self,
        chain: &str,
        block_number: i64,
        transaction_type: TransactionType,
        exclude_hash: &str,
    ) -> eyre::Result<i64> {
        let inner = self.inner.lock().await;
        Ok(inner
            .transactions
            .values()
            .filter(|t| {
                t.chain == chain
                    && t.block_number == Some(block_number)
                    && t.transaction_type == transaction_type
                    && t.hash != exclude_hash
            })
            .count() as i64)
    }

    async fn insert_alert(&self, alert: &Alert) -> eyre::Result<i64> {
        let mut inner = self.inner.lock().await;
        let id = inner.alerts.len() as i64 + 1;
        let mut stored = alert.clone();
        stored.id = Some(id);
        inner.alerts.push(stored);
        Ok(id)
    }
}
