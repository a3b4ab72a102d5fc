pub mod memory;
pub mod postgres;
pub mod repository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::alert::types::Alert;
use crate::ingest::types::{TransactionRecord, TransactionType};
use crate::risk::types::RiskAnalysis;
use crate::wallet::types::TrackedWallet;

/// Persistence contract for wallets, transactions and alerts.
///
/// `insert_transaction` is the single-writer gate per hash: of any number of
/// concurrent inserts for the same hash exactly one returns `true`.
#[async_trait]
pub trait Store: Send + Sync {
    /// Create or reactivate a wallet, merging `chains` into its existing set.
    async fn upsert_wallet(
        &self,
        address: &str,
        chains: &BTreeSet<String>,
    ) -> eyre::Result<TrackedWallet>;

    /// Soft-delete. Returns false when no active wallet had that address.
    async fn deactivate_wallet(&self, address: &str) -> eyre::Result<bool>;

    async fn active_wallets(&self) -> eyre::Result<Vec<TrackedWallet>>;

    /// First active wallet whose address is one of `addresses`.
    async fn find_wallet_by_addresses(
        &self,
        addresses: &[&str],
    ) -> eyre::Result<Option<TrackedWallet>>;

    /// Atomically bump the running totals for one accepted transaction.
    async fn increment_wallet_stats(
        &self,
        wallet_id: i64,
        value_usd: f64,
        activity_at: DateTime<Utc>,
    ) -> eyre::Result<()>;

    /// Returns false, writing nothing, when the hash already exists.
    async fn insert_transaction(&self, tx: &TransactionRecord) -> eyre::Result<bool>;

    async fn attach_risk_analysis(&self, hash: &str, analysis: &RiskAnalysis) -> eyre::Result<()>;

    /// Transactions recorded for the wallet at or after `since`.
    async fn count_recent_transactions(
        &self,
        wallet_id: i64,
        since: DateTime<Utc>,
    ) -> eyre::Result<i64>;

    /// Transactions of `transaction_type` on the same chain and block, excluding `exclude_hash`.
    async fn count_block_transactions(
        &self,
        chain: &str,
        block_number: i64,
        transaction_type: TransactionType,
        exclude_hash: &str,
    ) -> eyre::Result<i64>;

    /// Append an alert and return its id.
    async fn insert_alert(&self, alert: &Alert) -> eyre::Result<i64>;
}
