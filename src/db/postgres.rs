use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::BTreeSet;

use crate::alert::types::Alert;
use crate::config::DatabaseConfig;
use crate::ingest::types::{TransactionRecord, TransactionType};
use crate::risk::types::RiskAnalysis;
use crate::wallet::types::TrackedWallet;

use super::repository;
use super::Store;

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and bring the schema up to date.
    pub async fn connect(config: &DatabaseConfig) -> eyre::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| eyre::eyre!("Failed to connect to database: {}", e))?;

        tracing::info!("Connected to PostgreSQL");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| eyre::eyre!("Failed to run migrations: {}", e))?;

        tracing::info!("Database migrations complete");
        Ok(Self::new(pool))
    }

}

#[async_trait]
impl Store for PgStore {
    async fn upsert_wallet(
        &self,
        address: &str,
        chains: &BTreeSet<String>,
    ) -> eyre::Result<TrackedWallet> {
        repository::upsert_wallet(&self.pool, address, chains).await
    }

    async fn deactivate_wallet(&self, address: &str) -> eyre::Result<bool> {
        repository::deactivate_wallet(&self.pool, address).await
    }

    async fn active_wallets(&self) -> eyre::Result<Vec<TrackedWallet>> {
        repository::get_active_wallets(&self.pool).await
    }

    async fn find_wallet_by_addresses(
        &self,
        addresses: &[&str],
    ) -> eyre::Result<Option<TrackedWallet>> {
        repository::find_active_wallet(&self.pool, addresses).await
    }

    async fn increment_wallet_stats(
        &self,
        wallet_id: i64,
        value_usd: f64,
        activity_at: DateTime<Utc>,
    ) -> eyre::Result<()> {
        repository::increment_wallet_stats(&self.pool, wallet_id, value_usd, activity_at).await
    }

    async fn insert_transaction(&self, tx: &TransactionRecord) -> eyre::Result<bool> {
        repository::insert_transaction(&self.pool, tx).await
    }

    async fn attach_risk_analysis(&self, hash: &str, analysis: &RiskAnalysis) -> eyre::Result<()> {
        repository::update_risk_analysis(&self.pool, hash, analysis).await
    }

    async fn count_recent_transactions(
        &self,
        wallet_id: i64,
        since: DateTime<Utc>,
    ) -> eyre::Result<i64> {
        repository::count_wallet_transactions_since(&self.pool, wallet_id, since).await
    }

    async fn count_block_transactions(
        &self,
        chain: &str,
        block_number: i64,
        transaction_type: TransactionType,
        exclude_hash: &str,
    ) -> eyre::Result<i64> {
        repository::count_block_transactions(
            &self.pool,
            chain,
            block_number,
            transaction_type,
            exclude_hash,
        )
        .await
    }

    async fn insert_alert(&self, alert: &Alert) -> eyre::Result<i64> {
        repository::insert_alert(&self.pool, alert).await
    }
}
