use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::BTreeSet;

use crate::alert::types::Alert;
use crate::ingest::types::{TransactionRecord, TransactionType};
use crate::risk::types::RiskAnalysis;
use crate::wallet::types::{AlertThresholds, TrackedWallet, WalletStats};

const WALLET_COLUMNS: &str = "id, address, chains, high_value_usd, frequency_per_hour, \
     risk_score_threshold, is_active, total_transactions, total_value_usd, last_activity";

type WalletRow = (
    i64,
    String,
    Vec<String>,
    f64,
    i32,
    i16,
    bool,
    i64,
    f64,
    Option<DateTime<Utc>>,
);

fn wallet_from_row(row: WalletRow) -> TrackedWallet {
    let (
        id,
        address,
        chains,
        high_value_usd,
        frequency_per_hour,
        risk_score_threshold,
        is_active,
        total_transactions,
        total_value_usd,
        last_activity,
    ) = row;

    TrackedWallet {
        id,
        address,
        chains: chains.into_iter().collect(),
        thresholds: AlertThresholds {
            high_value_usd,
            frequency_per_hour,
            risk_score_threshold,
        },
        is_active,
        stats: WalletStats {
            total_transactions,
            total_value_usd,
            last_activity,
        },
    }
}

/// Insert a wallet or reactivate it, taking the union of old and new chains.
pub async fn upsert_wallet(
    pool: &PgPool,
    address: &str,
    chains: &BTreeSet<String>,
) -> eyre::Result<TrackedWallet> {
    let defaults = AlertThresholds::default();
    let chains: Vec<String> = chains.iter().cloned().collect();

    let sql = format!(
        "INSERT INTO wallets (address, chains, high_value_usd, frequency_per_hour, risk_score_threshold)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (address) DO UPDATE
         SET chains = ARRAY(
                 SELECT DISTINCT c FROM unnest(wallets.chains || EXCLUDED.chains) AS c ORDER BY c
             ),
             is_active = TRUE,
             updated_at = NOW()
         RETURNING {WALLET_COLUMNS}"
    );

    let row: WalletRow = sqlx::query_as(&sql)
        .bind(address)
        .bind(&chains)
        .bind(defaults.high_value_usd)
        .bind(defaults.frequency_per_hour)
        .bind(defaults.risk_score_threshold)
        .fetch_one(pool)
        .await?;

    Ok(wallet_from_row(row))
}

pub async fn deactivate_wallet(pool: &PgPool, address: &str) -> eyre::Result<bool> {
    let result = sqlx::query(
        "UPDATE wallets SET is_active = FALSE, updated_at = NOW()
         WHERE address = $1 AND is_active",
    )
    .bind(address)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn get_active_wallets(pool: &PgPool) -> eyre::Result<Vec<TrackedWallet>> {
    let sql = format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE is_active ORDER BY id");
    let rows: Vec<WalletRow> = sqlx::query_as(&sql).fetch_all(pool).await?;
    Ok(rows.into_iter().map(wallet_from_row).collect())
}

pub async fn find_active_wallet(
    pool: &PgPool,
    addresses: &[&str],
) -> eyre::Result<Option<TrackedWallet>> {
    if addresses.is_empty() {
        return Ok(None);
    }
    let addresses: Vec<String> = addresses.iter().map(|a| a.to_string()).collect();

    let sql = format!(
        "SELECT {WALLET_COLUMNS} FROM wallets
         WHERE address = ANY($1) AND is_active
         ORDER BY id LIMIT 1"
    );
    let row: Option<WalletRow> = sqlx::query_as(&sql)
        .bind(&addresses)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(wallet_from_row))
}

/// Single-statement increment so concurrent updates for one wallet never lose a count.
/// `last_activity` only moves forward.
pub async fn increment_wallet_stats(
    pool: &PgPool,
    wallet_id: i64,
    value_usd: f64,
    activity_at: DateTime<Utc>,
) -> eyre::Result<()> {
    sqlx::query(
        "UPDATE wallets
         SET total_transactions = total_transactions + 1,
             total_value_usd = total_value_usd + $2,
             last_activity = GREATEST(COALESCE(last_activity, $3), $3),
             updated_at = NOW()
         WHERE id = $1",
    )
    .bind(wallet_id)
    .bind(value_usd)
    .bind(activity_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert one transaction. The unique hash constraint makes a duplicate a no-op,
/// reported as `false`.
pub async fn insert_transaction(pool: &PgPool, tx: &TransactionRecord) -> eyre::Result<bool> {
    let result = sqlx::query(
        "INSERT INTO transactions (wallet_id, chain, hash, block_number, block_timestamp, \
         from_address, to_address, value, value_usd, gas_used, gas_price, gas_fee_usd, \
         transaction_type, contract_addresses, method_name, token_transfers, nft_transfers, \
         status, recorded_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
         ON CONFLICT (hash) DO NOTHING",
    )
    .bind(tx.wallet_id)
    .bind(&tx.chain)
    .bind(&tx.hash)
    .bind(tx.block_number)
    .bind(tx.block_timestamp)
    .bind(&tx.from_address)
    .bind(&tx.to_address)
    .bind(&tx.value)
    .bind(tx.value_usd)
    .bind(&tx.gas_used)
    .bind(&tx.gas_price)
    .bind(tx.gas_fee_usd)
    .bind(tx.transaction_type.as_str())
    .bind(&tx.contract_addresses)
    .bind(&tx.method_name)
    .bind(Json(&tx.token_transfers))
    .bind(Json(&tx.nft_transfers))
    .bind(tx.status.as_str())
    .bind(tx.recorded_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn update_risk_analysis(
    pool: &PgPool,
    hash: &str,
    analysis: &RiskAnalysis,
) -> eyre::Result<()> {
    let flags: Vec<String> = analysis.flag_names().into_iter().map(String::from).collect();

    let result = sqlx::query(
        "UPDATE transactions
         SET risk_score = $2, risk_flags = $3, risk_confidence = $4,
             risk_reasoning = $5, risk_checked_at = $6
         WHERE hash = $1",
    )
    .bind(hash)
    .bind(analysis.score as i16)
    .bind(&flags)
    .bind(analysis.confidence)
    .bind(&analysis.reasoning)
    .bind(analysis.checked_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(eyre::eyre!("No transaction with hash {} to attach analysis to", hash));
    }
    Ok(())
}

pub async fn count_wallet_transactions_since(
    pool: &PgPool,
    wallet_id: i64,
    since: DateTime<Utc>,
) -> eyre::Result<i64> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM transactions WHERE wallet_id = $1 AND recorded_at >= $2",
    )
    .bind(wallet_id)
    .bind(since)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

pub async fn count_block_transactions(
    pool: &PgPool,
    chain: &str,
    block_number: i64,
    transaction_type: TransactionType,
    exclude_hash: &str,
) -> eyre::Result<i64> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM transactions
         WHERE chain = $1 AND block_number = $2 AND transaction_type = $3 AND hash <> $4",
    )
    .bind(chain)
    .bind(block_number)
    .bind(transaction_type.as_str())
    .bind(exclude_hash)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

pub async fn insert_alert(pool: &PgPool, alert: &Alert) -> eyre::Result<i64> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO alerts (wallet_id, transaction_hash, alert_type, severity, title, message, \
         metadata, is_read, is_resolved, resolved_at, actions, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         RETURNING id",
    )
    .bind(alert.wallet_id)
    .bind(&alert.transaction_hash)
    .bind(alert.alert_type.as_str())
    .bind(alert.severity.as_str())
    .bind(&alert.title)
    .bind(&alert.message)
    .bind(Json(&alert.metadata))
    .bind(alert.is_read)
    .bind(alert.is_resolved)
    .bind(alert.resolved_at)
    .bind(Json(&alert.actions))
    .bind(alert.created_at)
    .fetch_one(pool)
    .await?;

    Ok(id)
}
