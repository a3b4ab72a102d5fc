use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Per-wallet alert thresholds, stored with the wallet record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub high_value_usd: f64,
    pub frequency_per_hour: i32,
    pub risk_score_threshold: i16,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            high_value_usd: 10_000.0,
            frequency_per_hour: 10,
            risk_score_threshold: 7,
        }
    }
}

/// Running totals maintained by the stats aggregator.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WalletStats {
    pub total_transactions: i64,
    pub total_value_usd: f64,
    pub last_activity: Option<DateTime<Utc>>,
}

/// A monitored address and its chain subscriptions.
#[derive(Debug, Clone, Serialize)]
pub struct TrackedWallet {
    pub id: i64,
    pub address: String,
    pub chains: BTreeSet<String>,
    pub thresholds: AlertThresholds,
    pub is_active: bool,
    pub stats: WalletStats,
}

/// Validate an EVM address and return its lower-case `0x` form.
pub fn normalize_address(raw: &str) -> eyre::Result<String> {
    let trimmed = raw.trim();
    if !trimmed.starts_with("0x") || trimmed.len() != 42 {
        return Err(eyre::eyre!("Invalid wallet address '{}'", raw));
    }
    let address = Address::from_str(trimmed)
        .map_err(|e| eyre::eyre!("Invalid wallet address '{}': {}", raw, e))?;
    Ok(format!("0x{}", hex::encode(address.as_slice())))
}

/// Lower-case and de-duplicate chain identifiers, dropping blanks.
pub fn normalize_chains<I, S>(chains: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    chains
        .into_iter()
        .map(|c| c.as_ref().trim().to_ascii_lowercase())
        .filter(|c| !c.is_empty())
        .collect()
}
