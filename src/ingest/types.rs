use bigdecimal::num_bigint::{BigInt, Sign};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

use crate::risk::types::RiskAnalysis;

/// Classified transaction kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Transfer,
    ContractInteraction,
    Defi,
    Nft,
    Bridge,
    Unknown,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transfer => "transfer",
            Self::ContractInteraction => "contract_interaction",
            Self::Defi => "defi",
            Self::Nft => "nft",
            Self::Bridge => "bridge",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    #[default]
    Confirmed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }
}

/// A decoded ERC-20 style transfer attached to a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    #[serde(default)]
    pub contract_address: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub decimals: Option<u8>,
    #[serde(default, rename = "valueUSD")]
    pub value_usd: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftTransfer {
    #[serde(default)]
    pub contract_address: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub token_id: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
}

/// Raw transaction fields as delivered by the live feed or a snapshot page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingTransaction {
    #[serde(default)]
    pub chain: String,
    #[serde(alias = "transactionHash")]
    pub hash: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub block_number: Option<i64>,
    #[serde(default, alias = "blockTimestamp", deserialize_with = "lenient_i64")]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: Option<String>,
    #[serde(default, rename = "valueUSD")]
    pub value_usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub gas_used: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub gas_price: Option<String>,
    #[serde(default, rename = "gasFeeUSD")]
    pub gas_fee_usd: Option<f64>,
    #[serde(default)]
    pub method_name: Option<String>,
    #[serde(default)]
    pub contract_addresses: Vec<String>,
    #[serde(default)]
    pub token_transfers: Vec<TokenTransfer>,
    #[serde(default)]
    pub nft_transfers: Vec<NftTransfer>,
}

/// A `token_transfer` / `nft_transfer` feed payload: the carrying transaction
/// plus the single asset movement it reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferEvent {
    #[serde(flatten)]
    pub transaction: IncomingTransaction,
    #[serde(default)]
    pub contract_address: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub decimals: Option<u8>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub token_id: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
}

impl TransferEvent {
    /// Fold a fungible token movement into a transaction carrying it as its only transfer.
    pub fn into_token_transaction(self) -> IncomingTransaction {
        let mut tx = self.transaction;
        let transfer = TokenTransfer {
            contract_address: self.contract_address,
            from: tx.from.clone(),
            to: tx.to.clone(),
            value: tx.value.take(),
            symbol: self.symbol,
            decimals: self.decimals,
            value_usd: tx.value_usd,
        };
        tx.token_transfers.push(transfer);
        tx
    }

    /// Fold an NFT movement into a transaction carrying it as its only transfer.
    pub fn into_nft_transaction(self) -> IncomingTransaction {
        let mut tx = self.transaction;
        let transfer = NftTransfer {
            contract_address: self.contract_address,
            from: tx.from.clone(),
            to: tx.to.clone(),
            token_id: self.token_id,
            collection: self.collection,
        };
        tx.nft_transfers.push(transfer);
        tx
    }
}

/// A persisted transaction owned by one tracked wallet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    pub wallet_id: i64,
    pub chain: String,
    pub hash: String,
    pub block_number: Option<i64>,
    pub block_timestamp: DateTime<Utc>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    /// Native value as a base-10 integer string.
    pub value: String,
    pub value_usd: f64,
    pub gas_used: Option<String>,
    pub gas_price: Option<String>,
    pub gas_fee_usd: f64,
    pub transaction_type: TransactionType,
    pub contract_addresses: Vec<String>,
    pub method_name: Option<String>,
    pub token_transfers: Vec<TokenTransfer>,
    pub nft_transfers: Vec<NftTransfer>,
    pub status: TransactionStatus,
    pub risk_analysis: Option<RiskAnalysis>,
    pub recorded_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// Build the record for `wallet_id` from feed fields and its classified type.
    pub fn from_incoming(
        wallet_id: i64,
        tx: IncomingTransaction,
        transaction_type: TransactionType,
    ) -> eyre::Result<Self> {
        let hash = tx.hash.trim().to_ascii_lowercase();
        if hash.is_empty() {
            return Err(eyre::eyre!("Transaction without a hash"));
        }
        let chain = tx.chain.trim().to_ascii_lowercase();
        if chain.is_empty() {
            return Err(eyre::eyre!("Transaction {} has no chain", hash));
        }

        let recorded_at = Utc::now();
        let block_timestamp = tx
            .timestamp
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .unwrap_or(recorded_at);

        let value = match tx.value.as_deref().map(parse_amount) {
            None => "0".to_string(),
            Some(Some(amount)) => amount.to_string(),
            Some(None) => {
                return Err(eyre::eyre!(
                    "Transaction {} has an unparseable value '{}'",
                    hash,
                    tx.value.as_deref().unwrap_or_default()
                ));
            }
        };

        Ok(Self {
            wallet_id,
            chain,
            hash,
            block_number: tx.block_number,
            block_timestamp,
            from_address: tx.from.map(|a| a.to_ascii_lowercase()),
            to_address: tx.to.map(|a| a.to_ascii_lowercase()),
            value,
            value_usd: tx.value_usd.unwrap_or(0.0),
            gas_used: tx.gas_used,
            gas_price: tx.gas_price,
            gas_fee_usd: tx.gas_fee_usd.unwrap_or(0.0),
            transaction_type,
            contract_addresses: tx.contract_addresses,
            method_name: tx.method_name,
            token_transfers: tx.token_transfers,
            nft_transfers: tx.nft_transfers,
            status: TransactionStatus::Confirmed,
            risk_analysis: None,
            recorded_at,
        })
    }
}

/// Parse a non-negative base-unit amount given in decimal, `0x` hex or integral
/// exponent notation such as `1e+21`. Empty input is zero.
pub fn parse_amount(raw: &str) -> Option<BigInt> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(BigInt::from(0));
    }
    let amount = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some("") => BigInt::from(0),
        Some(hex) => BigInt::parse_bytes(hex.as_bytes(), 16)?,
        None => match BigInt::from_str(raw) {
            Ok(amount) => amount,
            Err(_) => {
                let decimal = BigDecimal::from_str(raw).ok()?;
                if !decimal.is_integer() {
                    return None;
                }
                decimal.with_scale(0).into_bigint_and_exponent().0
            }
        },
    };
    (amount.sign() != Sign::Minus).then_some(amount)
}

/// Accept a string or a JSON number for fields that feeds send either way.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<JsonValue>::deserialize(deserializer)? {
        Some(JsonValue::String(s)) => Some(s),
        Some(JsonValue::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Accept a JSON number, a decimal string or a `0x` hex string.
fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<JsonValue>::deserialize(deserializer)? {
        Some(JsonValue::Number(n)) => n.as_i64(),
        Some(JsonValue::String(s)) => match s.strip_prefix("0x") {
            Some(hex) => i64::from_str_radix(hex, 16).ok(),
            None => s.parse().ok(),
        },
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_feed_transaction() {
        let tx: IncomingTransaction = serde_json::from_value(json!({
            "chain": "ethereum",
            "hash": "0xABC",
            "blockNumber": "0x10",
            "timestamp": 1700000000,
            "from": "0xAA",
            "to": "0xBB",
            "value": 1000000000000000000u64,
            "valueUSD": 2500.5,
            "gasUsed": 21000,
            "methodName": "transfer",
            "tokenTransfers": [{ "value": "5", "symbol": "USDC" }]
        }))
        .unwrap();

        assert_eq!(tx.block_number, Some(16));
        assert_eq!(tx.value.as_deref(), Some("1000000000000000000"));
        assert_eq!(tx.gas_used.as_deref(), Some("21000"));
        assert_eq!(tx.token_transfers[0].symbol.as_deref(), Some("USDC"));
    }

    #[test]
    fn test_snapshot_item_uses_transaction_hash_alias() {
        let tx: IncomingTransaction = serde_json::from_value(json!({
            "transactionHash": "0xdef",
            "blockNumber": 5
        }))
        .unwrap();
        assert_eq!(tx.hash, "0xdef");
        assert!(tx.chain.is_empty());
    }

    #[test]
    fn test_token_transfer_event_folds_value_into_transfer() {
        let event: TransferEvent = serde_json::from_value(json!({
            "chain": "polygon",
            "hash": "0x01",
            "from": "0xaa",
            "to": "0xbb",
            "value": "42",
            "contractAddress": "0xcc",
            "symbol": "DAI"
        }))
        .unwrap();

        let tx = event.into_token_transaction();
        assert_eq!(tx.value, None);
        assert_eq!(tx.token_transfers.len(), 1);
        assert_eq!(tx.token_transfers[0].value.as_deref(), Some("42"));
        assert_eq!(tx.token_transfers[0].contract_address.as_deref(), Some("0xcc"));
    }

    #[test]
    fn test_record_normalizes_fields() {
        let tx: IncomingTransaction = serde_json::from_value(json!({
            "chain": "Ethereum",
            "hash": "0xABCDEF",
            "from": "0xAAAA",
            "timestamp": 1700000000
        }))
        .unwrap();

        let record = TransactionRecord::from_incoming(7, tx, TransactionType::Unknown).unwrap();
        assert_eq!(record.hash, "0xabcdef");
        assert_eq!(record.chain, "ethereum");
        assert_eq!(record.from_address.as_deref(), Some("0xaaaa"));
        assert_eq!(record.value, "0");
        assert_eq!(record.block_timestamp.timestamp(), 1700000000);
        assert_eq!(record.status, TransactionStatus::Confirmed);
    }

    #[test]
    fn test_record_value_is_base_ten() {
        let mut tx: IncomingTransaction = serde_json::from_value(json!({
            "chain": "ethereum",
            "hash": "0x01",
            "value": "0x1bc16d674ec80000"
        }))
        .unwrap();
        let record = TransactionRecord::from_incoming(1, tx.clone(), TransactionType::Transfer).unwrap();
        assert_eq!(record.value, "2000000000000000000");

        tx.value = Some("1e+21".to_string());
        let record = TransactionRecord::from_incoming(1, tx.clone(), TransactionType::Transfer).unwrap();
        assert_eq!(record.value, "1000000000000000000000");

        tx.value = Some(" ".to_string());
        let record = TransactionRecord::from_incoming(1, tx.clone(), TransactionType::Transfer).unwrap();
        assert_eq!(record.value, "0");

        for junk in ["lots", "1.5", "-3"] {
            tx.value = Some(junk.to_string());
            assert!(TransactionRecord::from_incoming(1, tx.clone(), TransactionType::Transfer).is_err());
        }
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("0x10"), Some(BigInt::from(16)));
        assert_eq!(parse_amount("42"), Some(BigInt::from(42)));
        assert_eq!(parse_amount("2.5e3"), Some(BigInt::from(2500)));
        assert_eq!(parse_amount(""), Some(BigInt::from(0)));
        assert_eq!(parse_amount("0x"), Some(BigInt::from(0)));
        assert_eq!(parse_amount("1.5"), None);
        assert_eq!(parse_amount("-1"), None);
        assert_eq!(parse_amount("0xzz"), None);
    }

    #[test]
    fn test_record_requires_hash_and_chain() {
        let mut tx: IncomingTransaction =
            serde_json::from_value(json!({ "hash": " ", "chain": "ethereum" })).unwrap();
        assert!(TransactionRecord::from_incoming(1, tx.clone(), TransactionType::Unknown).is_err());

        tx.hash = "0x01".to_string();
        tx.chain = String::new();
        assert!(TransactionRecord::from_incoming(1, tx, TransactionType::Unknown).is_err());
    }
}
