use alloy::primitives::U256;
use std::str::FromStr;

use super::types::{IncomingTransaction, TransactionType};

/// Classify a transaction from its raw fields. First match wins:
/// token transfers, NFT transfers, decoded contract call, native value.
pub fn classify(tx: &IncomingTransaction) -> TransactionType {
    if !tx.token_transfers.is_empty() {
        return TransactionType::Defi;
    }
    if !tx.nft_transfers.is_empty() {
        return TransactionType::Nft;
    }
    if has_text(tx.to.as_deref()) && has_text(tx.method_name.as_deref()) {
        return TransactionType::ContractInteraction;
    }
    if tx.value.as_deref().is_some_and(is_nonzero_value) {
        return TransactionType::Transfer;
    }
    TransactionType::Unknown
}

fn has_text(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

/// Integer strings (decimal or `0x` hex) compare numerically; anything else
/// non-empty other than a literal zero counts as value.
fn is_nonzero_value(raw: &str) -> bool {
    let raw = raw.trim();
    if raw.is_empty() {
        return false;
    }
    match U256::from_str(raw) {
        Ok(v) => !v.is_zero(),
        Err(_) => raw != "0",
    }
}
