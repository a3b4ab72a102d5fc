use serde::Serialize;
use std::collections::HashSet;

use crate::ingest::types::{parse_amount, IncomingTransaction, TransferEvent};

use super::types::Snapshot;

/// One observable difference between two snapshots of the same account.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SnapshotChange {
    BalanceChange {
        old: String,
        new: String,
        /// Signed `new - old`.
        difference: String,
    },
    NewTransactions {
        count: usize,
        transactions: Vec<IncomingTransaction>,
    },
    NewTokenTransfers {
        count: usize,
        transfers: Vec<TransferEvent>,
    },
}

/// Compute the changes from `old` to `new`.
///
/// A comparison is skipped when either side lacks the field. Balances compare as
/// arbitrary-precision integers; transactions and transfers by hash set difference,
/// keeping the order of `new`.
pub fn diff(old: &Snapshot, new: &Snapshot) -> Vec<SnapshotChange> {
    let mut changes = Vec::new();

    if let (Some(old_raw), Some(new_raw)) = (&old.balance, &new.balance) {
        match (parse_amount(old_raw), parse_amount(new_raw)) {
            (Some(old_balance), Some(new_balance)) if old_balance != new_balance => {
                let difference = &new_balance - &old_balance;
                changes.push(SnapshotChange::BalanceChange {
                    old: old_balance.to_string(),
                    new: new_balance.to_string(),
                    difference: difference.to_string(),
                });
            }
            (Some(_), Some(_)) => {}
            _ => {
                tracing::debug!(
                    address = %new.address,
                    old = %old_raw,
                    new = %new_raw,
                    "Unparseable balance, skipping balance comparison"
                );
            }
        }
    }

    if let (Some(old_txs), Some(new_txs)) = (&old.recent_transactions, &new.recent_transactions) {
        let seen: HashSet<String> = old_txs.iter().map(|t| hash_key(&t.hash)).collect();
        let fresh: Vec<IncomingTransaction> = new_txs
            .iter()
            .filter(|t| !seen.contains(&hash_key(&t.hash)))
            .cloned()
            .collect();
        if !fresh.is_empty() {
            changes.push(SnapshotChange::NewTransactions {
                count: fresh.len(),
                transactions: fresh,
            });
        }
    }

    if let (Some(old_transfers), Some(new_transfers)) = (&old.token_transfers, &new.token_transfers) {
        let seen: HashSet<String> = old_transfers
            .iter()
            .map(|t| hash_key(&t.transaction.hash))
            .collect();
        let fresh: Vec<TransferEvent> = new_transfers
            .iter()
            .filter(|t| !seen.contains(&hash_key(&t.transaction.hash)))
            .cloned()
            .collect();
        if !fresh.is_empty() {
            changes.push(SnapshotChange::NewTokenTransfers {
                count: fresh.len(),
                transfers: fresh,
            });
        }
    }

    changes
}

fn hash_key(hash: &str) -> String {
    hash.trim().to_ascii_lowercase()
}
