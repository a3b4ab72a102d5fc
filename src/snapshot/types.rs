use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::ingest::types::{IncomingTransaction, TransferEvent};

/// The six independently fetched parts of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SnapshotField {
    Balance,
    Tokens,
    Transactions,
    TokenTransfers,
    Nfts,
    Stats,
}

impl SnapshotField {
    pub const ALL: [SnapshotField; 6] = [
        Self::Balance,
        Self::Tokens,
        Self::Transactions,
        Self::TokenTransfers,
        Self::Nfts,
        Self::Stats,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Balance => "balance",
            Self::Tokens => "tokens",
            Self::Transactions => "transactions",
            Self::TokenTransfers => "tokenTransfers",
            Self::Nfts => "nfts",
            Self::Stats => "stats",
        }
    }
}

/// Why one field of a snapshot is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    #[serde(rename = "type")]
    pub field: SnapshotField,
    pub error: String,
}

/// Identifies one polled account: a wallet on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SnapshotKey {
    pub address: String,
    pub chain: String,
}

impl SnapshotKey {
    pub fn new(address: &str, chain: &str) -> Self {
        Self {
            address: address.to_string(),
            chain: chain.to_string(),
        }
    }
}

/// Point-in-time capture of an account. A `None` field failed to fetch and
/// has a matching entry in `errors`. Once recorded as current, a failed field
/// carries the last value that was fetched, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub address: String,
    pub chain: String,
    pub taken_at: DateTime<Utc>,
    /// Native balance in base units, decimal or `0x` hex as the upstream sent it.
    pub balance: Option<String>,
    pub tokens: Option<JsonValue>,
    pub recent_transactions: Option<Vec<IncomingTransaction>>,
    pub token_transfers: Option<Vec<TransferEvent>>,
    pub nfts: Option<JsonValue>,
    pub stats: Option<JsonValue>,
    #[serde(default)]
    pub errors: Vec<FieldError>,
}

impl Snapshot {
    /// A snapshot with every field missing and no errors recorded yet.
    pub fn empty(key: &SnapshotKey) -> Self {
        Self {
            address: key.address.clone(),
            chain: key.chain.clone(),
            taken_at: Utc::now(),
            balance: None,
            tokens: None,
            recent_transactions: None,
            token_transfers: None,
            nfts: None,
            stats: None,
            errors: Vec::new(),
        }
    }

    pub fn has_field(&self, field: SnapshotField) -> bool {
        match field {
            SnapshotField::Balance => self.balance.is_some(),
            SnapshotField::Tokens => self.tokens.is_some(),
            SnapshotField::Transactions => self.recent_transactions.is_some(),
            SnapshotField::TokenTransfers => self.token_transfers.is_some(),
            SnapshotField::Nfts => self.nfts.is_some(),
            SnapshotField::Stats => self.stats.is_some(),
        }
    }

    /// True when every fetch failed.
    pub fn is_empty(&self) -> bool {
        !SnapshotField::ALL.iter().any(|f| self.has_field(*f))
    }

    /// True when `self` has a field that `other` is missing.
    pub fn fills_gaps_of(&self, other: &Snapshot) -> bool {
        SnapshotField::ALL
            .iter()
            .any(|f| self.has_field(*f) && !other.has_field(*f))
    }

    /// Fill every field missing here with the value `older` holds.
    /// Fields present here are never touched and `errors` is left as is.
    pub fn backfill_from(&mut self, older: &Snapshot) {
        if self.balance.is_none() {
            self.balance = older.balance.clone();
        }
        if self.tokens.is_none() {
            self.tokens = older.tokens.clone();
        }
        if self.recent_transactions.is_none() {
            self.recent_transactions = older.recent_transactions.clone();
        }
        if self.token_transfers.is_none() {
            self.token_transfers = older.token_transfers.clone();
        }
        if self.nfts.is_none() {
            self.nfts = older.nfts.clone();
        }
        if self.stats.is_none() {
            self.stats = older.stats.clone();
        }
    }
}
