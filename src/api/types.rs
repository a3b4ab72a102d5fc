use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::snapshot::history::ChangeSet;
use crate::snapshot::types::Snapshot;
use crate::stream::connector::ConnectionState;

// ============================================================
// Query params
// ============================================================

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    /// Restrict to one chain; all subscribed chains when absent.
    pub chain: Option<String>,
    pub limit: Option<usize>,
}

// ============================================================
// Responses
// ============================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    /// `None` when the live feed is disabled.
    pub feed: Option<ConnectionState>,
    pub monitored_wallets: usize,
    pub snapshot_accounts: usize,
}

#[derive(Debug, Serialize)]
pub struct WalletSummary {
    pub address: String,
    pub chains: BTreeSet<String>,
}

#[derive(Debug, Serialize)]
pub struct WalletsResponse {
    pub count: usize,
    pub wallets: Vec<WalletSummary>,
}

#[derive(Debug, Serialize)]
pub struct ChainSnapshots {
    pub chain: String,
    pub snapshots: Vec<Snapshot>,
}

#[derive(Debug, Serialize)]
pub struct SnapshotsResponse {
    pub address: String,
    pub chains: Vec<ChainSnapshots>,
}

#[derive(Debug, Serialize)]
pub struct ChainChanges {
    pub chain: String,
    pub changes: Vec<ChangeSet>,
}

#[derive(Debug, Serialize)]
pub struct ChangesResponse {
    pub address: String,
    pub chains: Vec<ChainChanges>,
}
