use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::future::Future;
use std::time::Duration;

use crate::config::PollConfig;
use crate::ingest::types::{IncomingTransaction, TransferEvent};

use super::types::{FieldError, Snapshot, SnapshotField, SnapshotKey};

/// Upstream account data, one independent call per snapshot field.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn native_balance(&self, chain: &str, address: &str) -> eyre::Result<String>;
    async fn tokens(&self, chain: &str, address: &str) -> eyre::Result<JsonValue>;
    async fn transactions(&self, chain: &str, address: &str)
        -> eyre::Result<Vec<IncomingTransaction>>;
    async fn token_transfers(&self, chain: &str, address: &str) -> eyre::Result<Vec<TransferEvent>>;
    async fn nfts(&self, chain: &str, address: &str) -> eyre::Result<JsonValue>;
    async fn account_stats(&self, chain: &str, address: &str) -> eyre::Result<JsonValue>;
}

/// Fetch all six fields concurrently. Each fetch is bounded by `timeout`; a
/// failure leaves that field `None` and records why.
pub async fn fetch_snapshot(
    source: &dyn SnapshotSource,
    key: &SnapshotKey,
    timeout: Duration,
) -> Snapshot {
    let (chain, address) = (key.chain.as_str(), key.address.as_str());

    let (balance, tokens, transactions, transfers, nfts, stats) = tokio::join!(
        bounded(timeout, source.native_balance(chain, address)),
        bounded(timeout, source.tokens(chain, address)),
        bounded(timeout, source.transactions(chain, address)),
        bounded(timeout, source.token_transfers(chain, address)),
        bounded(timeout, source.nfts(chain, address)),
        bounded(timeout, source.account_stats(chain, address)),
    );

    let mut snapshot = Snapshot::empty(key);
    let mut errors = Vec::new();

    snapshot.balance = keep(SnapshotField::Balance, balance, &mut errors);
    snapshot.tokens = keep(SnapshotField::Tokens, tokens, &mut errors);
    snapshot.recent_transactions = keep(SnapshotField::Transactions, transactions, &mut errors);
    snapshot.token_transfers = keep(SnapshotField::TokenTransfers, transfers, &mut errors);
    snapshot.nfts = keep(SnapshotField::Nfts, nfts, &mut errors);
    snapshot.stats = keep(SnapshotField::Stats, stats, &mut errors);

    if !errors.is_empty() {
        tracing::warn!(
            address = %key.address,
            chain = %key.chain,
            failed = ?errors.iter().map(|e| e.field.as_str()).collect::<Vec<_>>(),
            "Partial snapshot fetch"
        );
    }
    snapshot.errors = errors;
    snapshot
}

async fn bounded<T, F>(timeout: Duration, fut: F) -> eyre::Result<T>
where
    F: Future<Output = eyre::Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(eyre::eyre!("timed out after {}ms", timeout.as_millis())),
    }
}

fn keep<T>(field: SnapshotField, result: eyre::Result<T>, errors: &mut Vec<FieldError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            errors.push(FieldError {
                field,
                error: e.to_string(),
            });
            None
        }
    }
}

// ============================================================
// Nodit REST client
// ============================================================

/// Snapshot source backed by the Nodit Web3 Data API.
pub struct NoditClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    network: String,
    page_size: u32,
}

impl NoditClient {
    pub fn new(config: &PollConfig) -> eyre::Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| eyre::eyre!("Snapshot client needs an API key"))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.fetch_timeout_ms))
            .build()
            .map_err(|e| eyre::eyre!("Failed to build snapshot HTTP client: {}", e))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            network: config.network.clone(),
            page_size: config.page_size,
        })
    }

    /// `POST {base}/{protocol}/{network}/{operation}`.
    async fn request(&self, chain: &str, operation: &str, body: JsonValue) -> eyre::Result<JsonValue> {
        let url = format!("{}/{}/{}/{}", self.base_url, chain, self.network, operation);

        let response = self
            .http
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| eyre::eyre!("{} request failed: {}", operation, e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::debug!(operation, status = %status, error = %e, "Failed to read error body");
                    String::new()
                }
            };
            return Err(eyre::eyre!("{} returned {}: {}", operation, status, detail));
        }

        response
            .json::<JsonValue>()
            .await
            .map_err(|e| eyre::eyre!("{} returned invalid JSON: {}", operation, e))
    }

    fn page(&self, address: &str) -> JsonValue {
        serde_json::json!({ "address": address, "limit": self.page_size, "order": "desc" })
    }
}

#[async_trait]
impl SnapshotSource for NoditClient {
    async fn native_balance(&self, chain: &str, address: &str) -> eyre::Result<String> {
        let body = self
            .request(chain, "getNativeBalanceByAccount", serde_json::json!({ "address": address }))
            .await?;
        extract_balance(&body)
    }

    async fn tokens(&self, chain: &str, address: &str) -> eyre::Result<JsonValue> {
        self.request(
            chain,
            "getTokensOwnedByAccount",
            serde_json::json!({ "address": address, "limit": 100 }),
        )
        .await
    }

    async fn transactions(
        &self,
        chain: &str,
        address: &str,
    ) -> eyre::Result<Vec<IncomingTransaction>> {
        let body = self
            .request(chain, "getTransactionsByAccount", self.page(address))
            .await?;
        let mut txs: Vec<IncomingTransaction> = parse_items(&body)?;
        for tx in &mut txs {
            if tx.chain.is_empty() {
                tx.chain = chain.to_string();
            }
        }
        Ok(txs)
    }

    async fn token_transfers(&self, chain: &str, address: &str) -> eyre::Result<Vec<TransferEvent>> {
        let body = self
            .request(chain, "getTokenTransfersByAccount", self.page(address))
            .await?;
        let mut transfers: Vec<TransferEvent> = parse_items(&body)?;
        for transfer in &mut transfers {
            if transfer.transaction.chain.is_empty() {
                transfer.transaction.chain = chain.to_string();
            }
        }
        Ok(transfers)
    }

    async fn nfts(&self, chain: &str, address: &str) -> eyre::Result<JsonValue> {
        self.request(
            chain,
            "getNftsOwnedByAccount",
            serde_json::json!({ "address": address, "limit": 100 }),
        )
        .await
    }

    async fn account_stats(&self, chain: &str, address: &str) -> eyre::Result<JsonValue> {
        self.request(chain, "getAccountStats", serde_json::json!({ "address": address }))
            .await
    }
}

/// Read the native balance from `{"balance": ...}`, string or number.
pub fn extract_balance(body: &JsonValue) -> eyre::Result<String> {
    match body.get("balance") {
        Some(JsonValue::String(s)) => Ok(s.clone()),
        Some(JsonValue::Number(n)) => Ok(n.to_string()),
        _ => Err(eyre::eyre!("Balance response has no balance field")),
    }
}

/// The list payload of a paged response: `items`, falling back to `result`.
pub fn extract_items(body: &JsonValue) -> eyre::Result<&Vec<JsonValue>> {
    body.get("items")
        .and_then(JsonValue::as_array)
        .or_else(|| body.get("result").and_then(JsonValue::as_array))
        .ok_or_else(|| eyre::eyre!("Response has neither an items nor a result list"))
}

/// Decode list items, skipping the ones that do not fit `T`.
fn parse_items<T: serde::de::DeserializeOwned>(body: &JsonValue) -> eyre::Result<Vec<T>> {
    let items = extract_items(body)?;
    let mut parsed = Vec::with_capacity(items.len());
    let mut skipped = 0usize;

    for item in items {
        match serde_json::from_value::<T>(item.clone()) {
            Ok(value) => parsed.push(value),
            Err(e) => {
                skipped += 1;
                tracing::debug!(error = %e, "Skipping undecodable list item");
            }
        }
    }

    if skipped > 0 {
        tracing::warn!(skipped, kept = parsed.len(), "Skipped undecodable list items");
    }
    Ok(parsed)
}
