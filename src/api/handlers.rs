use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

use crate::snapshot::history::{DEFAULT_HISTORY_LIMIT, DEFAULT_TIMELINE_LIMIT};
use crate::snapshot::types::SnapshotKey;
use crate::wallet::types::normalize_address;

use super::types::*;
use super::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: msg.into(),
        }),
    )
}

fn parse_address(raw: &str) -> Result<String, ApiError> {
    normalize_address(raw).map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))
}

/// Chains to report for `address`: the requested one, or every chain the
/// wallet is subscribed on.
fn chains_for(state: &AppState, address: &str, chain: Option<&str>) -> Result<Vec<String>, ApiError> {
    if let Some(chain) = chain {
        let chain = chain.trim().to_ascii_lowercase();
        if chain.is_empty() {
            return Err(api_error(StatusCode::BAD_REQUEST, "Empty chain parameter"));
        }
        return Ok(vec![chain]);
    }
    state
        .registry
        .get(address)
        .map(|sub| sub.chains.into_iter().collect())
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Wallet {} is not tracked", address)))
}

// ============================================================
// Health
// ============================================================

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now(),
        feed: state.feed.as_ref().map(|rx| *rx.borrow()),
        monitored_wallets: state.registry.len(),
        snapshot_accounts: state.snapshots.len().await,
    })
}

// ============================================================
// Wallets
// ============================================================

pub async fn list_wallets(State(state): State<Arc<AppState>>) -> Json<WalletsResponse> {
    let wallets: Vec<WalletSummary> = state
        .registry
        .list_active()
        .into_iter()
        .map(|sub| WalletSummary {
            address: sub.address,
            chains: sub.chains,
        })
        .collect();

    Json(WalletsResponse {
        count: wallets.len(),
        wallets,
    })
}

pub async fn wallet_snapshots(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<SnapshotsResponse> {
    let address = parse_address(&address)?;
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);

    let mut chains = Vec::new();
    for chain in chains_for(&state, &address, params.chain.as_deref())? {
        let key = SnapshotKey::new(&address, &chain);
        if let Some(snapshots) = state.snapshots.history(&key, limit).await {
            chains.push(ChainSnapshots { chain, snapshots });
        }
    }

    if chains.is_empty() {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("No snapshots recorded for {}", address),
        ));
    }
    Ok(Json(SnapshotsResponse { address, chains }))
}

pub async fn wallet_changes(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<ChangesResponse> {
    let address = parse_address(&address)?;
    let limit = params.limit.unwrap_or(DEFAULT_TIMELINE_LIMIT);

    let mut chains = Vec::new();
    for chain in chains_for(&state, &address, params.chain.as_deref())? {
        let key = SnapshotKey::new(&address, &chain);
        if let Some(changes) = state.snapshots.timeline(&key, limit).await {
            chains.push(ChainChanges { chain, changes });
        }
    }

    if chains.is_empty() {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("No snapshots recorded for {}", address),
        ));
    }
    Ok(Json(ChangesResponse { address, chains }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::history::SnapshotBook;
    use crate::snapshot::types::Snapshot;
    use crate::wallet::registry::SubscriptionRegistry;

    const WALLET: &str = "0x00000000000000000000000000000000000000aa";

    fn state() -> Arc<AppState> {
        let registry = Arc::new(SubscriptionRegistry::new());
        registry.add(WALLET, ["ethereum", "base"]);
        Arc::new(AppState {
            registry,
            snapshots: Arc::new(SnapshotBook::new(DEFAULT_HISTORY_LIMIT)),
            feed: None,
        })
    }

    fn snapshot(key: &SnapshotKey, balance: &str) -> Snapshot {
        let mut snap = Snapshot::empty(key);
        snap.balance = Some(balance.to_string());
        snap
    }

    #[tokio::test]
    async fn test_health_reports_wallets() {
        let Json(body) = health(State(state())).await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.monitored_wallets, 1);
        assert!(body.feed.is_none());
    }

    #[tokio::test]
    async fn test_snapshots_for_subscribed_chains() {
        let state = state();
        let key = SnapshotKey::new(WALLET, "ethereum");
        state.snapshots.observe(&key, snapshot(&key, "1")).await;
        state.snapshots.observe(&key, snapshot(&key, "2")).await;

        let Json(body) = wallet_snapshots(
            State(state),
            Path(WALLET.to_uppercase().replace("0X", "0x")),
            Query(HistoryParams::default()),
        )
        .await
        .unwrap();

        assert_eq!(body.address, WALLET);
        assert_eq!(body.chains.len(), 1);
        assert_eq!(body.chains[0].chain, "ethereum");
        assert_eq!(body.chains[0].snapshots.len(), 2);
    }

    #[tokio::test]
    async fn test_changes_timeline() {
        let state = state();
        let key = SnapshotKey::new(WALLET, "base");
        state.snapshots.observe(&key, snapshot(&key, "10")).await;
        state.snapshots.observe(&key, snapshot(&key, "15")).await;

        let Json(body) = wallet_changes(
            State(state),
            Path(WALLET.to_string()),
            Query(HistoryParams {
                chain: Some("BASE".to_string()),
                limit: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(body.chains[0].changes.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_and_invalid_wallets() {
        let other = "0x00000000000000000000000000000000000000bb";
        let err = wallet_changes(State(state()), Path(other.to_string()), Query(HistoryParams::default()))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);

        let err = wallet_snapshots(State(state()), Path("0x123".to_string()), Query(HistoryParams::default()))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }
}
