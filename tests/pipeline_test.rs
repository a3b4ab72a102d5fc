use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use wallet_sentinel::alert::notify::NotificationSink;
use wallet_sentinel::alert::types::{Alert, AlertType, Severity};
use wallet_sentinel::config::{Config, PollConfig, RiskConfig};
use wallet_sentinel::db::memory::MemoryStore;
use wallet_sentinel::db::Store;
use wallet_sentinel::ingest::types::{IncomingTransaction, TransactionType, TransferEvent};
use wallet_sentinel::pipeline::{IngestOutcome, IngestPipeline, Origin};
use wallet_sentinel::service::{Collaborators, MonitorService};
use wallet_sentinel::snapshot::fetcher::SnapshotSource;
use wallet_sentinel::snapshot::history::SnapshotBook;
use wallet_sentinel::snapshot::scheduler::PollScheduler;
use wallet_sentinel::snapshot::types::SnapshotKey;
use wallet_sentinel::threat::ThreatIntel;
use wallet_sentinel::wallet::registry::SubscriptionRegistry;
use wallet_sentinel::wallet::types::normalize_chains;

const WALLET: &str = "0x00000000000000000000000000000000000000aa";
const COUNTERPARTY: &str = "0x00000000000000000000000000000000000000cc";
const DRAINER: &str = "0x00000000000000000000000000000000000000dd";
const TOKEN: &str = "0x00000000000000000000000000000000000000ee";
const MAX_UINT256: &str =
    "115792089237316195423570985008687907853269984665640564039457584007913129639935";

// ============================================================
// Fakes
// ============================================================

struct StaticThreats(HashSet<String>);

#[async_trait]
impl ThreatIntel for StaticThreats {
    async fn is_known_malicious(&self, address: &str) -> eyre::Result<bool> {
        Ok(self.0.contains(address))
    }
}

#[derive(Default)]
/// Threat intelligence whose lookups always fail.
struct UnreachableThreats;

#[async_trait]
impl ThreatIntel for UnreachableThreats {
    async fn is_known_malicious(&self, _address: &str) -> eyre::Result<bool> {
        Err(eyre::eyre!("threat feed timed out"))
    }
}

#[derive(Default)]
struct RecordingSink {
    delivered: Mutex<Vec<Alert>>,
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, alert: &Alert) -> eyre::Result<()> {
        self.delivered.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

struct FailingSink;

#[async_trait]
impl NotificationSink for FailingSink {
    async fn deliver(&self, _alert: &Alert) -> eyre::Result<()> {
        Err(eyre::eyre!("webhook unreachable"))
    }
}

/// Snapshot source whose balance, transaction and transfer lists the test mutates.
#[derive(Default)]
struct ScriptedSource {
    balance: Mutex<String>,
    transactions: Mutex<Vec<IncomingTransaction>>,
    transfers: Mutex<Vec<TransferEvent>>,
}

#[async_trait]
impl SnapshotSource for ScriptedSource {
    async fn native_balance(&self, _chain: &str, _address: &str) -> eyre::Result<String> {
        Ok(self.balance.lock().unwrap().clone())
    }

    async fn tokens(&self, _chain: &str, _address: &str) -> eyre::Result<JsonValue> {
        Ok(json!({ "items": [] }))
    }

    async fn transactions(
        &self,
        _chain: &str,
        _address: &str,
    ) -> eyre::Result<Vec<IncomingTransaction>> {
        Ok(self.transactions.lock().unwrap().clone())
    }

    async fn token_transfers(&self, _chain: &str, _address: &str) -> eyre::Result<Vec<TransferEvent>> {
        Ok(self.transfers.lock().unwrap().clone())
    }

    async fn nfts(&self, _chain: &str, _address: &str) -> eyre::Result<JsonValue> {
        Err(eyre::eyre!("nft endpoint down"))
    }

    async fn account_stats(&self, _chain: &str, _address: &str) -> eyre::Result<JsonValue> {
        Ok(json!({ "transactionCount": 1 }))
    }
}

// ============================================================
// Helpers
// ============================================================

fn transaction(hash: &str, from: &str, to: &str, value_usd: f64) -> IncomingTransaction {
    serde_json::from_value(json!({
        "chain": "ethereum",
        "hash": hash,
        "blockNumber": 19_000_000,
        "timestamp": 1_700_000_000,
        "from": from,
        "to": to,
        "value": "1000000000000000000",
        "valueUSD": value_usd
    }))
    .unwrap()
}

/// A `token_transfer` feed payload moving `value` of TOKEN out of the wallet.
fn token_transfer(hash: &str, block_number: Option<i64>, value: &str) -> TransferEvent {
    let mut payload = json!({
        "chain": "ethereum",
        "hash": hash,
        "timestamp": 1_700_000_000,
        "from": WALLET,
        "to": COUNTERPARTY,
        "value": value,
        "contractAddress": TOKEN,
        "symbol": "TKN"
    });
    if let Some(block) = block_number {
        payload["blockNumber"] = json!(block);
    }
    serde_json::from_value(payload).unwrap()
}

async fn tracked_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .upsert_wallet(WALLET, &normalize_chains(["ethereum"]))
        .await
        .unwrap();
    store
}

fn pipeline_with(
    store: Arc<MemoryStore>,
    malicious: &[&str],
    sink: Arc<dyn NotificationSink>,
) -> IngestPipeline {
    let threats = StaticThreats(malicious.iter().map(|a| a.to_string()).collect());
    IngestPipeline::new(&RiskConfig::default(), store, Arc::new(threats), sink)
}

// ============================================================
// Ingestion
// ============================================================

#[tokio::test]
async fn test_same_hash_twice_persists_once() {
    let store = tracked_store().await;
    let pipeline = pipeline_with(store.clone(), &[], Arc::new(RecordingSink::default()));

    let first = pipeline
        .ingest(transaction("0xabc", WALLET, COUNTERPARTY, 10.0), &Origin::Stream)
        .await
        .unwrap();
    let second = pipeline
        .ingest(transaction("0xABC", WALLET, COUNTERPARTY, 10.0), &Origin::Stream)
        .await
        .unwrap();

    assert!(matches!(first, IngestOutcome::Accepted { .. }));
    assert_eq!(second, IngestOutcome::Duplicate);
    assert_eq!(store.transaction_count().await, 1);
    assert_eq!(store.wallet(WALLET).await.unwrap().stats.total_transactions, 1);
}

#[tokio::test]
async fn test_concurrent_duplicates_persist_once() {
    let store = tracked_store().await;
    let pipeline = Arc::new(pipeline_with(
        store.clone(),
        &[],
        Arc::new(RecordingSink::default()),
    ));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move {
            pipeline
                .ingest(transaction("0xrace", COUNTERPARTY, WALLET, 5.0), &Origin::Stream)
                .await
                .unwrap()
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        if let IngestOutcome::Accepted { .. } = handle.await.unwrap() {
            accepted += 1;
        }
    }

    assert_eq!(accepted, 1);
    assert_eq!(store.transaction_count().await, 1);
    let stats = store.wallet(WALLET).await.unwrap().stats;
    assert_eq!(stats.total_transactions, 1);
    assert!((stats.total_value_usd - 5.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_unowned_event_is_ignored() {
    let store = tracked_store().await;
    let pipeline = pipeline_with(store.clone(), &[], Arc::new(RecordingSink::default()));

    let outcome = pipeline
        .ingest(transaction("0x1", COUNTERPARTY, DRAINER, 1.0), &Origin::Stream)
        .await
        .unwrap();

    assert_eq!(outcome, IngestOutcome::Unowned);
    assert_eq!(store.transaction_count().await, 0);
}

#[tokio::test]
async fn test_high_value_alone_stays_below_alert_threshold() {
    let store = tracked_store().await;
    let sink = Arc::new(RecordingSink::default());
    let pipeline = pipeline_with(store.clone(), &[], sink.clone());

    let outcome = pipeline
        .ingest(transaction("0xbig", WALLET, COUNTERPARTY, 60_000.0), &Origin::Stream)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        IngestOutcome::Accepted {
            risk_score: Some(3),
            alert_raised: false
        }
    );
    let record = store.transaction("0xbig").await.unwrap();
    let analysis = record.risk_analysis.unwrap();
    assert_eq!(analysis.score, 3);
    assert_eq!(analysis.flag_names(), vec!["high_value_transfer"]);
    assert!(store.alerts().await.is_empty());
    assert!(sink.delivered.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_malicious_recipient_raises_critical_alert() {
    let store = tracked_store().await;
    let sink = Arc::new(RecordingSink::default());
    let pipeline = pipeline_with(store.clone(), &[DRAINER], sink.clone());

    let outcome = pipeline
        .ingest(transaction("0xbad", WALLET, DRAINER, 60_000.0), &Origin::Stream)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        IngestOutcome::Accepted {
            risk_score: Some(10),
            alert_raised: true
        }
    );

    let alerts = store.alerts().await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, AlertType::SuspiciousContract);
    assert_eq!(alerts[0].severity, Severity::Critical);
    assert_eq!(alerts[0].transaction_hash.as_deref(), Some("0xbad"));
    assert_eq!(alerts[0].metadata["riskScore"], 10);

    let delivered = sink.delivered.lock().unwrap();
    assert_eq!(delivered.len(), 1);
    assert!(delivered[0].id.is_some());
}

#[tokio::test]
async fn test_failing_sink_keeps_alert() {
    let store = tracked_store().await;
    let pipeline = pipeline_with(store.clone(), &[DRAINER], Arc::new(FailingSink));

    let outcome = pipeline
        .ingest(transaction("0xbad", WALLET, DRAINER, 0.0), &Origin::Stream)
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        IngestOutcome::Accepted {
            alert_raised: true,
            ..
        }
    ));
    assert_eq!(store.alerts().await.len(), 1);
    assert!(store.transaction("0xbad").await.is_some());
}

#[tokio::test]
async fn test_threat_lookup_failure_keeps_transaction_unscored() {
    let store = tracked_store().await;
    let sink = Arc::new(RecordingSink::default());
    let pipeline = IngestPipeline::new(
        &RiskConfig::default(),
        store.clone(),
        Arc::new(UnreachableThreats),
        sink.clone(),
    );

    let outcome = pipeline
        .ingest(transaction("0xdark", WALLET, DRAINER, 60_000.0), &Origin::Stream)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        IngestOutcome::Accepted {
            risk_score: None,
            alert_raised: false
        }
    );
    assert_eq!(store.transaction_count().await, 1);
    assert!(store.transaction("0xdark").await.unwrap().risk_analysis.is_none());
    assert_eq!(store.wallet(WALLET).await.unwrap().stats.total_transactions, 1);
    assert!(store.alerts().await.is_empty());
    assert!(sink.delivered.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_transfers_without_block_number_never_share_a_block() {
    let store = tracked_store().await;
    let sink = Arc::new(RecordingSink::default());
    let pipeline = pipeline_with(store.clone(), &[], sink.clone());

    for i in 0..5 {
        let hash = format!("0xnoblock{}", i);
        let tx = token_transfer(&hash, None, "1000").into_token_transaction();
        let outcome = pipeline.ingest(tx, &Origin::Stream).await.unwrap();
        assert_eq!(
            outcome,
            IngestOutcome::Accepted {
                risk_score: Some(0),
                alert_raised: false
            }
        );
        let record = store.transaction(&hash).await.unwrap();
        assert_eq!(record.block_number, None);
    }
    assert!(store.alerts().await.is_empty());

    // The same burst inside one known block is crowded.
    let mut last = None;
    for i in 0..5 {
        let tx = token_transfer(&format!("0xblock{}", i), Some(77), "1000").into_token_transaction();
        last = Some(pipeline.ingest(tx, &Origin::Stream).await.unwrap());
    }
    assert_eq!(
        last,
        Some(IngestOutcome::Accepted {
            risk_score: Some(6),
            alert_raised: true
        })
    );
    assert_eq!(store.alerts().await.len(), 1);
    assert_eq!(store.alerts().await[0].alert_type, AlertType::SandwichAttack);
}

// ============================================================
// Poll mode
// ============================================================

#[tokio::test]
async fn test_poll_baseline_then_new_transaction_is_ingested() {
    let store = tracked_store().await;
    let pipeline = Arc::new(pipeline_with(
        store.clone(),
        &[],
        Arc::new(RecordingSink::default()),
    ));
    let registry = Arc::new(SubscriptionRegistry::new());
    registry.add(WALLET, ["ethereum"]);
    let source = Arc::new(ScriptedSource::default());
    *source.balance.lock().unwrap() = "1000".to_string();
    source
        .transactions
        .lock()
        .unwrap()
        .push(transaction("0xold", COUNTERPARTY, WALLET, 1.0));
    let book = Arc::new(SnapshotBook::new(100));

    let scheduler = PollScheduler::new(
        &PollConfig::default(),
        registry,
        source.clone(),
        book.clone(),
        pipeline,
    );

    let first = scheduler.poll_cycle().await;
    assert_eq!(first.accounts, 1);
    assert_eq!(first.baselines, 1);
    assert_eq!(first.ingested, 0);
    assert_eq!(store.transaction_count().await, 0);

    *source.balance.lock().unwrap() = "1500".to_string();
    source
        .transactions
        .lock()
        .unwrap()
        .insert(0, transaction("0xnew", WALLET, COUNTERPARTY, 2.0));

    let second = scheduler.poll_cycle().await;
    assert_eq!(second.changed, 1);
    assert_eq!(second.ingested, 1);
    assert_eq!(second.failed, 0);
    assert!(store.transaction("0xnew").await.is_some());
    assert!(store.transaction("0xold").await.is_none());

    let key = SnapshotKey::new(WALLET, "ethereum");
    let timeline = book.timeline(&key, 10).await.unwrap();
    assert_eq!(timeline.len(), 1);

    let third = scheduler.poll_cycle().await;
    assert_eq!(third.changed, 0);
    assert_eq!(third.ingested, 0);
}

#[tokio::test]
async fn test_poll_transfer_listed_with_its_transaction_keeps_approval() {
    let store = tracked_store().await;
    let sink = Arc::new(RecordingSink::default());
    let pipeline = Arc::new(pipeline_with(store.clone(), &[], sink.clone()));
    let registry = Arc::new(SubscriptionRegistry::new());
    registry.add(WALLET, ["ethereum"]);
    let source = Arc::new(ScriptedSource::default());
    *source.balance.lock().unwrap() = "1000".to_string();
    let book = Arc::new(SnapshotBook::new(100));

    let scheduler = PollScheduler::new(
        &PollConfig::default(),
        registry,
        source.clone(),
        book,
        pipeline,
    );
    assert_eq!(scheduler.poll_cycle().await.baselines, 1);

    // The approval shows up in both the transaction and the transfer listing.
    let mut approve = transaction("0xapprove", WALLET, TOKEN, 0.0);
    approve.value = Some("0".to_string());
    approve.method_name = Some("approve".to_string());
    source.transactions.lock().unwrap().push(approve);
    source
        .transfers
        .lock()
        .unwrap()
        .push(token_transfer("0xAPPROVE", Some(19_000_000), MAX_UINT256));

    let cycle = scheduler.poll_cycle().await;
    assert_eq!(cycle.changed, 1);
    assert_eq!(cycle.ingested, 1);
    assert_eq!(cycle.failed, 0);
    assert_eq!(store.transaction_count().await, 1);

    let record = store.transaction("0xapprove").await.unwrap();
    assert_eq!(record.transaction_type, TransactionType::Defi);
    assert_eq!(record.token_transfers.len(), 1);
    let analysis = record.risk_analysis.unwrap();
    assert_eq!(analysis.flag_names(), vec!["large_approval"]);

    let alerts = store.alerts().await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, AlertType::LargeApproval);
    assert_eq!(sink.delivered.lock().unwrap().len(), 1);
}

// ============================================================
// Service lifecycle
// ============================================================

#[tokio::test]
async fn test_service_tracks_and_untracks_wallets() {
    let config: Config = toml::from_str(
        r#"
[feed]
enabled = false

[poll]
enabled = false
"#,
    )
    .unwrap();

    let store = Arc::new(MemoryStore::new());
    store
        .upsert_wallet(COUNTERPARTY, &normalize_chains(["polygon"]))
        .await
        .unwrap();

    let service = MonitorService::init(
        &config,
        Collaborators {
            store: store.clone(),
            threat_intel: Arc::new(StaticThreats(HashSet::new())),
            notifier: Arc::new(RecordingSink::default()),
            snapshot_source: None,
        },
    )
    .await
    .unwrap();

    let registry = service.registry();
    assert!(registry.contains(COUNTERPARTY));
    assert!(service.connection_state().is_none());

    let wallet = service
        .track_wallet(&WALLET.to_uppercase().replace("0X", "0x"), ["Ethereum"])
        .await
        .unwrap();
    assert_eq!(wallet.address, WALLET);
    service.track_wallet(WALLET, ["base"]).await.unwrap();
    let chains: Vec<String> = registry.get(WALLET).unwrap().chains.into_iter().collect();
    assert_eq!(chains, vec!["base", "ethereum"]);

    assert!(service.track_wallet("0x1234", ["ethereum"]).await.is_err());

    assert!(service.untrack_wallet(WALLET).await.unwrap());
    assert!(!registry.contains(WALLET));
    assert!(!store.wallet(WALLET).await.unwrap().is_active);
    assert!(!service.untrack_wallet(WALLET).await.unwrap());

    service.shutdown().await;
}
