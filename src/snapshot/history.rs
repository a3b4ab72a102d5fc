use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

use super::differ::{diff, SnapshotChange};
use super::types::{Snapshot, SnapshotKey};

pub const DEFAULT_HISTORY_LIMIT: usize = 100;
pub const DEFAULT_TIMELINE_LIMIT: usize = 10;

/// Changes observed between two consecutive snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeSet {
    pub timestamp: DateTime<Utc>,
    pub changes: Vec<SnapshotChange>,
}

/// Bounded oldest-first snapshot history with FIFO eviction.
#[derive(Debug, Clone)]
pub struct SnapshotHistory {
    entries: VecDeque<Snapshot>,
    capacity: usize,
}

impl SnapshotHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_LIMIT)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, snapshot: Snapshot) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(snapshot);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn oldest(&self) -> Option<&Snapshot> {
        self.entries.front()
    }

    /// The newest `limit` snapshots, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<Snapshot> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Diff consecutive snapshots oldest-first, returning up to `limit` non-empty change sets.
    pub fn change_timeline(&self, limit: usize) -> Vec<ChangeSet> {
        let mut timeline = Vec::new();
        for (prev, next) in self.entries.iter().zip(self.entries.iter().skip(1)) {
            if timeline.len() >= limit {
                break;
            }
            let changes = diff(prev, next);
            if !changes.is_empty() {
                timeline.push(ChangeSet {
                    timestamp: next.taken_at,
                    changes,
                });
            }
        }
        timeline
    }
}

/// What `SnapshotBook::observe` did with a new snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// First snapshot for the account; stored as the baseline.
    Baseline,
    /// Nothing changed and nothing new was learned.
    Unchanged,
    /// No changes, but fields missing from the current snapshot are now present.
    /// The current snapshot is replaced; history is not appended.
    Refreshed,
    /// Current snapshot replaced and appended to history.
    Changed(Vec<SnapshotChange>),
}

struct AccountSnapshots {
    current: Snapshot,
    history: SnapshotHistory,
}

/// Current snapshot and bounded history for every polled (wallet, chain) pair.
pub struct SnapshotBook {
    capacity: usize,
    accounts: RwLock<HashMap<SnapshotKey, AccountSnapshots>>,
}

impl SnapshotBook {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            accounts: RwLock::new(HashMap::new()),
        }
    }

    /// Compare `snapshot` with the account's current one and record it.
    pub async fn observe(&self, key: &SnapshotKey, snapshot: Snapshot) -> Observation {
        let mut accounts = self.accounts.write().await;

        let Some(account) = accounts.get_mut(key) else {
            let mut history = SnapshotHistory::new(self.capacity);
            history.push(snapshot.clone());
            accounts.insert(
                key.clone(),
                AccountSnapshots {
                    current: snapshot,
                    history,
                },
            );
            return Observation::Baseline;
        };

        // A failed fetch keeps the field's last value so the next diff still sees it.
        let fills_gaps = snapshot.fills_gaps_of(&account.current);
        let mut merged = snapshot;
        merged.backfill_from(&account.current);

        let changes = diff(&account.current, &merged);
        if !changes.is_empty() {
            account.history.push(merged.clone());
            account.current = merged;
            return Observation::Changed(changes);
        }

        if fills_gaps {
            account.current = merged;
            return Observation::Refreshed;
        }

        Observation::Unchanged
    }

    pub async fn current(&self, key: &SnapshotKey) -> Option<Snapshot> {
        let accounts = self.accounts.read().await;
        accounts.get(key).map(|a| a.current.clone())
    }

    pub async fn history(&self, key: &SnapshotKey, limit: usize) -> Option<Vec<Snapshot>> {
        let accounts = self.accounts.read().await;
        accounts.get(key).map(|a| a.history.recent(limit))
    }

    pub async fn timeline(&self, key: &SnapshotKey, limit: usize) -> Option<Vec<ChangeSet>> {
        let accounts = self.accounts.read().await;
        accounts.get(key).map(|a| a.history.change_timeline(limit))
    }

    /// Drop every account of a wallet that is no longer tracked.
    pub async fn forget(&self, address: &str) -> usize {
        let mut accounts = self.accounts.write().await;
        let before = accounts.len();
        accounts.retain(|key, _| key.address != address);
        before - accounts.len()
    }

    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SnapshotKey {
        SnapshotKey::new("0xabc", "ethereum")
    }

    fn with_balance(balance: &str) -> Snapshot {
        let mut s = Snapshot::empty(&key());
        s.balance = Some(balance.to_string());
        s
    }

    #[test]
    fn test_history_caps_at_capacity() {
        let mut history = SnapshotHistory::new(DEFAULT_HISTORY_LIMIT);
        for i in 0..=DEFAULT_HISTORY_LIMIT {
            history.push(with_balance(&i.to_string()));
        }
        assert_eq!(history.len(), DEFAULT_HISTORY_LIMIT);
        assert_eq!(history.oldest().unwrap().balance.as_deref(), Some("1"));
    }

    #[test]
    fn test_recent_is_oldest_first() {
        let mut history = SnapshotHistory::new(10);
        for b in ["1", "2", "3"] {
            history.push(with_balance(b));
        }
        let recent: Vec<_> = history
            .recent(2)
            .into_iter()
            .filter_map(|s| s.balance)
            .collect();
        assert_eq!(recent, vec!["2", "3"]);
    }

    #[test]
    fn test_timeline_skips_quiet_pairs_and_honors_limit() {
        let mut history = SnapshotHistory::new(10);
        for b in ["1", "1", "2", "3", "4"] {
            history.push(with_balance(b));
        }
        let timeline = history.change_timeline(DEFAULT_TIMELINE_LIMIT);
        assert_eq!(timeline.len(), 3);
        assert_eq!(history.change_timeline(2).len(), 2);
    }

    fn with_transactions(hashes: &[&str]) -> Snapshot {
        let mut s = Snapshot::empty(&key());
        s.recent_transactions = Some(
            hashes
                .iter()
                .map(|h| serde_json::from_value(serde_json::json!({ "hash": h })).unwrap())
                .collect(),
        );
        s
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_field() {
        let book = SnapshotBook::new(DEFAULT_HISTORY_LIMIT);

        // Balance fails on the first poll, transactions on the second.
        let first = with_transactions(&["0xa", "0xb"]);
        assert_eq!(book.observe(&key(), first).await, Observation::Baseline);
        assert_eq!(book.observe(&key(), with_balance("10")).await, Observation::Refreshed);

        let current = book.current(&key()).await.unwrap();
        assert_eq!(current.balance.as_deref(), Some("10"));
        assert_eq!(current.recent_transactions.map(|t| t.len()), Some(2));

        let mut third = with_transactions(&["0xc", "0xa", "0xb"]);
        third.balance = Some("10".to_string());
        match book.observe(&key(), third).await {
            Observation::Changed(changes) => match &changes[..] {
                [SnapshotChange::NewTransactions { count, transactions }] => {
                    assert_eq!(*count, 1);
                    assert_eq!(transactions[0].hash, "0xc");
                }
                other => panic!("unexpected changes {:?}", other),
            },
            other => panic!("unexpected observation {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_change_with_failed_field_keeps_previous_field() {
        let book = SnapshotBook::new(DEFAULT_HISTORY_LIMIT);

        let mut first = with_transactions(&["0xa"]);
        first.balance = Some("10".to_string());
        book.observe(&key(), first).await;

        // Balance moves while the transaction fetch fails.
        assert!(matches!(
            book.observe(&key(), with_balance("20")).await,
            Observation::Changed(_)
        ));
        let current = book.current(&key()).await.unwrap();
        assert_eq!(current.recent_transactions.map(|t| t.len()), Some(1));

        let mut third = with_transactions(&["0xd", "0xa"]);
        third.balance = Some("20".to_string());
        match book.observe(&key(), third).await {
            Observation::Changed(changes) => assert_eq!(changes.len(), 1),
            other => panic!("unexpected observation {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_observe_lifecycle() {
        let book = SnapshotBook::new(DEFAULT_HISTORY_LIMIT);

        assert_eq!(book.observe(&key(), Snapshot::empty(&key())).await, Observation::Baseline);
        assert_eq!(book.observe(&key(), Snapshot::empty(&key())).await, Observation::Unchanged);

        assert_eq!(book.observe(&key(), with_balance("10")).await, Observation::Refreshed);
        assert_eq!(book.history(&key(), 100).await.unwrap().len(), 1);

        match book.observe(&key(), with_balance("25")).await {
            Observation::Changed(changes) => assert_eq!(changes.len(), 1),
            other => panic!("unexpected observation {:?}", other),
        }
        assert_eq!(book.history(&key(), 100).await.unwrap().len(), 2);
        assert_eq!(
            book.current(&key()).await.unwrap().balance.as_deref(),
            Some("25")
        );

        assert_eq!(book.forget("0xabc").await, 1);
        assert!(book.current(&key()).await.is_none());
    }
}
