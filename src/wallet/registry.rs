use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock};

/// One wallet's live subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub address: String,
    pub chains: BTreeSet<String>,
}

/// In-memory map of active wallets to the chains they are watched on.
///
/// This is what the feed connector replays after every reconnect and what the
/// poll scheduler walks each cycle. A single lock serializes mutations, so
/// add/remove on the same wallet never interleave.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: RwLock<BTreeMap<String, BTreeSet<String>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `chains` into the wallet's subscription (set union) and return the result.
    pub fn add<I, S>(&self, address: &str, chains: I) -> Subscription
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.entry(address.to_string()).or_default();
        entry.extend(chains.into_iter().map(|c| c.as_ref().to_string()));

        Subscription {
            address: address.to_string(),
            chains: entry.clone(),
        }
    }

    /// Drop the wallet's subscription. Stored history is untouched.
    pub fn remove(&self, address: &str) -> Option<Subscription> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(address).map(|chains| Subscription {
            address: address.to_string(),
            chains,
        })
    }

    pub fn get(&self, address: &str) -> Option<Subscription> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(address).map(|chains| Subscription {
            address: address.to_string(),
            chains: chains.clone(),
        })
    }

    pub fn contains(&self, address: &str) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.contains_key(address)
    }

    /// All active subscriptions, ordered by address.
    pub fn list_active(&self) -> Vec<Subscription> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .map(|(address, chains)| Subscription {
                address: address.clone(),
                chains: chains.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
