use std::sync::Arc;

use crate::db::Store;
use crate::ingest::types::TransactionRecord;

/// Maintains per-wallet running totals. The store applies each increment as one
/// atomic update, so concurrent records for the same wallet never lose a count.
pub struct WalletStatsAggregator {
    store: Arc<dyn Store>,
}

impl WalletStatsAggregator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Account for one accepted (post-dedup) transaction.
    pub async fn record(&self, tx: &TransactionRecord) -> eyre::Result<()> {
        self.store
            .increment_wallet_stats(tx.wallet_id, tx.value_usd, tx.block_timestamp)
            .await
    }
}
