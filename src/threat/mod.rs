pub mod deny_list;

use async_trait::async_trait;

/// Address reputation lookup used by the risk scorer.
#[async_trait]
pub trait ThreatIntel: Send + Sync {
    /// `address` is lower-case `0x` hex.
    async fn is_known_malicious(&self, address: &str) -> eyre::Result<bool>;
}
