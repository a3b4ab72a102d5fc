use std::sync::Arc;

use crate::config::RiskConfig;
use crate::db::Store;
use crate::ingest::types::{TransactionRecord, TransactionType};
use crate::threat::ThreatIntel;

use super::rules::{default_rules, RiskRule};
use super::types::{RiskAnalysis, RuleHit, ScoringContext, MAX_RISK_SCORE};

/// An ordered list of rules and the additive aggregation over them.
pub struct RuleSet {
    rules: Vec<Box<dyn RiskRule>>,
}

impl RuleSet {
    pub fn new(rules: Vec<Box<dyn RiskRule>>) -> Self {
        Self { rules }
    }

    pub fn from_config(config: &RiskConfig) -> Self {
        Self::new(default_rules(config))
    }

    /// Run every rule and fold the hits into an analysis. Pure.
    pub fn evaluate(&self, tx: &TransactionRecord, ctx: &ScoringContext) -> RiskAnalysis {
        let hits: Vec<RuleHit> = self
            .rules
            .iter()
            .filter_map(|rule| rule.evaluate(tx, ctx))
            .collect();

        let raw_score: u32 = hits.iter().map(|h| h.points).sum();
        let score = raw_score.min(MAX_RISK_SCORE as u32) as u8;

        let bonus = if raw_score > 5 { 0.3 } else { 0.0 };
        let confidence = (0.2 * hits.len() as f64 + bonus).min(1.0);

        let reasoning = hits
            .iter()
            .map(|h| h.reason.as_str())
            .collect::<Vec<_>>()
            .join("; ");

        RiskAnalysis {
            score,
            flags: hits.iter().map(|h| h.flag).collect(),
            confidence,
            reasoning,
            checked_at: chrono::Utc::now(),
        }
    }
}

/// Scores persisted transactions: gathers context from the store and the
/// threat-intelligence lookup, then evaluates the rule set.
pub struct RiskScorer {
    rules: RuleSet,
    frequency_window: chrono::Duration,
    store: Arc<dyn Store>,
    threat_intel: Arc<dyn ThreatIntel>,
}

impl RiskScorer {
    pub fn new(config: &RiskConfig, store: Arc<dyn Store>, threat_intel: Arc<dyn ThreatIntel>) -> Self {
        Self {
            rules: RuleSet::from_config(config),
            frequency_window: chrono::Duration::seconds(config.frequency_window_secs as i64),
            store,
            threat_intel,
        }
    }

    pub async fn analyze(&self, tx: &TransactionRecord) -> eyre::Result<RiskAnalysis> {
        let ctx = self.gather_context(tx).await?;
        Ok(self.rules.evaluate(tx, &ctx))
    }

    pub async fn gather_context(&self, tx: &TransactionRecord) -> eyre::Result<ScoringContext> {
        let since = chrono::Utc::now() - self.frequency_window;

        let recipient_check = async {
            match tx.to_address.as_deref() {
                Some(to) => self.threat_intel.is_known_malicious(to).await,
                None => Ok(false),
            }
        };

        // Without a block number there is no block to share.
        let block_siblings = async {
            match tx.block_number {
                Some(block_number) => {
                    self.store
                        .count_block_transactions(
                            &tx.chain,
                            block_number,
                            TransactionType::Defi,
                            &tx.hash,
                        )
                        .await
                }
                None => Ok(0),
            }
        };

        let (recipient_malicious, recent_transactions, defi_block_siblings) = tokio::try_join!(
            recipient_check,
            self.store.count_recent_transactions(tx.wallet_id, since),
            block_siblings,
        )?;

        Ok(ScoringContext {
            recipient_malicious,
            recent_transactions,
            defi_block_siblings,
        })
    }
}
