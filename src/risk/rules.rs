use alloy::primitives::U256;
use std::str::FromStr;

use crate::config::RiskConfig;
use crate::ingest::types::TransactionRecord;

use super::types::{RiskFlag, RuleHit, ScoringContext};

/// A single independent risk check.
pub trait RiskRule: Send + Sync {
    fn flag(&self) -> RiskFlag;

    /// Returns the rule's contribution when it fires.
    fn evaluate(&self, tx: &TransactionRecord, ctx: &ScoringContext) -> Option<RuleHit>;
}

/// Build the rule list in evaluation order.
pub fn default_rules(config: &RiskConfig) -> Vec<Box<dyn RiskRule>> {
    vec![
        Box::new(HighValueTransfer {
            threshold_usd: config.high_value_usd,
        }),
        Box::new(MaliciousContract),
        Box::new(UnlimitedApproval),
        Box::new(UnusualFrequency {
            max_transactions: config.max_transactions_per_window,
            window_secs: config.frequency_window_secs,
        }),
        Box::new(SandwichPattern {
            min_siblings: config.sandwich_min_siblings,
        }),
    ]
}

/// USD value above the configured threshold.
pub struct HighValueTransfer {
    pub threshold_usd: f64,
}

impl RiskRule for HighValueTransfer {
    fn flag(&self) -> RiskFlag {
        RiskFlag::HighValueTransfer
    }

    fn evaluate(&self, tx: &TransactionRecord, _ctx: &ScoringContext) -> Option<RuleHit> {
        if tx.value_usd > self.threshold_usd {
            return Some(RuleHit {
                flag: self.flag(),
                points: 3,
                reason: format!("High value transfer: ${:.2}", tx.value_usd),
            });
        }
        None
    }
}

/// Recipient is a known malicious contract.
pub struct MaliciousContract;

impl RiskRule for MaliciousContract {
    fn flag(&self) -> RiskFlag {
        RiskFlag::SuspiciousContract
    }

    fn evaluate(&self, _tx: &TransactionRecord, ctx: &ScoringContext) -> Option<RuleHit> {
        ctx.recipient_malicious.then(|| RuleHit {
            flag: self.flag(),
            points: 8,
            reason: "Interaction with known malicious contract".to_string(),
        })
    }
}

/// An attached transfer moves exactly `type(uint256).max`, the unlimited-approval sentinel.
pub struct UnlimitedApproval;

impl RiskRule for UnlimitedApproval {
    fn flag(&self) -> RiskFlag {
        RiskFlag::LargeApproval
    }

    fn evaluate(&self, tx: &TransactionRecord, _ctx: &ScoringContext) -> Option<RuleHit> {
        let unlimited = tx
            .token_transfers
            .iter()
            .filter_map(|t| t.value.as_deref())
            .any(is_max_uint256);

        unlimited.then(|| RuleHit {
            flag: self.flag(),
            points: 5,
            reason: "Unlimited token approval detected".to_string(),
        })
    }
}

fn is_max_uint256(raw: &str) -> bool {
    U256::from_str(raw.trim()).is_ok_and(|v| v == U256::MAX)
}

/// Too many transactions for the wallet inside the trailing window.
pub struct UnusualFrequency {
    pub max_transactions: i64,
    pub window_secs: u64,
}

impl RiskRule for UnusualFrequency {
    fn flag(&self) -> RiskFlag {
        RiskFlag::UnusualFrequency
    }

    fn evaluate(&self, _tx: &TransactionRecord, ctx: &ScoringContext) -> Option<RuleHit> {
        if ctx.recent_transactions > self.max_transactions {
            return Some(RuleHit {
                flag: self.flag(),
                points: 2,
                reason: format!(
                    "Unusual activity: {} transactions in the last {} minutes",
                    ctx.recent_transactions,
                    self.window_secs / 60
                ),
            });
        }
        None
    }
}

/// Crowded same-block DeFi activity. Coarse: no direction or price check.
pub struct SandwichPattern {
    pub min_siblings: i64,
}

impl RiskRule for SandwichPattern {
    fn flag(&self) -> RiskFlag {
        RiskFlag::SandwichAttack
    }

    fn evaluate(&self, _tx: &TransactionRecord, ctx: &ScoringContext) -> Option<RuleHit> {
        if ctx.defi_block_siblings > self.min_siblings {
            return Some(RuleHit {
                flag: self.flag(),
                points: 6,
                reason: format!(
                    "Potential sandwich attack: {} other DeFi transactions in the same block",
                    ctx.defi_block_siblings
                ),
            });
        }
        None
    }
}
