use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Highest score a transaction can carry.
pub const MAX_RISK_SCORE: u8 = 10;

/// Tags produced by risk rules when they fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlag {
    HighValueTransfer,
    SuspiciousContract,
    LargeApproval,
    UnusualFrequency,
    SandwichAttack,
}

impl RiskFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighValueTransfer => "high_value_transfer",
            Self::SuspiciousContract => "suspicious_contract",
            Self::LargeApproval => "large_approval",
            Self::UnusualFrequency => "unusual_frequency",
            Self::SandwichAttack => "sandwich_attack",
        }
    }
}

/// Outcome of scoring one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAnalysis {
    /// Clamped to `0..=MAX_RISK_SCORE`.
    pub score: u8,
    /// Flags in rule evaluation order.
    pub flags: Vec<RiskFlag>,
    pub confidence: f64,
    pub reasoning: String,
    pub checked_at: DateTime<Utc>,
}

impl RiskAnalysis {
    pub fn has_flag(&self, flag: RiskFlag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn flag_names(&self) -> Vec<&'static str> {
        self.flags.iter().map(|f| f.as_str()).collect()
    }
}

/// A single rule's contribution.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleHit {
    pub flag: RiskFlag,
    pub points: u32,
    pub reason: String,
}

/// Facts gathered from collaborators before the rules run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoringContext {
    /// Recipient is on the deny-list.
    pub recipient_malicious: bool,
    /// Transactions recorded for the owning wallet inside the frequency window.
    pub recent_transactions: i64,
    /// Other `defi` transactions on the same chain and block.
    pub defi_block_siblings: i64,
}
