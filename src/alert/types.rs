use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    HighValueTransfer,
    SuspiciousContract,
    UnusualFrequency,
    PotentialScam,
    LargeApproval,
    DrainingPattern,
    SandwichAttack,
    FlashLoan,
    MixerInteraction,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighValueTransfer => "high_value_transfer",
            Self::SuspiciousContract => "suspicious_contract",
            Self::UnusualFrequency => "unusual_frequency",
            Self::PotentialScam => "potential_scam",
            Self::LargeApproval => "large_approval",
            Self::DrainingPattern => "draining_pattern",
            Self::SandwichAttack => "sandwich_attack",
            Self::FlashLoan => "flash_loan",
            Self::MixerInteraction => "mixer_interaction",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn from_score(score: u8) -> Self {
        match score {
            8.. => Self::Critical,
            6..=7 => Self::High,
            4..=5 => Self::Medium,
            _ => Self::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertActionKind {
    Dismissed,
    Investigated,
    Escalated,
    Whitelisted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertAction {
    #[serde(rename = "type")]
    pub kind: AlertActionKind,
    pub timestamp: DateTime<Utc>,
    pub note: Option<String>,
}

/// An alert raised for a tracked wallet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    /// Assigned by the store on insert.
    pub id: Option<i64>,
    pub wallet_id: i64,
    pub transaction_hash: Option<String>,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub metadata: JsonValue,
    pub is_read: bool,
    pub is_resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub actions: Vec<AlertAction>,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn mark_read(&mut self) {
        self.is_read = true;
    }

    /// Append to the action log. Dismissing or whitelisting resolves the alert.
    pub fn record_action(&mut self, kind: AlertActionKind, note: Option<String>) {
        let now = Utc::now();
        self.actions.push(AlertAction {
            kind,
            timestamp: now,
            note,
        });
        if matches!(kind, AlertActionKind::Dismissed | AlertActionKind::Whitelisted) && !self.is_resolved {
            self.is_resolved = true;
            self.resolved_at = Some(now);
        }
    }
}
