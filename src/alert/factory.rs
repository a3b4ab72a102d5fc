use chrono::Utc;
use std::sync::Arc;

use crate::db::Store;
use crate::ingest::types::TransactionRecord;
use crate::risk::types::{RiskAnalysis, RiskFlag};

use super::notify::NotificationSink;
use super::types::{Alert, AlertType, Severity};

/// Flag precedence when choosing a single alert type.
const TYPE_PRIORITY: [(RiskFlag, AlertType); 4] = [
    (RiskFlag::SuspiciousContract, AlertType::SuspiciousContract),
    (RiskFlag::LargeApproval, AlertType::LargeApproval),
    (RiskFlag::HighValueTransfer, AlertType::HighValueTransfer),
    (RiskFlag::SandwichAttack, AlertType::SandwichAttack),
];

/// Pick the alert type for a set of flags.
pub fn select_alert_type(flags: &[RiskFlag]) -> AlertType {
    TYPE_PRIORITY
        .iter()
        .find(|(flag, _)| flags.contains(flag))
        .map(|(_, alert_type)| *alert_type)
        .unwrap_or(AlertType::UnusualFrequency)
}

pub fn title_for(alert_type: AlertType) -> &'static str {
    match alert_type {
        AlertType::SuspiciousContract => "Suspicious Contract Interaction",
        AlertType::LargeApproval => "Large Token Approval Detected",
        AlertType::HighValueTransfer => "High Value Transaction",
        AlertType::SandwichAttack => "Potential Sandwich Attack",
        AlertType::UnusualFrequency => "Unusual Transaction Frequency",
        _ => "Security Alert",
    }
}

/// One sentence per triggered flag, in flag order.
pub fn message_for(tx: &TransactionRecord, analysis: &RiskAnalysis) -> String {
    let sentences: Vec<String> = analysis
        .flags
        .iter()
        .map(|flag| match flag {
            RiskFlag::HighValueTransfer => {
                format!("High value transaction of ${:.2}", tx.value_usd)
            }
            RiskFlag::SuspiciousContract => {
                "Interaction with potentially malicious contract".to_string()
            }
            RiskFlag::LargeApproval => "Unlimited token approval granted".to_string(),
            RiskFlag::UnusualFrequency => "Unusually high transaction frequency".to_string(),
            RiskFlag::SandwichAttack => {
                "Crowded DeFi activity in the same block suggests a sandwich attack".to_string()
            }
        })
        .collect();

    if sentences.is_empty() {
        return format!("{} detected.", title_for(select_alert_type(&analysis.flags)));
    }
    format!("{}.", sentences.join(". "))
}

/// Build the alert for a scored transaction, or `None` below `threshold`.
pub fn build_alert(tx: &TransactionRecord, analysis: &RiskAnalysis, threshold: u8) -> Option<Alert> {
    if analysis.score < threshold {
        return None;
    }

    let alert_type = select_alert_type(&analysis.flags);
    let severity = Severity::from_score(analysis.score);

    Some(Alert {
        id: None,
        wallet_id: tx.wallet_id,
        transaction_hash: Some(tx.hash.clone()),
        alert_type,
        severity,
        title: title_for(alert_type).to_string(),
        message: message_for(tx, analysis),
        metadata: serde_json::json!({
            "riskScore": analysis.score,
            "flags": analysis.flag_names(),
            "transactionHash": tx.hash,
            "chain": tx.chain,
            "valueUSD": tx.value_usd,
        }),
        is_read: false,
        is_resolved: false,
        resolved_at: None,
        actions: Vec::new(),
        created_at: Utc::now(),
    })
}

/// Turns high-risk analyses into persisted alerts and hands them to the notification sink.
pub struct AlertFactory {
    threshold: u8,
    store: Arc<dyn Store>,
    sink: Arc<dyn NotificationSink>,
}

impl AlertFactory {
    pub fn new(threshold: u8, store: Arc<dyn Store>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            threshold,
            store,
            sink,
        }
    }

    /// Persist and dispatch an alert if the analysis warrants one.
    /// Sink failures are logged; the stored alert stands.
    pub async fn raise(
        &self,
        tx: &TransactionRecord,
        analysis: &RiskAnalysis,
    ) -> eyre::Result<Option<Alert>> {
        let Some(mut alert) = build_alert(tx, analysis, self.threshold) else {
            return Ok(None);
        };

        let id = self.store.insert_alert(&alert).await?;
        alert.id = Some(id);

        tracing::warn!(
            alert_id = id,
            wallet_id = tx.wallet_id,
            hash = %tx.hash,
            chain = %tx.chain,
            alert_type = alert.alert_type.as_str(),
            severity = alert.severity.as_str(),
            risk_score = analysis.score,
            flags = ?analysis.flag_names(),
            "ALERT RAISED"
        );

        if let Err(e) = self.sink.deliver(&alert).await {
            tracing::error!(alert_id = id, error = %e, "Alert notification failed, alert kept");
        }

        Ok(Some(alert))
    }
}
