//! Operational alert channel: escalations and health-check warnings go to
//! whatever is configured (Slack webhook, SMTP email). Fire-and-forget —
//! a failed notification is logged and never fails lead processing.

pub mod email;
pub mod slack;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    Escalation,
    OverdueLeads,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub lead_ids: Vec<String>,
    pub detail: String,
    pub ts: DateTime<Utc>,
}

impl AlertEvent {
    pub fn escalation(lead_id: &str, detail: impl Into<String>, ts: DateTime<Utc>) -> Self {
        Self {
            kind: AlertKind::Escalation,
            lead_ids: vec![lead_id.to_string()],
            detail: detail.into(),
            ts,
        }
    }

    pub fn overdue(lead_ids: Vec<String>, ts: DateTime<Utc>) -> Self {
        let detail = format!("{} lead(s) more than 24h past due review", lead_ids.len());
        Self {
            kind: AlertKind::OverdueLeads,
            lead_ids,
            detail,
            ts,
        }
    }
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, ev: &AlertEvent) -> Result<()>;
}

/// Fan-out over every configured notifier. Errors are logged per notifier;
/// the mux itself never fails.
pub struct NotifierMux {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl NotifierMux {
    pub fn from_env() -> Self {
        let notifiers: Vec<Box<dyn Notifier>> = vec![
            Box::new(slack::SlackNotifier::from_env()),
            Box::new(email::EmailNotifier::from_env()),
        ];
        Self { notifiers }
    }

    /// No-op mux for tests and dry runs.
    pub fn none() -> Self {
        Self {
            notifiers: Vec::new(),
        }
    }

    /// Explicit notifier set, used by tests and custom wiring.
    pub fn with(notifiers: Vec<Box<dyn Notifier>>) -> Self {
        Self { notifiers }
    }

    pub async fn notify(&self, ev: &AlertEvent) {
        for n in &self.notifiers {
            if let Err(e) = n.send(ev).await {
                tracing::warn!(kind = ?ev.kind, "ops notification failed: {e:#}");
            }
        }
    }
}
