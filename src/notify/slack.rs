use anyhow::{Context, Result};

use super::{AlertEvent, AlertKind, Notifier};

/// Ops alerts into a Slack channel via an incoming webhook. Disabled (send
/// is a no-op) when `SLACK_WEBHOOK_URL` is unset, so dev runs stay quiet.
pub struct SlackNotifier {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl SlackNotifier {
    pub fn from_env() -> Self {
        Self::with_url(std::env::var("SLACK_WEBHOOK_URL").ok())
    }

    pub fn new(url: String) -> Self {
        Self::with_url(Some(url))
    }

    fn with_url(webhook_url: Option<String>) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }
}

fn render(ev: &AlertEvent) -> String {
    let heading = match ev.kind {
        AlertKind::Escalation => ":rotating_light: Lead escalated",
        AlertKind::OverdueLeads => ":hourglass: Severely overdue leads",
    };
    format!(
        "{heading}\n> {}\nLeads: {}\nAt: {}",
        ev.detail,
        ev.lead_ids.join(", "),
        ev.ts.to_rfc3339()
    )
}

#[async_trait::async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, ev: &AlertEvent) -> Result<()> {
        let Some(url) = &self.webhook_url else {
            tracing::debug!("Slack disabled (no SLACK_WEBHOOK_URL)");
            return Ok(());
        };

        self.client
            .post(url)
            .json(&serde_json::json!({ "text": render(ev) }))
            .send()
            .await
            .context("slack post")?
            .error_for_status()
            .context("slack non-2xx")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn escalation_renders_lead_and_detail() {
        let ts = Utc.with_ymd_and_hms(2025, 9, 8, 12, 0, 0).unwrap();
        let text = render(&AlertEvent::escalation("lead-7", "asked for a human", ts));
        assert!(text.contains("escalated"));
        assert!(text.contains("lead-7"));
        assert!(text.contains("asked for a human"));
    }
}
