//! Decision oracle adapter: provider abstraction + timeout + tolerant parsing.
//!
//! The oracle is an external model proposing the next action for a lead. It
//! is untrusted input: every proposal goes through the validator before
//! anything is executed.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::health::EngagementSignal;
use crate::lead::{Channel, Direction, LeadSnapshot};

/// Tagged action proposal. Advisory only until validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    SendMessage {
        channel: Channel,
        body: String,
    },
    /// Send a templated booking link so the lead can self-schedule.
    SendBookingLink {
        channel: Channel,
        body: String,
    },
    Wait {
        #[serde(default)]
        hours: Option<f64>,
    },
    Escalate {
        reason: String,
    },
}

impl ActionKind {
    pub fn is_send(&self) -> bool {
        matches!(
            self,
            ActionKind::SendMessage { .. } | ActionKind::SendBookingLink { .. }
        )
    }

    pub fn message_body(&self) -> Option<&str> {
        match self {
            ActionKind::SendMessage { body, .. } | ActionKind::SendBookingLink { body, .. } => {
                Some(body)
            }
            _ => None,
        }
    }

    pub fn channel(&self) -> Option<Channel> {
        match self {
            ActionKind::SendMessage { channel, .. }
            | ActionKind::SendBookingLink { channel, .. } => Some(*channel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedAction {
    #[serde(flatten)]
    pub kind: ActionKind,
    pub confidence: f32,
}

impl ProposedAction {
    pub fn wait(hours: Option<f64>) -> Self {
        Self {
            kind: ActionKind::Wait { hours },
            confidence: 1.0,
        }
    }
}

/// One line of recent conversation rendered for the oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationLine {
    pub direction: Direction,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

/// Context handed to the oracle for one lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleContext {
    pub lead_id: String,
    pub name: String,
    pub stage: crate::lead::Stage,
    pub attributes: std::collections::HashMap<String, String>,
    pub signal: EngagementSignal,
    pub recent_conversation: Vec<ConversationLine>,
}

impl OracleContext {
    pub fn render(
        lead: &LeadSnapshot,
        signal: &EngagementSignal,
        recent: &[crate::lead::CommunicationRecord],
    ) -> Self {
        Self {
            lead_id: lead.id.clone(),
            name: lead.name.clone(),
            stage: lead.stage,
            attributes: lead.attributes.clone(),
            signal: signal.clone(),
            recent_conversation: recent
                .iter()
                .take(10)
                .map(|c| ConversationLine {
                    direction: c.direction,
                    content: c.content.clone(),
                    sent_at: c.sent_at,
                })
                .collect(),
        }
    }
}

#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// Propose the next action for a lead. Errors and timeouts are handled
    /// by the scheduler's per-lead failure path.
    async fn propose(&self, ctx: &OracleContext) -> Result<ProposedAction>;

    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

// --- tolerant variants of the oracle HTTP response ---

#[derive(Debug, Clone, Deserialize)]
struct ProposalFlat {
    #[serde(flatten)]
    kind: ActionKind,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

fn default_confidence() -> f32 {
    0.5
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ProposalAny {
    Flat(ProposalFlat),
    Wrapped { action: Box<ProposalAny> },
}

fn map_any(any: ProposalAny) -> ProposedAction {
    match any {
        ProposalAny::Flat(ProposalFlat { kind, confidence }) => ProposedAction {
            kind,
            confidence: confidence.clamp(0.0, 1.0),
        },
        ProposalAny::Wrapped { action } => map_any(*action),
    }
}

/// HTTP oracle: POST the rendered context, read a tagged action back.
pub struct HttpOracle {
    endpoint: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpOracle {
    pub fn new(endpoint: String, timeout_secs: u64) -> Self {
        Self {
            endpoint,
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn from_env() -> Option<Self> {
        std::env::var("ORACLE_ENDPOINT")
            .ok()
            .map(|ep| Self::new(ep, 30))
    }
}

#[async_trait]
impl DecisionOracle for HttpOracle {
    async fn propose(&self, ctx: &OracleContext) -> Result<ProposedAction> {
        let resp = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(ctx)
            .send()
            .await
            .context("oracle post")?
            .error_for_status()
            .context("oracle non-2xx")?;
        let body = resp.text().await.context("read oracle body")?;

        let trimmed = body.trim();
        if trimmed.is_empty() || trimmed == "null" {
            anyhow::bail!("oracle returned empty/null proposal");
        }

        let any: ProposalAny = serde_json::from_str(trimmed)
            .with_context(|| format!("parse oracle JSON failed, body: {trimmed}"))?;
        Ok(map_any(any))
    }

    fn provider_name(&self) -> &'static str {
        "http"
    }
}

/// Deterministic oracle used by tests and local runs: replays a scripted
/// sequence of proposals, then falls back to `Wait`.
pub struct MockOracle {
    script: std::sync::Mutex<std::collections::VecDeque<ProposedAction>>,
}

impl MockOracle {
    pub fn new(proposals: Vec<ProposedAction>) -> Self {
        Self {
            script: std::sync::Mutex::new(proposals.into()),
        }
    }

    pub fn always(action: ProposedAction) -> AlwaysOracle {
        AlwaysOracle { action }
    }
}

#[async_trait]
impl DecisionOracle for MockOracle {
    async fn propose(&self, _ctx: &OracleContext) -> Result<ProposedAction> {
        let next = self
            .script
            .lock()
            .expect("mock oracle mutex poisoned")
            .pop_front();
        Ok(next.unwrap_or_else(|| ProposedAction::wait(None)))
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Oracle that repeats one fixed proposal forever.
pub struct AlwaysOracle {
    action: ProposedAction,
}

#[async_trait]
impl DecisionOracle for AlwaysOracle {
    async fn propose(&self, _ctx: &OracleContext) -> Result<ProposedAction> {
        Ok(self.action.clone())
    }

    fn provider_name(&self) -> &'static str {
        "always"
    }
}

/// Disabled oracle: always waits, letting the analyzer cadence drive reviews.
pub struct DisabledOracle;

#[async_trait]
impl DecisionOracle for DisabledOracle {
    async fn propose(&self, _ctx: &OracleContext) -> Result<ProposedAction> {
        Ok(ProposedAction::wait(None))
    }

    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}
