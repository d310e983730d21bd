//! Outcome tracker: what actually happened after a message went out?
//!
//! Arming persists an evaluate-after timestamp next to the send; a periodic
//! sweep picks up due records and classifies the result from the store.
//! Durable by construction: a process restart loses no tracking, the next
//! sweep re-derives everything from persisted timestamps. Pure observation,
//! results feed offline analysis only — never the same cycle's decisions.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::lead::{AppointmentRecord, CommunicationRecord, Direction};
use crate::sentiment;
use crate::store::LeadStore;

/// Evaluation window after a send.
pub const EVALUATION_WINDOW_HOURS: i64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageOutcome {
    Booked,
    OptedOut,
    EngagedNegative,
    EngagedPositive,
    Ghosted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    Pending,
    Evaluated,
}

/// One tracked send. `evaluate_after` is the durable deferred-evaluation
/// marker the sweep keys off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub id: String,
    pub lead_id: String,
    pub message_id: String,
    pub sent_at: DateTime<Utc>,
    pub evaluate_after: DateTime<Utc>,
    pub status: OutcomeStatus,
    pub outcome: Option<MessageOutcome>,
    pub response_latency_minutes: Option<i64>,
}

/// Build the pending record for a just-sent message.
pub fn arm(lead_id: &str, message_id: &str, sent_at: DateTime<Utc>) -> OutcomeRecord {
    OutcomeRecord {
        id: uuid::Uuid::new_v4().to_string(),
        lead_id: lead_id.to_string(),
        message_id: message_id.to_string(),
        sent_at,
        evaluate_after: sent_at + Duration::hours(EVALUATION_WINDOW_HOURS),
        status: OutcomeStatus::Pending,
        outcome: None,
        response_latency_minutes: None,
    }
}

/// Classify the window contents for one tracked message.
/// Priority: appointment beats replies beats silence.
pub fn classify(
    record: &OutcomeRecord,
    communications: &[CommunicationRecord],
    appointments: &[AppointmentRecord],
) -> (MessageOutcome, Option<i64>) {
    if appointments
        .iter()
        .any(|a| a.created_at > record.sent_at)
    {
        return (MessageOutcome::Booked, None);
    }

    let first_reply = communications
        .iter()
        .filter(|c| c.direction == Direction::Inbound && c.sent_at > record.sent_at)
        .min_by_key(|c| c.sent_at);

    match first_reply {
        Some(reply) => {
            let latency = (reply.sent_at - record.sent_at).num_minutes();
            let outcome = if sentiment::is_opt_out(&reply.content) {
                MessageOutcome::OptedOut
            } else if sentiment::is_decline(&reply.content) {
                MessageOutcome::EngagedNegative
            } else {
                // Question marks, affirmative words, or anything else all
                // count as positive-or-neutral engagement.
                MessageOutcome::EngagedPositive
            };
            (outcome, Some(latency))
        }
        None => (MessageOutcome::Ghosted, None),
    }
}

/// Periodic sweep over due pending records.
pub struct OutcomeSweeper {
    store: Arc<dyn LeadStore>,
}

impl OutcomeSweeper {
    pub fn new(store: Arc<dyn LeadStore>) -> Self {
        Self { store }
    }

    /// Evaluate everything due at `now`. Returns how many records were
    /// completed. Individual failures are logged and skipped, never abort
    /// the sweep.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<usize> {
        let due = self.store.due_outcomes(now).await?;
        let mut evaluated = 0usize;

        for record in due {
            match self.evaluate_one(&record).await {
                Ok(outcome) => {
                    tracing::info!(
                        target: "outcome",
                        lead_id = %record.lead_id,
                        message_id = %record.message_id,
                        ?outcome,
                        "message outcome evaluated"
                    );
                    evaluated += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        target: "outcome",
                        lead_id = %record.lead_id,
                        "outcome evaluation failed: {e:#}"
                    );
                }
            }
        }
        Ok(evaluated)
    }

    async fn evaluate_one(&self, record: &OutcomeRecord) -> Result<MessageOutcome> {
        let comms = self.store.communications(&record.lead_id, 100).await?;
        let appts = self.store.appointments(&record.lead_id).await?;
        let (outcome, latency) = classify(record, &comms, &appts);
        self.store
            .complete_outcome(&record.id, outcome, latency)
            .await?;
        Ok(outcome)
    }
}
