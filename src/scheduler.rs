//! # Batch runner
//! Orchestrates the nurture cycle: select due leads, analyze, ask the
//! oracle, validate, repetition-check, then execute or defer. Every
//! rejection produces a new `next_review_at` — a lead is delayed, never
//! dropped. A single lead's failure never aborts the batch.
//!
//! Coordination between this path and the reactive (reply-triggered) path
//! is a short-TTL lease acquired per lead via compare-and-swap in the
//! store, plus the 10-minute recently-contacted exclusion in the selection
//! query.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::channel::{ChannelSender, SendError};
use crate::clock;
use crate::config::AgentConfig;
use crate::health;
use crate::lead::{Channel, CommunicationRecord, Direction, LeadSnapshot};
use crate::notify::{AlertEvent, NotifierMux};
use crate::oracle::{ActionKind, DecisionOracle, OracleContext};
use crate::outcome;
use crate::repetition;
use crate::store::LeadStore;
use crate::validator::{self, RuleCode};

/// Retry delays by failure class, hours.
const POLICY_RETRY_HOURS: f64 = 1.0;
const REPETITION_RETRY_HOURS: f64 = 6.0;
const ESCALATION_COOLDOWN_HOURS: f64 = 48.0;
const ERROR_RETRY_HOURS: f64 = 2.0;
const INCONSISTENCY_RETRY_HOURS: f64 = 24.0;
/// Severely-overdue threshold for the health-check sweep.
const OVERDUE_ALERT_HOURS: i64 = 24;
/// How much recent history the pipeline reads per lead.
const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Disposition {
    Executed,
    Waited,
    Blocked,
    RepetitionBlocked,
    Escalated,
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CycleStats {
    pub selected: usize,
    pub executed: usize,
    pub waited: usize,
    pub blocked: usize,
    pub repetition_blocked: usize,
    pub escalated: usize,
    pub errored: usize,
    pub skipped: usize,
}

impl CycleStats {
    fn tally(&mut self, d: Disposition) {
        match d {
            Disposition::Executed => self.executed += 1,
            Disposition::Waited => self.waited += 1,
            Disposition::Blocked => self.blocked += 1,
            Disposition::RepetitionBlocked => self.repetition_blocked += 1,
            Disposition::Escalated => self.escalated += 1,
            Disposition::Skipped => self.skipped += 1,
        }
    }

    fn merge(&mut self, other: &CycleStats) {
        self.selected += other.selected;
        self.executed += other.executed;
        self.waited += other.waited;
        self.blocked += other.blocked;
        self.repetition_blocked += other.repetition_blocked;
        self.escalated += other.escalated;
        self.errored += other.errored;
        self.skipped += other.skipped;
    }
}

pub struct NurtureScheduler {
    store: Arc<dyn LeadStore>,
    oracle: Arc<dyn DecisionOracle>,
    sms: Arc<dyn ChannelSender>,
    email: Arc<dyn ChannelSender>,
    notifier: Arc<NotifierMux>,
    config: AgentConfig,
    totals: std::sync::Mutex<CycleStats>,
}

impl NurtureScheduler {
    pub fn new(
        store: Arc<dyn LeadStore>,
        oracle: Arc<dyn DecisionOracle>,
        sms: Arc<dyn ChannelSender>,
        email: Arc<dyn ChannelSender>,
        notifier: Arc<NotifierMux>,
        config: AgentConfig,
    ) -> Self {
        Self {
            store,
            oracle,
            sms,
            email,
            notifier,
            config,
            totals: std::sync::Mutex::new(CycleStats::default()),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Cumulative stats since startup, for `/status`.
    pub fn totals(&self) -> CycleStats {
        *self.totals.lock().expect("totals mutex poisoned")
    }

    /// One full batch cycle at `now`.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleStats> {
        let mut stats = CycleStats::default();
        if !self.config.enabled {
            tracing::debug!(target: "scheduler", "agent disabled; skipping cycle");
            return Ok(stats);
        }

        counter!("nurture_cycles_total").increment(1);
        gauge!("nurture_last_cycle_ts").set(now.timestamp() as f64);

        let due = self
            .store
            .due_leads(
                now,
                self.config.batch_cap,
                Duration::minutes(self.config.exclusion_window_minutes),
            )
            .await
            .context("select due leads")?;
        stats.selected = due.len();
        tracing::info!(target: "scheduler", selected = due.len(), "batch cycle start");

        for lead in due {
            if !self.in_rollout(&lead.id) {
                stats.skipped += 1;
                continue;
            }
            match self.run_one(&lead, now).await {
                Ok(d) => stats.tally(d),
                Err(e) => {
                    stats.errored += 1;
                    counter!("nurture_lead_errors_total").increment(1);
                    tracing::warn!(
                        target: "scheduler",
                        lead_id = %lead.id,
                        "lead processing failed: {e:#}"
                    );
                    let _ = self
                        .store
                        .set_next_review(&lead.id, now + hours(ERROR_RETRY_HOURS))
                        .await;
                }
            }
        }

        self.overdue_sweep(now).await;

        self.totals
            .lock()
            .expect("totals mutex poisoned")
            .merge(&stats);
        tracing::info!(target: "scheduler", ?stats, "batch cycle complete");
        Ok(stats)
    }

    /// Lease wrapper around the per-lead pipeline.
    async fn run_one(&self, lead: &LeadSnapshot, now: DateTime<Utc>) -> Result<Disposition> {
        let acquired = self
            .store
            .acquire_lease(&lead.id, now, Duration::seconds(self.config.lease_ttl_secs))
            .await
            .context("acquire lease")?;
        if !acquired {
            tracing::debug!(target: "scheduler", lead_id = %lead.id, "lease held elsewhere");
            return Ok(Disposition::Skipped);
        }

        let result = self.process_lead(lead, now, false).await;
        let _ = self.store.release_lease(&lead.id).await;
        result
    }

    /// Reactive entry point: same pipeline, out of band, triggered by an
    /// inbound reply or new-lead event. Terminal-stage leads are allowed a
    /// reactive reply but never proactive outreach.
    pub async fn process_reactive(&self, lead_id: &str, now: DateTime<Utc>) -> Result<Disposition> {
        let lead = self
            .store
            .lead(lead_id)
            .await?
            .with_context(|| format!("lead {lead_id} no longer exists"))?;

        // The master switch and per-lead automation flags bind both paths;
        // only the terminal-stage rule is relaxed for reactive replies.
        if !self.config.enabled || !lead.autonomous || lead.automation_disabled {
            return Ok(Disposition::Skipped);
        }
        if !self.in_rollout(&lead.id) {
            return Ok(Disposition::Skipped);
        }
        let acquired = self
            .store
            .acquire_lease(&lead.id, now, Duration::seconds(self.config.lease_ttl_secs))
            .await?;
        if !acquired {
            return Ok(Disposition::Skipped);
        }
        let result = self.process_lead(&lead, now, true).await;
        let _ = self.store.release_lease(&lead.id).await;
        result
    }

    /// The per-lead pipeline: analyze → propose → validate → repetition
    /// check → execute/defer.
    async fn process_lead(
        &self,
        lead: &LeadSnapshot,
        now: DateTime<Utc>,
        reactive: bool,
    ) -> Result<Disposition> {
        if lead.stage.is_terminal() && !reactive {
            // Batch selection excludes these; kept as a belt-and-braces
            // invariant on the shared pipeline.
            return Ok(Disposition::Skipped);
        }

        let comms = self.store.communications(&lead.id, HISTORY_LIMIT).await?;
        let appointments = self.store.appointments(&lead.id).await?;
        let call_outcome = self.store.last_call_outcome(&lead.id).await?;

        let signal = health::assess(lead, &comms, &appointments, call_outcome.as_ref(), now);
        tracing::debug!(
            target: "scheduler",
            lead_id = %lead.id,
            temperature = ?signal.temperature,
            trend = ?signal.trend,
            "signal computed"
        );

        let ctx = OracleContext::render(lead, &signal, &comms);
        let proposal = tokio::time::timeout(
            std::time::Duration::from_secs(self.config.oracle_timeout_secs),
            self.oracle.propose(&ctx),
        )
        .await
        .map_err(|_| anyhow::anyhow!("oracle timed out"))?
        .context("oracle proposal")?;

        let report = validator::validate(&proposal, lead, &signal, &comms, now);
        for warning in &report.warnings {
            tracing::info!(
                target: "validator",
                lead_id = %lead.id,
                code = ?warning.code,
                "{}",
                warning.message
            );
        }
        if !report.passed() {
            return self.defer_policy_block(lead, &report, now).await;
        }

        if let Some(body) = proposal.kind.message_body() {
            let recent_outbound: Vec<&str> = comms
                .iter()
                .filter(|c| c.direction == Direction::Outbound)
                .map(|c| c.content.as_str())
                .collect();
            let verdict = repetition::check(body, &recent_outbound);
            if verdict.repetitive {
                counter!("nurture_repetition_blocks_total").increment(1);
                tracing::info!(
                    target: "scheduler",
                    lead_id = %lead.id,
                    reason = verdict.reason.as_deref().unwrap_or("n/a"),
                    "repetition block; oracle may be looping"
                );
                self.store
                    .set_next_review(&lead.id, now + hours(REPETITION_RETRY_HOURS))
                    .await?;
                return Ok(Disposition::RepetitionBlocked);
            }
        }

        match &proposal.kind {
            ActionKind::Escalate { reason } => {
                counter!("nurture_escalations_total").increment(1);
                self.store.record_escalation(&lead.id, reason, now).await?;
                self.notifier
                    .notify(&AlertEvent::escalation(&lead.id, reason.clone(), now))
                    .await;
                self.store
                    .set_next_review(&lead.id, now + hours(ESCALATION_COOLDOWN_HOURS))
                    .await?;
                Ok(Disposition::Escalated)
            }
            ActionKind::Wait { hours: wait_hours } => {
                let delay = wait_hours.unwrap_or(signal.next_review_hours);
                self.store
                    .set_next_review(&lead.id, now + hours(delay))
                    .await?;
                Ok(Disposition::Waited)
            }
            ActionKind::SendMessage { channel, body }
            | ActionKind::SendBookingLink { channel, body } => {
                self.execute_send(lead, *channel, body, &signal, now).await
            }
        }
    }

    /// Hard-rule failure: pick the retry delay from the cause. Retrying a
    /// quiet-hours block before morning is futile, so that one reschedules
    /// to the next local 8 AM.
    async fn defer_policy_block(
        &self,
        lead: &LeadSnapshot,
        report: &validator::ValidationReport,
        now: DateTime<Utc>,
    ) -> Result<Disposition> {
        counter!("nurture_policy_blocks_total").increment(1);
        let next = if report.has_error(RuleCode::QuietHours) {
            clock::next_local_hour(&lead.region, now, validator::CONTACT_HOUR_START)
        } else {
            now + hours(POLICY_RETRY_HOURS)
        };
        tracing::info!(
            target: "scheduler",
            lead_id = %lead.id,
            codes = ?report.errors.iter().map(|e| e.code).collect::<Vec<_>>(),
            retry_at = %next,
            "action rejected by policy"
        );
        self.store.set_next_review(&lead.id, next).await?;
        Ok(Disposition::Blocked)
    }

    async fn execute_send(
        &self,
        lead: &LeadSnapshot,
        channel: Channel,
        body: &str,
        signal: &health::EngagementSignal,
        now: DateTime<Utc>,
    ) -> Result<Disposition> {
        let Some(address) = lead.address_for(channel) else {
            // Data inconsistency: consented but no address on file.
            tracing::warn!(
                target: "scheduler",
                lead_id = %lead.id,
                ?channel,
                "no address for consented channel; skipping"
            );
            self.store
                .set_next_review(&lead.id, now + hours(INCONSISTENCY_RETRY_HOURS))
                .await?;
            return Ok(Disposition::Skipped);
        };

        if self.config.dry_run {
            tracing::info!(
                target: "scheduler",
                lead_id = %lead.id,
                ?channel,
                body,
                "dry run: send suppressed"
            );
            self.store
                .set_next_review(&lead.id, now + hours(signal.next_review_hours))
                .await?;
            return Ok(Disposition::Executed);
        }

        let sender = self.sender_for(channel);
        match sender.send(address, body).await {
            Ok(_receipt) => {}
            Err(SendError::ConsentRevoked) => {
                tracing::warn!(
                    target: "scheduler",
                    lead_id = %lead.id,
                    ?channel,
                    "gateway reported consent revoked"
                );
                self.store.revoke_consent(&lead.id, channel).await?;
                self.store
                    .set_next_review(&lead.id, now + hours(INCONSISTENCY_RETRY_HOURS))
                    .await?;
                return Ok(Disposition::Blocked);
            }
            Err(SendError::Transport(e)) => {
                return Err(e.context("channel send"));
            }
        }

        counter!("nurture_sends_total").increment(1);
        let record = CommunicationRecord {
            id: uuid::Uuid::new_v4().to_string(),
            lead_id: lead.id.clone(),
            direction: Direction::Outbound,
            channel,
            content: body.to_string(),
            sent_at: now,
            manual: false,
            sent_by: Some("nurture-agent".to_string()),
        };
        let message_id = record.id.clone();
        self.store.append_communication(record).await?;
        self.store.mark_contacted(&lead.id, now).await?;
        self.store
            .insert_outcome(outcome::arm(&lead.id, &message_id, now))
            .await?;
        self.store
            .set_next_review(&lead.id, now + hours(signal.next_review_hours))
            .await?;
        tracing::info!(
            target: "scheduler",
            lead_id = %lead.id,
            ?channel,
            "message sent"
        );
        Ok(Disposition::Executed)
    }

    /// Health-check safety net, independent of the main loop: leads more
    /// than 24h past due get surfaced to ops instead of disappearing.
    async fn overdue_sweep(&self, now: DateTime<Utc>) {
        match self
            .store
            .overdue_leads(now, Duration::hours(OVERDUE_ALERT_HOURS))
            .await
        {
            Ok(overdue) if !overdue.is_empty() => {
                let ids: Vec<String> = overdue.iter().map(|l| l.id.clone()).collect();
                tracing::warn!(
                    target: "scheduler",
                    count = ids.len(),
                    ?ids,
                    "severely overdue leads detected"
                );
                self.notifier.notify(&AlertEvent::overdue(ids, now)).await;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(target: "scheduler", "overdue sweep failed: {e:#}");
            }
        }
    }

    fn sender_for(&self, channel: Channel) -> &Arc<dyn ChannelSender> {
        match channel {
            Channel::Sms => &self.sms,
            Channel::Email => &self.email,
        }
    }

    fn in_rollout(&self, lead_id: &str) -> bool {
        match self.config.rollout_percent {
            0 => false,
            p if p >= 100 => true,
            p => rollout_bucket(lead_id) < p,
        }
    }
}

/// Deterministic 0–99 bucket from the lead id. Reproducible across
/// restarts, so rollout membership is stable and testable.
pub fn rollout_bucket(lead_id: &str) -> u8 {
    let digest = Sha256::digest(lead_id.as_bytes());
    let mut eight = [0u8; 8];
    eight.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(eight) % 100) as u8
}

fn hours(h: f64) -> Duration {
    Duration::minutes((h * 60.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollout_bucket_is_stable() {
        let a = rollout_bucket("lead-123");
        let b = rollout_bucket("lead-123");
        assert_eq!(a, b);
        assert!(a < 100);
    }

    #[test]
    fn fractional_hours_round_to_minutes() {
        assert_eq!(hours(0.5), Duration::minutes(30));
        assert_eq!(hours(48.0), Duration::hours(48));
    }
}
