//! # Decision Validator
//! Guardrails between the oracle and the outside world. Pure function of
//! `(action, lead, signal, communications, now)` — no side effects, same
//! inputs at the same instant give the same report.
//!
//! Hard rules encode must-never-happen safety and compliance properties
//! (consent, quiet hours, cooldown, double-booking, terminal-stage
//! protection, broken promises). Soft rules are quality signals for humans
//! and analytics; they never stall the pipeline.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::clock;
use crate::health::EngagementSignal;
use crate::lead::{CommunicationRecord, Direction, LeadSnapshot, Stage};
use crate::oracle::{ActionKind, ProposedAction};
use crate::sentiment;

/// Local contact window: sends allowed in [CONTACT_HOUR_START, CONTACT_HOUR_END).
pub const CONTACT_HOUR_START: u32 = 8;
pub const CONTACT_HOUR_END: u32 = 21;
/// Broadcast-mode cooldown between outbound messages with no reply between.
pub const COOLDOWN_HOURS: i64 = 4;
/// Soft length thresholds per channel, in characters.
pub const SMS_LENGTH_LIMIT: usize = 320;
pub const EMAIL_LENGTH_LIMIT: usize = 2000;
/// Proposals below this confidence get a soft warning.
pub const LOW_CONFIDENCE: f32 = 0.4;

/// Stable rule identifiers; the scheduler keys retry policy off these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleCode {
    Consent,
    QuietHours,
    Cooldown,
    DoubleBooking,
    TerminalStage,
    EmptyMessage,
    UnverifiablePromise,
    MessageLength,
    LowConfidence,
    StockPhrase,
    SalesyTone,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleViolation {
    pub code: RuleCode,
    pub message: String,
}

impl RuleViolation {
    fn new(code: RuleCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Hard errors block execution; warnings are logged and the action proceeds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<RuleViolation>,
    pub warnings: Vec<RuleViolation>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_error(&self, code: RuleCode) -> bool {
        self.errors.iter().any(|v| v.code == code)
    }

    fn error(&mut self, code: RuleCode, message: impl Into<String>) {
        self.errors.push(RuleViolation::new(code, message));
    }

    fn warn(&mut self, code: RuleCode, message: impl Into<String>) {
        self.warnings.push(RuleViolation::new(code, message));
    }
}

// A human promising to call at a specific time. The engine cannot guarantee
// that, so the pattern is a hard block unless the message merely
// acknowledges an existing confirmed booking.
static PROMISE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:will|going to|gonna|i'll|we'll|he'll|she'll)\b[^.!?]{0,60}?\b(?:call|ring|phone)\b[^.!?]{0,30}?\b(?:at|by|around)\s+\d{1,2}(?::\d{2})?\s*(?:am|pm)?",
    )
    .expect("valid promise regex")
});

static BOOKING_ACK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bconfirm(?:ed|ing)?\b[^.!?]{0,60}?\b(?:booking|appointment|call)\b")
        .expect("valid booking-ack regex")
});

/// Validate one proposed action for one lead.
pub fn validate(
    action: &ProposedAction,
    lead: &LeadSnapshot,
    signal: &EngagementSignal,
    communications: &[CommunicationRecord],
    now: DateTime<Utc>,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    if action.kind.is_send() {
        check_consent(action, lead, &mut report);
        check_quiet_hours(lead, now, &mut report);
        check_cooldown(communications, now, &mut report);
        check_content(action, &mut report);
        check_soft_rules(action, &mut report);
    }
    check_double_booking(action, signal, &mut report);
    check_terminal_stage(action, lead, &mut report);

    report
}

fn check_consent(action: &ProposedAction, lead: &LeadSnapshot, report: &mut ValidationReport) {
    if let Some(channel) = action.kind.channel() {
        if !lead.consent.allows(channel) {
            report.error(
                RuleCode::Consent,
                format!("lead has not consented to {channel:?} contact"),
            );
        }
    }
}

fn check_quiet_hours(lead: &LeadSnapshot, now: DateTime<Utc>, report: &mut ValidationReport) {
    let hour = clock::local_hour(&lead.region, now);
    if !(CONTACT_HOUR_START..CONTACT_HOUR_END).contains(&hour) {
        report.error(
            RuleCode::QuietHours,
            format!(
                "local hour {hour} in region {} is outside contact window [{CONTACT_HOUR_START}, {CONTACT_HOUR_END})",
                lead.region
            ),
        );
    }
}

/// Context-aware anti-spam cooldown. If the lead replied after our last
/// outbound, we are in conversational mode and may answer immediately.
/// Otherwise (broadcast mode) require 4h since the last outbound.
fn check_cooldown(
    communications: &[CommunicationRecord],
    now: DateTime<Utc>,
    report: &mut ValidationReport,
) {
    let last_outbound = communications
        .iter()
        .filter(|c| c.direction == Direction::Outbound)
        .max_by_key(|c| c.sent_at);
    let Some(last_outbound) = last_outbound else {
        return;
    };

    let replied_since = communications
        .iter()
        .any(|c| c.direction == Direction::Inbound && c.sent_at > last_outbound.sent_at);
    if replied_since {
        return;
    }

    let elapsed = now - last_outbound.sent_at;
    if elapsed < Duration::hours(COOLDOWN_HOURS) {
        report.error(
            RuleCode::Cooldown,
            format!(
                "last outbound {}m ago with no reply; broadcast cooldown is {COOLDOWN_HOURS}h",
                elapsed.num_minutes()
            ),
        );
    }
}

fn check_double_booking(
    action: &ProposedAction,
    signal: &EngagementSignal,
    report: &mut ValidationReport,
) {
    if matches!(action.kind, ActionKind::SendBookingLink { .. }) && signal.active_appointment {
        report.error(
            RuleCode::DoubleBooking,
            "lead already has an active appointment; not proposing another booking",
        );
    }
}

/// Converted leads may receive a plain support message only; anything that
/// re-opens booking or application flows is blocked.
fn check_terminal_stage(
    action: &ProposedAction,
    lead: &LeadSnapshot,
    report: &mut ValidationReport,
) {
    if lead.stage != Stage::Converted {
        return;
    }
    match &action.kind {
        ActionKind::SendBookingLink { .. } => {
            report.error(
                RuleCode::TerminalStage,
                "converted lead must not be asked to book again",
            );
        }
        ActionKind::SendMessage { body, .. } => {
            let b = body.to_lowercase();
            if b.contains("book") || b.contains("application") || b.contains("apply") {
                report.error(
                    RuleCode::TerminalStage,
                    "converted lead may only receive plain support messages",
                );
            }
        }
        _ => {}
    }
}

fn check_content(action: &ProposedAction, report: &mut ValidationReport) {
    let Some(body) = action.kind.message_body() else {
        return;
    };
    if body.trim().is_empty() {
        report.error(RuleCode::EmptyMessage, "send action carries no content");
        return;
    }
    if PROMISE_RE.is_match(body) && !BOOKING_ACK_RE.is_match(body) {
        report.error(
            RuleCode::UnverifiablePromise,
            "message promises a human contact at a specific time the system cannot guarantee",
        );
    }
}

fn check_soft_rules(action: &ProposedAction, report: &mut ValidationReport) {
    let Some(body) = action.kind.message_body() else {
        return;
    };

    if let Some(channel) = action.kind.channel() {
        let limit = match channel {
            crate::lead::Channel::Sms => SMS_LENGTH_LIMIT,
            crate::lead::Channel::Email => EMAIL_LENGTH_LIMIT,
        };
        let len = body.chars().count();
        if len > limit {
            report.warn(
                RuleCode::MessageLength,
                format!("{len} chars exceeds the {limit}-char guideline for {channel:?}"),
            );
        }
    }

    if action.confidence < LOW_CONFIDENCE {
        report.warn(
            RuleCode::LowConfidence,
            format!("oracle confidence {:.2} is low", action.confidence),
        );
    }

    for phrase in sentiment::stock_phrases(body) {
        report.warn(RuleCode::StockPhrase, format!("stock phrase: \"{phrase}\""));
    }
    for phrase in sentiment::salesy_phrases(body) {
        report.warn(
            RuleCode::SalesyTone,
            format!("high-pressure phrase: \"{phrase}\""),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{Temperature, Trend};
    use crate::lead::{Channel, Consent};
    use crate::sentiment::Tone;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn lead() -> LeadSnapshot {
        LeadSnapshot {
            id: "l1".into(),
            name: "Ada".into(),
            region: "UTC".into(),
            stage: Stage::Nurturing,
            consent: Consent {
                sms: true,
                email: true,
                call: true,
            },
            phone: Some("+4470000001".into()),
            email: Some("ada@example.com".into()),
            created_at: Utc.with_ymd_and_hms(2025, 9, 1, 9, 0, 0).unwrap(),
            last_contacted_at: None,
            next_review_at: None,
            application_started_at: None,
            attributes: HashMap::new(),
            autonomous: true,
            automation_disabled: false,
            locked_until: None,
        }
    }

    fn signal() -> EngagementSignal {
        EngagementSignal {
            temperature: Temperature::Warm,
            trend: Trend::Stable,
            tone: Tone::Neutral,
            objection: false,
            question_count: 0,
            urgency: None,
            active_appointment: false,
            hours_since_contact: 6.0,
            reply_count: 1,
            next_review_hours: 2.0,
            reasons: vec![],
        }
    }

    fn send(body: &str) -> ProposedAction {
        ProposedAction {
            kind: ActionKind::SendMessage {
                channel: Channel::Sms,
                body: body.into(),
            },
            confidence: 0.8,
        }
    }

    fn outbound(at: DateTime<Utc>) -> CommunicationRecord {
        CommunicationRecord {
            id: "c1".into(),
            lead_id: "l1".into(),
            direction: Direction::Outbound,
            channel: Channel::Sms,
            content: "earlier message".into(),
            sent_at: at,
            manual: false,
            sent_by: None,
        }
    }

    fn inbound(at: DateTime<Utc>) -> CommunicationRecord {
        CommunicationRecord {
            id: "c2".into(),
            lead_id: "l1".into(),
            direction: Direction::Inbound,
            channel: Channel::Sms,
            content: "a reply".into(),
            sent_at: at,
            manual: false,
            sent_by: None,
        }
    }

    // Daytime in every test: 12:00 UTC, region UTC.
    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 8, 12, 0, 0).unwrap()
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let (l, s, now) = (lead(), signal(), noon());
        let comms = vec![outbound(now - Duration::hours(2))];
        let action = send("How are the documents coming along?");
        let a = validate(&action, &l, &s, &comms, now);
        let b = validate(&action, &l, &s, &comms, now);
        assert_eq!(a, b);
    }

    #[test]
    fn no_consent_blocks_send() {
        let mut l = lead();
        l.consent.sms = false;
        let report = validate(&send("hello"), &l, &signal(), &[], noon());
        assert!(report.has_error(RuleCode::Consent));
    }

    #[test]
    fn quiet_hours_block_sends_but_not_wait_or_escalate() {
        let night = Utc.with_ymd_and_hms(2025, 9, 8, 23, 0, 0).unwrap();
        let l = lead();
        let report = validate(&send("hello"), &l, &signal(), &[], night);
        assert!(report.has_error(RuleCode::QuietHours));

        let wait = ProposedAction::wait(Some(4.0));
        assert!(validate(&wait, &l, &signal(), &[], night).passed());

        let escalate = ProposedAction {
            kind: ActionKind::Escalate {
                reason: "needs a human".into(),
            },
            confidence: 0.9,
        };
        assert!(validate(&escalate, &l, &signal(), &[], night).passed());
    }

    #[test]
    fn cooldown_applies_only_in_broadcast_mode() {
        let now = noon();
        let l = lead();

        // Contacted 2h ago, no reply since: blocked.
        let comms = vec![outbound(now - Duration::hours(2))];
        let report = validate(&send("still there?"), &l, &signal(), &comms, now);
        assert!(report.has_error(RuleCode::Cooldown));

        // Same timing but the lead replied after: conversational, allowed.
        let comms = vec![
            outbound(now - Duration::hours(2)),
            inbound(now - Duration::hours(1)),
        ];
        let report = validate(&send("great, thanks!"), &l, &signal(), &comms, now);
        assert!(report.passed());
    }

    #[test]
    fn booking_link_rejected_with_active_appointment() {
        let mut s = signal();
        s.active_appointment = true;
        let action = ProposedAction {
            kind: ActionKind::SendBookingLink {
                channel: Channel::Sms,
                body: "Grab a slot here: https://cal.example/greg".into(),
            },
            confidence: 0.9,
        };
        let report = validate(&action, &lead(), &s, &[], noon());
        assert!(report.has_error(RuleCode::DoubleBooking));
    }

    #[test]
    fn converted_lead_gets_support_only() {
        let mut l = lead();
        l.stage = Stage::Converted;

        let rebook = ProposedAction {
            kind: ActionKind::SendBookingLink {
                channel: Channel::Sms,
                body: "book again".into(),
            },
            confidence: 0.9,
        };
        assert!(validate(&rebook, &l, &signal(), &[], noon()).has_error(RuleCode::TerminalStage));

        let reapply = send("Ready to start another application?");
        assert!(validate(&reapply, &l, &signal(), &[], noon()).has_error(RuleCode::TerminalStage));

        let support = send("Congrats on completing! Reach out any time with questions.");
        assert!(validate(&support, &l, &signal(), &[], noon()).passed());
    }

    #[test]
    fn empty_message_blocked() {
        let report = validate(&send("   "), &lead(), &signal(), &[], noon());
        assert!(report.has_error(RuleCode::EmptyMessage));
    }

    #[test]
    fn promise_pattern_blocked_but_booking_ack_allowed() {
        let promise = send("Greg will call you at 5pm");
        let report = validate(&promise, &lead(), &signal(), &[], noon());
        assert!(report.has_error(RuleCode::UnverifiablePromise));

        let ack = send("Thanks for confirming your booking for 5pm");
        let report = validate(&ack, &lead(), &signal(), &[], noon());
        assert!(!report.has_error(RuleCode::UnverifiablePromise));
        assert!(report.passed());

        let ack2 = send("We'll call you at 3pm as confirmed in your appointment.");
        let report = validate(&ack2, &lead(), &signal(), &[], noon());
        assert!(!report.has_error(RuleCode::UnverifiablePromise));
    }

    #[test]
    fn soft_rules_warn_without_blocking() {
        let long_body = "x".repeat(400);
        let mut action = send(&long_body);
        action.confidence = 0.2;
        let report = validate(&action, &lead(), &signal(), &[], noon());
        assert!(report.passed());
        assert!(report.warnings.iter().any(|w| w.code == RuleCode::MessageLength));
        assert!(report.warnings.iter().any(|w| w.code == RuleCode::LowConfidence));

        let salesy = send("Act now, limited time offer! Just checking in.");
        let report = validate(&salesy, &lead(), &signal(), &[], noon());
        assert!(report.passed());
        assert!(report.warnings.iter().any(|w| w.code == RuleCode::SalesyTone));
        assert!(report.warnings.iter().any(|w| w.code == RuleCode::StockPhrase));
    }
}
