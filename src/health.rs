//! # Deal Health Analyzer
//! Pure, testable logic that maps `(lead, communications, appointments,
//! call outcome)` → `EngagementSignal`. No I/O, suitable for unit tests and
//! future offline evaluation.
//!
//! Policy: temperature is a priority ladder, first match wins; contextual
//! urgency can force the result upward afterwards. Missing optional inputs
//! (no appointments, no call outcome, no replies) degrade to the default
//! branches instead of erroring.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::lead::{
    AppointmentRecord, CallOutcomeRecord, CommunicationRecord, Direction, LeadSnapshot, Stage,
};
use crate::sentiment::{self, Tone};

/// Coarse engagement classification. Ordering is hottest-first so that a
/// larger variant means a colder deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Temperature {
    Hot,
    Warm,
    Cooling,
    Cold,
    Dead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

/// Contextual urgency, checked in priority order; only the first match
/// applies. The ordering is a deliberate tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    Urgent,
    Hot,
    Stuck,
    Appointment,
}

/// Compact engagement signal, recomputed fresh every evaluation.
/// Never persisted as source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementSignal {
    pub temperature: Temperature,
    pub trend: Trend,
    pub tone: Tone,
    pub objection: bool,
    pub question_count: usize,
    pub urgency: Option<Urgency>,
    pub active_appointment: bool,
    pub hours_since_contact: f64,
    pub reply_count: usize,
    pub next_review_hours: f64,
    /// Short human-readable trail for ops/status display.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

const STUCK_APPLICATION_HOURS: i64 = 12;
const APPOINTMENT_SOON_HOURS: i64 = 24;
const JUST_COMPLETED_CALL_HOURS: i64 = 24;

/// Compute the engagement signal for one lead.
pub fn assess(
    lead: &LeadSnapshot,
    communications: &[CommunicationRecord],
    appointments: &[AppointmentRecord],
    call_outcome: Option<&CallOutcomeRecord>,
    now: DateTime<Utc>,
) -> EngagementSignal {
    let anchor = match lead.last_contacted_at {
        Some(lc) => lc.max(lead.created_at),
        None => lead.created_at,
    };
    let hours_since_contact = (now - anchor).num_minutes() as f64 / 60.0;

    let reply_count = communications
        .iter()
        .filter(|c| c.direction == Direction::Inbound)
        .count();
    let trend = reply_trend(communications, now);

    let last_inbound = communications
        .iter()
        .filter(|c| c.direction == Direction::Inbound)
        .max_by_key(|c| c.sent_at);
    let (tone, objection, question_count) = match last_inbound {
        Some(msg) => {
            let v = sentiment::classify(&msg.content);
            let questions = msg.content.matches('?').count();
            (v.tone, v.objection, questions)
        }
        None => (Tone::Unknown, false, 0),
    };

    let active_appointment = appointments.iter().any(|a| a.is_active_future(now));
    let urgency = contextual_urgency(lead, appointments, call_outcome, now);

    let mut reasons = Vec::new();
    let mut temperature = classify_temperature(
        lead,
        reply_count,
        hours_since_contact,
        tone,
        objection,
        active_appointment,
        &mut reasons,
    );

    // Urgency forcing: urgent/hot contexts outrank the raw signals, and a
    // stuck-but-salvageable application must not be starved of attention.
    match urgency {
        Some(u @ (Urgency::Urgent | Urgency::Hot)) => {
            if temperature != Temperature::Hot {
                reasons.push(format!("urgency {u:?} forces HOT"));
            }
            temperature = Temperature::Hot;
        }
        Some(Urgency::Stuck) => {
            if temperature > Temperature::Warm {
                reasons.push("stuck application forces WARM".to_string());
                temperature = Temperature::Warm;
            }
        }
        _ => {}
    }

    EngagementSignal {
        temperature,
        trend,
        tone,
        objection,
        question_count,
        urgency,
        active_appointment,
        hours_since_contact,
        reply_count,
        next_review_hours: review_interval_hours(temperature),
        reasons,
    }
}

/// Compare inbound reply counts in the two adjacent 3-day windows.
fn reply_trend(communications: &[CommunicationRecord], now: DateTime<Utc>) -> Trend {
    let recent_start = now - Duration::days(3);
    let previous_start = now - Duration::days(6);

    let mut recent = 0usize;
    let mut previous = 0usize;
    for c in communications {
        if c.direction != Direction::Inbound {
            continue;
        }
        if c.sent_at > recent_start && c.sent_at <= now {
            recent += 1;
        } else if c.sent_at > previous_start && c.sent_at <= recent_start {
            previous += 1;
        }
    }

    if recent > previous {
        Trend::Improving
    } else if recent < previous && previous > 0 {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

/// Priority-ordered urgency check. Only the first match applies.
fn contextual_urgency(
    lead: &LeadSnapshot,
    appointments: &[AppointmentRecord],
    call_outcome: Option<&CallOutcomeRecord>,
    now: DateTime<Utc>,
) -> Option<Urgency> {
    if has_accepted_offer(lead) {
        return Some(Urgency::Urgent);
    }
    if let Some(call) = call_outcome {
        if call.ready_to_proceed
            && now - call.completed_at <= Duration::hours(JUST_COMPLETED_CALL_HOURS)
        {
            return Some(Urgency::Hot);
        }
    }
    if lead.stage == Stage::ApplicationStarted {
        if let Some(started) = lead.application_started_at {
            if now - started > Duration::hours(STUCK_APPLICATION_HOURS) {
                return Some(Urgency::Stuck);
            }
        }
    }
    if appointments
        .iter()
        .any(|a| a.starts_within(now, Duration::hours(APPOINTMENT_SOON_HOURS)))
    {
        return Some(Urgency::Appointment);
    }
    None
}

fn has_accepted_offer(lead: &LeadSnapshot) -> bool {
    lead.attributes
        .get("motivation")
        .map(|m| {
            let m = m.to_lowercase();
            m.contains("accepted offer") || m == "accepted_offer"
        })
        .unwrap_or(false)
}

/// The temperature ladder, evaluated in priority order, first match wins.
fn classify_temperature(
    lead: &LeadSnapshot,
    reply_count: usize,
    hours_since_contact: f64,
    tone: Tone,
    objection: bool,
    active_appointment: bool,
    reasons: &mut Vec<String>,
) -> Temperature {
    if active_appointment || lead.stage == Stage::CallScheduled {
        reasons.push("appointment on the books".to_string());
        return Temperature::Hot;
    }
    if reply_count > 2 && hours_since_contact < 12.0 && tone == Tone::Enthusiastic {
        reasons.push("engaged and enthusiastic".to_string());
        return Temperature::Hot;
    }
    if reply_count >= 1 && hours_since_contact < 48.0 && !objection {
        reasons.push("responsive within 48h".to_string());
        return Temperature::Warm;
    }
    if reply_count >= 1 && hours_since_contact < 120.0 {
        return Temperature::Cooling;
    }
    if reply_count == 0 && hours_since_contact > 96.0 {
        reasons.push("no replies in 4+ days".to_string());
        return Temperature::Dead;
    }
    if reply_count == 0 && hours_since_contact > 48.0 {
        return Temperature::Cold;
    }
    Temperature::Cooling
}

/// The sole scheduling hint consumed by the batch runner.
pub fn review_interval_hours(temperature: Temperature) -> f64 {
    match temperature {
        Temperature::Hot => 0.5,
        Temperature::Warm => 2.0,
        Temperature::Cooling => 6.0,
        Temperature::Cold => 24.0,
        Temperature::Dead => 168.0,
    }
}
