//! lead.rs — read-only domain views passed into the decision core.
//!
//! These structs mirror what the CRM store hands us per lead. The core never
//! mutates them; all writes go back through the `store` trait.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Discrete pipeline position of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    New,
    Contacted,
    Engaged,
    Nurturing,
    CallScheduled,
    CallCompleted,
    ApplicationStarted,
    Converted,
    Lost,
}

impl Stage {
    /// Terminal stages never receive newly *initiated* outbound contact from
    /// the batch path. Reactive replies remain allowed (see scheduler).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Converted | Stage::Lost)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    Sms,
    Email,
}

/// Per-channel consent flags as recorded in the CRM.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Consent {
    pub sms: bool,
    pub email: bool,
    pub call: bool,
}

impl Consent {
    pub fn allows(&self, channel: Channel) -> bool {
        match channel {
            Channel::Sms => self.sms,
            Channel::Email => self.email,
        }
    }

    /// True when at least one outbound messaging channel is consented.
    pub fn any_messaging(&self) -> bool {
        self.sms || self.email
    }
}

/// Snapshot of a lead at evaluation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadSnapshot {
    pub id: String,
    pub name: String,
    /// Region identifier used for local-time lookups (see `clock`).
    pub region: String,
    pub stage: Stage,
    pub consent: Consent,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_contacted_at: Option<DateTime<Utc>>,
    pub next_review_at: Option<DateTime<Utc>>,
    pub application_started_at: Option<DateTime<Utc>>,
    /// Free-form attribute bag (loan/purchase details, motivation, ...).
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    /// Flagged for autonomous management.
    pub autonomous: bool,
    /// Hard off-switch set by an advisor; excludes the lead from automation.
    pub automation_disabled: bool,
    /// Short-TTL processing lease (compare-and-swap in the store).
    pub locked_until: Option<DateTime<Utc>>,
}

impl LeadSnapshot {
    pub fn address_for(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::Sms => self.phone.as_deref(),
            Channel::Email => self.email.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Immutable, append-only communication record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunicationRecord {
    pub id: String,
    pub lead_id: String,
    pub direction: Direction,
    pub channel: Channel,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub manual: bool,
    #[serde(default)]
    pub sent_by: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentRecord {
    pub id: String,
    pub lead_id: String,
    pub status: AppointmentStatus,
    pub scheduled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub advisor: String,
}

impl AppointmentRecord {
    /// "Active future appointment": scheduled or confirmed, starting after `now`.
    pub fn is_active_future(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.status,
            AppointmentStatus::Scheduled | AppointmentStatus::Confirmed
        ) && self.scheduled_at > now
    }

    pub fn starts_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.is_active_future(now) && self.scheduled_at - now <= window
    }
}

/// Result of the most recent advisor call with the lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallOutcomeRecord {
    pub lead_id: String,
    pub completed_at: DateTime<Utc>,
    pub ready_to_proceed: bool,
    #[serde(default)]
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn terminal_stages() {
        assert!(Stage::Converted.is_terminal());
        assert!(Stage::Lost.is_terminal());
        assert!(!Stage::Nurturing.is_terminal());
        assert!(!Stage::ApplicationStarted.is_terminal());
    }

    #[test]
    fn active_future_appointment_requires_open_status() {
        let now = Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap();
        let mut appt = AppointmentRecord {
            id: "a1".into(),
            lead_id: "l1".into(),
            status: AppointmentStatus::Confirmed,
            scheduled_at: now + Duration::hours(3),
            created_at: now - Duration::days(1),
            advisor: "greg".into(),
        };
        assert!(appt.is_active_future(now));
        assert!(appt.starts_within(now, Duration::hours(24)));

        appt.status = AppointmentStatus::Cancelled;
        assert!(!appt.is_active_future(now));

        appt.status = AppointmentStatus::Scheduled;
        appt.scheduled_at = now - Duration::hours(1);
        assert!(!appt.is_active_future(now));
    }
}
