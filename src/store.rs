//! Persistent-store boundary. The engine reads lead/communication/
//! appointment records and writes back review timestamps, communications,
//! consent changes, and outcome records; everything else about the CRM
//! schema stays on the other side of this trait.
//!
//! `InMemoryStore` is the dev/test backend and the reference semantics for
//! the lease compare-and-swap.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::lead::{
    AppointmentRecord, CallOutcomeRecord, Channel, CommunicationRecord, LeadSnapshot,
};
use crate::outcome::{MessageOutcome, OutcomeRecord, OutcomeStatus};

#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Candidate leads due for batch review at `now`: non-terminal,
    /// messaging-consented, flagged autonomous, not disabled, due by
    /// `next_review_at` (null counts as due), not contacted within
    /// `exclusion`, and not leased. Oldest due first, capped at `cap`.
    async fn due_leads(
        &self,
        now: DateTime<Utc>,
        cap: usize,
        exclusion: Duration,
    ) -> Result<Vec<LeadSnapshot>>;

    async fn lead(&self, id: &str) -> Result<Option<LeadSnapshot>>;

    /// Communications for a lead, most recent first.
    async fn communications(&self, lead_id: &str, limit: usize)
        -> Result<Vec<CommunicationRecord>>;

    async fn appointments(&self, lead_id: &str) -> Result<Vec<AppointmentRecord>>;

    async fn last_call_outcome(&self, lead_id: &str) -> Result<Option<CallOutcomeRecord>>;

    async fn append_communication(&self, record: CommunicationRecord) -> Result<()>;

    async fn set_next_review(&self, lead_id: &str, at: DateTime<Utc>) -> Result<()>;

    async fn mark_contacted(&self, lead_id: &str, at: DateTime<Utc>) -> Result<()>;

    async fn revoke_consent(&self, lead_id: &str, channel: Channel) -> Result<()>;

    async fn record_escalation(&self, lead_id: &str, reason: &str, at: DateTime<Utc>)
        -> Result<()>;

    /// Compare-and-swap lease on `locked_until`. Returns false when another
    /// worker holds a live lease.
    async fn acquire_lease(&self, lead_id: &str, now: DateTime<Utc>, ttl: Duration)
        -> Result<bool>;

    async fn release_lease(&self, lead_id: &str) -> Result<()>;

    async fn insert_outcome(&self, record: OutcomeRecord) -> Result<()>;

    /// Pending outcome records whose `evaluate_after` has passed.
    async fn due_outcomes(&self, now: DateTime<Utc>) -> Result<Vec<OutcomeRecord>>;

    async fn complete_outcome(
        &self,
        id: &str,
        outcome: MessageOutcome,
        response_latency_minutes: Option<i64>,
    ) -> Result<()>;

    /// Leads whose `next_review_at` is more than `threshold` in the past.
    async fn overdue_leads(
        &self,
        now: DateTime<Utc>,
        threshold: Duration,
    ) -> Result<Vec<LeadSnapshot>>;
}

#[derive(Default)]
struct Inner {
    leads: HashMap<String, LeadSnapshot>,
    communications: HashMap<String, Vec<CommunicationRecord>>,
    appointments: HashMap<String, Vec<AppointmentRecord>>,
    call_outcomes: HashMap<String, CallOutcomeRecord>,
    escalations: Vec<(String, String, DateTime<Utc>)>,
    outcomes: Vec<OutcomeRecord>,
}

/// In-memory store with the same visible semantics the SQL backend must
/// provide. Short critical sections only; no await while locked.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_lead(&self, lead: LeadSnapshot) {
        let mut g = self.lock();
        g.leads.insert(lead.id.clone(), lead);
    }

    pub fn seed_appointment(&self, appt: AppointmentRecord) {
        let mut g = self.lock();
        g.appointments
            .entry(appt.lead_id.clone())
            .or_default()
            .push(appt);
    }

    pub fn seed_call_outcome(&self, call: CallOutcomeRecord) {
        let mut g = self.lock();
        g.call_outcomes.insert(call.lead_id.clone(), call);
    }

    pub fn escalation_count(&self) -> usize {
        self.lock().escalations.len()
    }

    pub fn outcome_records(&self) -> Vec<OutcomeRecord> {
        self.lock().outcomes.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("store mutex poisoned")
    }
}

#[async_trait]
impl LeadStore for InMemoryStore {
    async fn due_leads(
        &self,
        now: DateTime<Utc>,
        cap: usize,
        exclusion: Duration,
    ) -> Result<Vec<LeadSnapshot>> {
        let g = self.lock();
        let mut due: Vec<LeadSnapshot> = g
            .leads
            .values()
            .filter(|l| !l.stage.is_terminal())
            .filter(|l| l.consent.any_messaging())
            .filter(|l| l.autonomous && !l.automation_disabled)
            .filter(|l| l.next_review_at.map(|t| t <= now).unwrap_or(true))
            .filter(|l| {
                l.last_contacted_at
                    .map(|t| now - t > exclusion)
                    .unwrap_or(true)
            })
            .filter(|l| l.locked_until.map(|t| t <= now).unwrap_or(true))
            .cloned()
            .collect();
        // Null next_review_at sorts first (never reviewed = oldest due).
        due.sort_by_key(|l| l.next_review_at.unwrap_or(DateTime::<Utc>::MIN_UTC));
        due.truncate(cap);
        Ok(due)
    }

    async fn lead(&self, id: &str) -> Result<Option<LeadSnapshot>> {
        Ok(self.lock().leads.get(id).cloned())
    }

    async fn communications(
        &self,
        lead_id: &str,
        limit: usize,
    ) -> Result<Vec<CommunicationRecord>> {
        let g = self.lock();
        let mut comms = g.communications.get(lead_id).cloned().unwrap_or_default();
        comms.sort_by_key(|c| std::cmp::Reverse(c.sent_at));
        comms.truncate(limit);
        Ok(comms)
    }

    async fn appointments(&self, lead_id: &str) -> Result<Vec<AppointmentRecord>> {
        Ok(self
            .lock()
            .appointments
            .get(lead_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn last_call_outcome(&self, lead_id: &str) -> Result<Option<CallOutcomeRecord>> {
        Ok(self.lock().call_outcomes.get(lead_id).cloned())
    }

    async fn append_communication(&self, record: CommunicationRecord) -> Result<()> {
        let mut g = self.lock();
        g.communications
            .entry(record.lead_id.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn set_next_review(&self, lead_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut g = self.lock();
        if let Some(lead) = g.leads.get_mut(lead_id) {
            lead.next_review_at = Some(at);
        }
        Ok(())
    }

    async fn mark_contacted(&self, lead_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut g = self.lock();
        if let Some(lead) = g.leads.get_mut(lead_id) {
            lead.last_contacted_at = Some(at);
        }
        Ok(())
    }

    async fn revoke_consent(&self, lead_id: &str, channel: Channel) -> Result<()> {
        let mut g = self.lock();
        if let Some(lead) = g.leads.get_mut(lead_id) {
            match channel {
                Channel::Sms => lead.consent.sms = false,
                Channel::Email => lead.consent.email = false,
            }
        }
        Ok(())
    }

    async fn record_escalation(
        &self,
        lead_id: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.lock()
            .escalations
            .push((lead_id.to_string(), reason.to_string(), at));
        Ok(())
    }

    async fn acquire_lease(
        &self,
        lead_id: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool> {
        let mut g = self.lock();
        let Some(lead) = g.leads.get_mut(lead_id) else {
            return Ok(false);
        };
        if lead.locked_until.map(|t| t > now).unwrap_or(false) {
            return Ok(false);
        }
        lead.locked_until = Some(now + ttl);
        Ok(true)
    }

    async fn release_lease(&self, lead_id: &str) -> Result<()> {
        let mut g = self.lock();
        if let Some(lead) = g.leads.get_mut(lead_id) {
            lead.locked_until = None;
        }
        Ok(())
    }

    async fn insert_outcome(&self, record: OutcomeRecord) -> Result<()> {
        self.lock().outcomes.push(record);
        Ok(())
    }

    async fn due_outcomes(&self, now: DateTime<Utc>) -> Result<Vec<OutcomeRecord>> {
        Ok(self
            .lock()
            .outcomes
            .iter()
            .filter(|r| r.status == OutcomeStatus::Pending && r.evaluate_after <= now)
            .cloned()
            .collect())
    }

    async fn complete_outcome(
        &self,
        id: &str,
        outcome: MessageOutcome,
        response_latency_minutes: Option<i64>,
    ) -> Result<()> {
        let mut g = self.lock();
        if let Some(record) = g.outcomes.iter_mut().find(|r| r.id == id) {
            record.status = OutcomeStatus::Evaluated;
            record.outcome = Some(outcome);
            record.response_latency_minutes = response_latency_minutes;
        }
        Ok(())
    }

    async fn overdue_leads(
        &self,
        now: DateTime<Utc>,
        threshold: Duration,
    ) -> Result<Vec<LeadSnapshot>> {
        Ok(self
            .lock()
            .leads
            .values()
            .filter(|l| !l.stage.is_terminal() && l.autonomous && !l.automation_disabled)
            .filter(|l| {
                l.next_review_at
                    .map(|t| now - t > threshold)
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lead::{Consent, Stage};
    use chrono::TimeZone;

    fn lead(id: &str, next_review: Option<DateTime<Utc>>) -> LeadSnapshot {
        LeadSnapshot {
            id: id.into(),
            name: id.into(),
            region: "UK".into(),
            stage: Stage::Nurturing,
            consent: Consent {
                sms: true,
                email: false,
                call: false,
            },
            phone: Some("+4470000001".into()),
            email: None,
            created_at: Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap(),
            last_contacted_at: None,
            next_review_at: next_review,
            application_started_at: None,
            attributes: Default::default(),
            autonomous: true,
            automation_disabled: false,
            locked_until: None,
        }
    }

    #[tokio::test]
    async fn due_selection_orders_and_filters() {
        let store = InMemoryStore::new();
        let now = Utc.with_ymd_and_hms(2025, 9, 8, 12, 0, 0).unwrap();

        store.seed_lead(lead("never-reviewed", None));
        store.seed_lead(lead("oldest", Some(now - Duration::hours(5))));
        store.seed_lead(lead("recent", Some(now - Duration::hours(1))));
        store.seed_lead(lead("future", Some(now + Duration::hours(1))));
        let mut terminal = lead("won", Some(now - Duration::hours(9)));
        terminal.stage = Stage::Converted;
        store.seed_lead(terminal);
        let mut contacted = lead("just-contacted", Some(now - Duration::hours(2)));
        contacted.last_contacted_at = Some(now - Duration::minutes(5));
        store.seed_lead(contacted);

        let due = store
            .due_leads(now, 50, Duration::minutes(10))
            .await
            .unwrap();
        let ids: Vec<&str> = due.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["never-reviewed", "oldest", "recent"]);
    }

    #[tokio::test]
    async fn lease_cas_semantics() {
        let store = InMemoryStore::new();
        let now = Utc.with_ymd_and_hms(2025, 9, 8, 12, 0, 0).unwrap();
        store.seed_lead(lead("l1", None));

        assert!(store
            .acquire_lease("l1", now, Duration::seconds(60))
            .await
            .unwrap());
        // Second acquire inside the TTL fails.
        assert!(!store
            .acquire_lease("l1", now + Duration::seconds(30), Duration::seconds(60))
            .await
            .unwrap());
        // Expired lease can be re-acquired without an explicit release.
        assert!(store
            .acquire_lease("l1", now + Duration::seconds(61), Duration::seconds(60))
            .await
            .unwrap());

        store.release_lease("l1").await.unwrap();
        assert!(store
            .acquire_lease("l1", now + Duration::seconds(62), Duration::seconds(60))
            .await
            .unwrap());
    }
}
