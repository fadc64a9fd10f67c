//! In-memory stores with the same conditional-write rules as the DynamoDB ones.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Result, StoreError};
use crate::models::{
    merge_generations, AttendeeRecord, Event, EventStatus, LegacyRsvpRecord, MetricDelta, Minor,
    Session, StoredAttendee, Volunteer, VolunteerMetrics,
};
use crate::store::{
    AttendeeStore, AttendeeTransition, EventStore, MinorStore, SessionStore, VolunteerStore,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type Key = (String, String);

fn key(a: &str, b: &str) -> Key {
    (a.to_string(), b.to_string())
}

#[derive(Default)]
pub struct MockEventStore {
    events: Mutex<HashMap<String, Event>>,
    cas_failures: AtomicU32,
}

impl MockEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, event: Event) {
        lock(&self.events).insert(event.event_id.clone(), event);
    }

    pub fn get_sync(&self, event_id: &str) -> Option<Event> {
        lock(&self.events).get(event_id).cloned()
    }

    pub fn active_count(&self, event_id: &str) -> Option<u32> {
        self.get_sync(event_id).and_then(|e| e.active_count)
    }

    pub fn status(&self, event_id: &str) -> Option<EventStatus> {
        self.get_sync(event_id).map(|e| e.status)
    }

    /// Makes the next `n` counter writes lose as if another writer got there first.
    pub fn fail_next_cas(&self, n: u32) {
        self.cas_failures.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventStore for MockEventStore {
    async fn get_event(&self, event_id: &str) -> Result<Event> {
        self.get_sync(event_id)
            .ok_or_else(|| StoreError::NotFound(format!("event {}", event_id)))
    }

    async fn get_events(&self, event_ids: &[String]) -> Result<Vec<Event>> {
        let events = lock(&self.events);
        let unique: HashSet<&String> = event_ids.iter().collect();
        Ok(unique
            .into_iter()
            .filter_map(|id| events.get(id).cloned())
            .collect())
    }

    async fn list_events_by_status(
        &self,
        status: EventStatus,
        started_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Event>> {
        Ok(lock(&self.events)
            .values()
            .filter(|e| e.status == status)
            .filter(|e| started_before.map_or(true, |before| e.start_time < before))
            .cloned()
            .collect())
    }

    async fn create_event(&self, event: Event) -> Result<Event> {
        let mut events = lock(&self.events);
        if events.contains_key(&event.event_id) {
            return Err(StoreError::ConditionFailed(format!("event {}", event.event_id)));
        }
        events.insert(event.event_id.clone(), event.clone());
        Ok(event)
    }

    async fn transition_status(
        &self,
        event_id: &str,
        from: EventStatus,
        to: EventStatus,
        reason: Option<&str>,
        now: &str,
    ) -> Result<Event> {
        let mut events = lock(&self.events);
        match events.get_mut(event_id) {
            Some(event) if event.status == from => {
                event.status = to;
                event.updated_at = now.to_string();
                if let Some(reason) = reason {
                    event.cancellation_reason = Some(reason.to_string());
                }
                Ok(event.clone())
            }
            _ => Err(StoreError::ConditionFailed(format!("event {} status", event_id))),
        }
    }

    async fn compare_and_set_active_count(
        &self,
        event_id: &str,
        expected: Option<u32>,
        new: u32,
        require_active: bool,
        now: &str,
    ) -> Result<()> {
        let pending = self.cas_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.cas_failures.store(pending - 1, Ordering::SeqCst);
            return Err(StoreError::ConditionFailed("injected".to_string()));
        }

        let mut events = lock(&self.events);
        match events.get_mut(event_id) {
            Some(event)
                if event.active_count == expected && (!require_active || event.is_active()) =>
            {
                event.active_count = Some(new);
                event.updated_at = now.to_string();
                Ok(())
            }
            _ => Err(StoreError::ConditionFailed(format!("active_count on {}", event_id))),
        }
    }
}

#[derive(Default)]
pub struct MockAttendeeStore {
    records: Mutex<BTreeMap<Key, AttendeeRecord>>,
    legacy: Mutex<BTreeMap<Key, LegacyRsvpRecord>>,
    failing: Mutex<HashSet<String>>,
}

impl MockAttendeeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: AttendeeRecord) {
        lock(&self.records).insert(record.key(), record);
    }

    /// Seeds a legacy row the way the old single-attendee table stored it.
    pub fn insert_legacy(&self, event_id: &str, email: &str, status: &str) {
        let row: LegacyRsvpRecord = match serde_json::from_value(json!({
            "event_id": event_id,
            "email": email,
            "first_name": "Legacy",
            "last_name": "Volunteer",
            "status": status,
            "created_at": "2023-06-01T12:00:00",
        })) {
            Ok(row) => row,
            Err(e) => panic!("bad legacy fixture status {}: {}", status, e),
        };
        lock(&self.legacy).insert(key(event_id, email), row);
    }

    pub fn get(&self, event_id: &str, attendee_id: &str) -> Option<AttendeeRecord> {
        lock(&self.records).get(&key(event_id, attendee_id)).cloned()
    }

    pub fn legacy_status(&self, event_id: &str, email: &str) -> Option<String> {
        lock(&self.legacy)
            .get(&key(event_id, email))
            .and_then(|row| row.status)
            .map(|status| status.as_str().to_string())
    }

    /// Active registrations for the event across both generations.
    pub fn active_for_event(&self, event_id: &str) -> usize {
        let rows = self.rows_where(|r| r.event_id == event_id, |row| row.event_id == event_id);
        merge_generations(rows)
            .iter()
            .filter(|r| r.is_active())
            .count()
    }

    /// Every write for `attendee_id` fails with a non-conditional error.
    pub fn fail_writes_for(&self, attendee_id: &str) {
        lock(&self.failing).insert(attendee_id.to_string());
    }

    fn rows_where<C, L>(&self, current: C, legacy: L) -> Vec<StoredAttendee>
    where
        C: Fn(&AttendeeRecord) -> bool,
        L: Fn(&LegacyRsvpRecord) -> bool,
    {
        let mut rows: Vec<StoredAttendee> = lock(&self.records)
            .values()
            .filter(|r| current(r))
            .cloned()
            .map(StoredAttendee::Current)
            .collect();
        rows.extend(
            lock(&self.legacy)
                .values()
                .filter(|r| legacy(r))
                .cloned()
                .map(StoredAttendee::Legacy),
        );
        rows
    }

    fn check_failure(&self, attendee_id: &str) -> Result<()> {
        if lock(&self.failing).contains(attendee_id) {
            return Err(StoreError::Dynamo(format!(
                "injected write failure for {}",
                attendee_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AttendeeStore for MockAttendeeStore {
    async fn get_attendee(
        &self,
        event_id: &str,
        attendee_id: &str,
    ) -> Result<Option<AttendeeRecord>> {
        Ok(self.get(event_id, attendee_id))
    }

    async fn get_legacy_rsvp(
        &self,
        event_id: &str,
        email: &str,
    ) -> Result<Option<LegacyRsvpRecord>> {
        Ok(lock(&self.legacy).get(&key(event_id, email)).cloned())
    }

    async fn list_event_attendees(&self, event_id: &str) -> Result<Vec<StoredAttendee>> {
        Ok(self.rows_where(|r| r.event_id == event_id, |r| r.event_id == event_id))
    }

    async fn list_guardian_attendees(&self, guardian_email: &str) -> Result<Vec<StoredAttendee>> {
        Ok(self.rows_where(
            |r| r.guardian_email == guardian_email,
            |r| r.email == guardian_email,
        ))
    }

    async fn put_attendee_if_inactive(&self, record: AttendeeRecord) -> Result<()> {
        self.check_failure(&record.attendee_id)?;
        let mut records = lock(&self.records);
        if records.get(&record.key()).map_or(false, |r| r.is_active()) {
            return Err(StoreError::ConditionFailed(format!(
                "active record for {}",
                record.attendee_id
            )));
        }
        records.insert(record.key(), record);
        Ok(())
    }

    async fn insert_attendee_if_absent(&self, record: AttendeeRecord) -> Result<()> {
        self.check_failure(&record.attendee_id)?;
        let mut records = lock(&self.records);
        if records.contains_key(&record.key()) {
            return Err(StoreError::ConditionFailed(format!(
                "record exists for {}",
                record.attendee_id
            )));
        }
        records.insert(record.key(), record);
        Ok(())
    }

    async fn transition_attendee(
        &self,
        event_id: &str,
        attendee_id: &str,
        transition: AttendeeTransition,
    ) -> Result<AttendeeRecord> {
        self.check_failure(attendee_id)?;
        let mut records = lock(&self.records);
        match records.get_mut(&key(event_id, attendee_id)) {
            Some(record) if record.status == transition.from => {
                transition.apply(record);
                Ok(record.clone())
            }
            _ => Err(StoreError::ConditionFailed(format!(
                "{}/{} not {}",
                event_id, attendee_id, transition.from
            ))),
        }
    }
}

#[derive(Default)]
pub struct MockMinorStore {
    minors: Mutex<BTreeMap<Key, Minor>>,
}

impl MockMinorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, minor: Minor) {
        lock(&self.minors).insert(key(&minor.guardian_email, &minor.minor_id), minor);
    }

    pub fn get_sync(&self, guardian_email: &str, minor_id: &str) -> Option<Minor> {
        lock(&self.minors).get(&key(guardian_email, minor_id)).cloned()
    }
}

#[async_trait]
impl MinorStore for MockMinorStore {
    async fn list_minors(&self, guardian_email: &str) -> Result<Vec<Minor>> {
        Ok(lock(&self.minors)
            .values()
            .filter(|m| m.guardian_email == guardian_email)
            .cloned()
            .collect())
    }

    async fn get_minor(&self, guardian_email: &str, minor_id: &str) -> Result<Option<Minor>> {
        Ok(self.get_sync(guardian_email, minor_id))
    }

    async fn put_minor(&self, minor: Minor) -> Result<Minor> {
        self.insert(minor.clone());
        Ok(minor)
    }

    async fn delete_minor(&self, guardian_email: &str, minor_id: &str) -> Result<()> {
        lock(&self.minors)
            .remove(&key(guardian_email, minor_id))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("minor {}", minor_id)))
    }
}

#[derive(Default)]
pub struct MockVolunteerStore {
    volunteers: Mutex<HashMap<String, Volunteer>>,
}

impl MockVolunteerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, email: &str, first_name: &str, last_name: &str) {
        lock(&self.volunteers).insert(
            email.to_string(),
            Volunteer {
                email: email.to_string(),
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                phone: None,
                volunteer_metrics: VolunteerMetrics::default(),
            },
        );
    }

    pub fn metrics(&self, email: &str) -> VolunteerMetrics {
        lock(&self.volunteers)
            .get(email)
            .map(|v| v.volunteer_metrics.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl VolunteerStore for MockVolunteerStore {
    async fn get_volunteer(&self, email: &str) -> Result<Option<Volunteer>> {
        Ok(lock(&self.volunteers).get(email).cloned())
    }

    async fn increment_metric(&self, email: &str, metric: MetricDelta, by: i64) -> Result<()> {
        let mut volunteers = lock(&self.volunteers);
        let volunteer = volunteers
            .get_mut(email)
            .ok_or_else(|| StoreError::NotFound(format!("volunteer {}", email)))?;
        metric.apply(&mut volunteer.volunteer_metrics, by);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockSessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl MockSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_session(&self, token: &str, email: &str, expires_at: DateTime<Utc>) {
        lock(&self.sessions).insert(
            token.to_string(),
            Session {
                session_token: token.to_string(),
                email: email.to_string(),
                expires_at: expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            },
        );
    }
}

#[async_trait]
impl SessionStore for MockSessionStore {
    async fn get_session(&self, session_token: &str) -> Result<Option<Session>> {
        Ok(lock(&self.sessions).get(session_token).cloned())
    }

    async fn delete_session(&self, session_token: &str) -> Result<()> {
        lock(&self.sessions).remove(session_token);
        Ok(())
    }
}
