use chrono::{Duration, NaiveDate, Utc};
use std::sync::Arc;

use super::mock_notifier::RecordingNotifier;
use super::mock_store::{MockAttendeeStore, MockEventStore, MockMinorStore, MockVolunteerStore};
use crate::attendance::AttendanceContext;
use crate::models::{
    now_str, AttendeeRecord, AttendeeRef, AttendeeStatus, AttendeeType, Event, EventLocation,
    EventStatus, Minor,
};
use crate::retry::RetryPolicy;

/// The engine wired to in-memory stores, with handles kept for assertions.
pub struct TestContext {
    pub events: Arc<MockEventStore>,
    pub attendees: Arc<MockAttendeeStore>,
    pub minors: Arc<MockMinorStore>,
    pub volunteers: Arc<MockVolunteerStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub ctx: AttendanceContext,
}

impl TestContext {
    pub fn new() -> Self {
        let events = Arc::new(MockEventStore::new());
        let attendees = Arc::new(MockAttendeeStore::new());
        let minors = Arc::new(MockMinorStore::new());
        let volunteers = Arc::new(MockVolunteerStore::new());
        let notifier = Arc::new(RecordingNotifier::new());

        let ctx = AttendanceContext {
            events: events.clone(),
            attendees: attendees.clone(),
            minors: minors.clone(),
            volunteers: volunteers.clone(),
            notifier: notifier.clone(),
            retry: fast_retry(),
        };

        Self {
            events,
            attendees,
            minors,
            volunteers,
            notifier,
            ctx,
        }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new()
        .with_max_attempts(10)
        .with_initial_delay(std::time::Duration::from_millis(1))
        .with_max_delay(std::time::Duration::from_millis(5))
}

/// An active event starting tomorrow with a seeded counter of zero.
pub fn active_event(event_id: &str, capacity: u32) -> Event {
    let start = Utc::now() + Duration::days(1);
    let now = now_str();
    Event {
        event_id: event_id.to_string(),
        title: format!("Cleanup {}", event_id),
        description: None,
        start_time: start,
        end_time: start + Duration::hours(3),
        location: EventLocation {
            name: "Riverside Park".to_string(),
            address: None,
        },
        capacity,
        status: EventStatus::Active,
        cancellation_reason: None,
        active_count: Some(0),
        created_at: now.clone(),
        updated_at: now,
    }
}

fn record(
    event_id: &str,
    guardian_email: &str,
    attendee: AttendeeRef,
    status: AttendeeStatus,
) -> AttendeeRecord {
    let now = now_str();
    let mut record = AttendeeRecord::new_active(event_id, &attendee, guardian_email, &now);
    record.status = status;
    if status == AttendeeStatus::Cancelled {
        record.cancelled_at = Some(now);
    }
    record
}

pub fn guardian_record(event_id: &str, email: &str, status: AttendeeStatus) -> AttendeeRecord {
    let attendee = AttendeeRef {
        attendee_id: email.to_string(),
        attendee_type: AttendeeType::Guardian,
        display_name: email.to_string(),
    };
    record(event_id, email, attendee, status)
}

pub fn minor_record(
    event_id: &str,
    guardian_email: &str,
    minor_id: &str,
    status: AttendeeStatus,
) -> AttendeeRecord {
    let attendee = AttendeeRef {
        attendee_id: minor_id.to_string(),
        attendee_type: AttendeeType::Minor,
        display_name: format!("Kid {}", minor_id),
    };
    record(event_id, guardian_email, attendee, status)
}

pub fn minor(guardian_email: &str, minor_id: &str, birth_year: i32) -> Minor {
    let now = now_str();
    Minor {
        guardian_email: guardian_email.to_string(),
        minor_id: minor_id.to_string(),
        first_name: "Kid".to_string(),
        last_name: minor_id.to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(birth_year, 3, 1).unwrap_or_default(),
        email: None,
        created_at: now.clone(),
        updated_at: now,
    }
}
