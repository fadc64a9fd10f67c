use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    AttendeeRecord, AttendeeStatus, Event, EventStatus, LegacyRsvpRecord, MetricDelta, Minor,
    Session, StoredAttendee, Volunteer,
};

pub mod dynamo;

/// State change applied to an attendee record whose status is `from`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendeeTransition {
    pub from: AttendeeStatus,
    pub to: AttendeeStatus,
    pub at: String,
    pub reason: Option<String>,
    /// Only set on cancellations
    pub hours_before_event: Option<f64>,
}

impl AttendeeTransition {
    pub fn cancellation(at: String, reason: Option<String>, hours_before_event: Option<f64>) -> Self {
        Self {
            from: AttendeeStatus::Active,
            to: AttendeeStatus::Cancelled,
            at,
            reason,
            hours_before_event,
        }
    }

    /// `active -> to`, where `to` is an attendance status.
    pub fn attendance(to: AttendeeStatus, at: String) -> Self {
        Self {
            from: AttendeeStatus::Active,
            to,
            at,
            reason: None,
            hours_before_event: None,
        }
    }

    /// Undoes an attendance mark, `from -> active`.
    pub fn reactivation(from: AttendeeStatus, at: String) -> Self {
        Self {
            from,
            to: AttendeeStatus::Active,
            at,
            reason: None,
            hours_before_event: None,
        }
    }

    /// Applies the transition to an in-memory copy, mirroring the store update.
    pub fn apply(&self, record: &mut AttendeeRecord) {
        record.status = self.to;
        record.updated_at = self.at.clone();
        match self.to {
            AttendeeStatus::Cancelled => {
                record.cancelled_at = Some(self.at.clone());
                record.cancellation_reason = self.reason.clone();
                record.hours_before_event = self.hours_before_event;
            }
            AttendeeStatus::NoShow | AttendeeStatus::Attended => {
                record.attendance_marked_at = Some(self.at.clone());
            }
            AttendeeStatus::Active => {
                record.attendance_marked_at = None;
            }
        }
    }
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Fails with `StoreError::NotFound` when the event does not exist.
    async fn get_event(&self, event_id: &str) -> Result<Event>;

    /// Events that no longer exist are left out of the result.
    async fn get_events(&self, event_ids: &[String]) -> Result<Vec<Event>>;

    async fn list_events_by_status(
        &self,
        status: EventStatus,
        started_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Event>>;

    async fn create_event(&self, event: Event) -> Result<Event>;

    /// Moves the event from `from` to `to`; `ConditionFailed` when the stored
    /// status is not `from`.
    async fn transition_status(
        &self,
        event_id: &str,
        from: EventStatus,
        to: EventStatus,
        reason: Option<&str>,
        now: &str,
    ) -> Result<Event>;

    /// Sets `active_count` to `new` only if it currently equals `expected`
    /// (`None` meaning the attribute is absent). With `require_active` the
    /// event must also still be active.
    async fn compare_and_set_active_count(
        &self,
        event_id: &str,
        expected: Option<u32>,
        new: u32,
        require_active: bool,
        now: &str,
    ) -> Result<()>;
}

#[async_trait]
pub trait AttendeeStore: Send + Sync {
    async fn get_attendee(&self, event_id: &str, attendee_id: &str)
        -> Result<Option<AttendeeRecord>>;

    async fn get_legacy_rsvp(&self, event_id: &str, email: &str)
        -> Result<Option<LegacyRsvpRecord>>;

    /// Rows of both generations for one event, unmerged.
    async fn list_event_attendees(&self, event_id: &str) -> Result<Vec<StoredAttendee>>;

    /// Rows of both generations owned by one guardian, unmerged.
    async fn list_guardian_attendees(&self, guardian_email: &str) -> Result<Vec<StoredAttendee>>;

    /// Writes `record` unless an active record already exists at its key.
    async fn put_attendee_if_inactive(&self, record: AttendeeRecord) -> Result<()>;

    /// Writes `record` only if nothing exists at its key yet.
    async fn insert_attendee_if_absent(&self, record: AttendeeRecord) -> Result<()>;

    /// Applies `transition` if the record's status is `transition.from` and
    /// returns the updated record; `ConditionFailed` otherwise.
    async fn transition_attendee(
        &self,
        event_id: &str,
        attendee_id: &str,
        transition: AttendeeTransition,
    ) -> Result<AttendeeRecord>;
}

#[async_trait]
pub trait MinorStore: Send + Sync {
    async fn list_minors(&self, guardian_email: &str) -> Result<Vec<Minor>>;
    async fn get_minor(&self, guardian_email: &str, minor_id: &str) -> Result<Option<Minor>>;
    async fn put_minor(&self, minor: Minor) -> Result<Minor>;
    /// `NotFound` if the guardian has no such minor.
    async fn delete_minor(&self, guardian_email: &str, minor_id: &str) -> Result<()>;
}

#[async_trait]
pub trait VolunteerStore: Send + Sync {
    async fn get_volunteer(&self, email: &str) -> Result<Option<Volunteer>>;
    async fn increment_metric(&self, email: &str, metric: MetricDelta, by: i64) -> Result<()>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_session(&self, session_token: &str) -> Result<Option<Session>>;
    async fn delete_session(&self, session_token: &str) -> Result<()>;
}

/// Looks up the registration at `(event_id, attendee_id)`, falling back to the
/// legacy table when no current record exists.
pub async fn effective_attendee<S>(
    store: &S,
    event_id: &str,
    attendee_id: &str,
) -> Result<Option<StoredAttendee>>
where
    S: AttendeeStore + ?Sized,
{
    if let Some(record) = store.get_attendee(event_id, attendee_id).await? {
        return Ok(Some(StoredAttendee::Current(record)));
    }
    Ok(store
        .get_legacy_rsvp(event_id, attendee_id)
        .await?
        .map(StoredAttendee::Legacy))
}
