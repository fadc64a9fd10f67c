use cleanup_shared::attendance::admission::RequestedAttendee;
use cleanup_shared::models::AttendeeStatus;
use cleanup_shared::models::EventLocation;
use serde::Deserialize;

// Request DTOs
#[derive(Deserialize, Debug)]
pub struct CheckRsvpRequest {
    pub event_id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct SubmitRsvpRequest {
    pub event_id: String,
    /// Must match the session identity when present
    #[serde(default)]
    pub guardian_email: Option<String>,
    pub attendees: Vec<RequestedAttendee>,
}

#[derive(Deserialize, Debug)]
pub struct CancelRsvpRequest {
    pub event_id: String,
    pub attendee_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ListRsvpsRequest {
    pub event_id: String,
}

#[derive(Deserialize, Debug)]
pub struct MarkAttendanceRequest {
    pub event_id: String,
    pub attendee_id: String,
    pub status: AttendeeStatus,
}

#[derive(Deserialize, Debug, Default)]
pub struct GuardianRsvpsQuery {
    #[serde(default)]
    pub status: Option<AttendeeStatus>,
}

#[derive(Deserialize, Debug)]
pub struct CreateEventRequest {
    /// Generated when absent
    #[serde(default)]
    pub event_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub location: Option<EventLocation>,
    pub capacity: u32,
}

fn default_archive_status() -> String {
    "completed".to_string()
}

fn default_notify() -> bool {
    true
}

/// Body of `POST /events/lifecycle`, dispatched on `action`.
#[derive(Deserialize, Debug)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LifecycleRequest {
    UpdateCompletedEvents,
    ArchiveEvents {
        archive_before_date: String,
        #[serde(default = "default_archive_status")]
        archive_status: String,
    },
    CancelEvent {
        event_id: String,
        #[serde(default)]
        reason: Option<String>,
        #[serde(default = "default_notify")]
        notify_volunteers: bool,
    },
    CategorizeEvents,
}
