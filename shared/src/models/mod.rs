use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub mod attendees;
pub mod events;
pub mod minors;
pub mod volunteers;

pub use attendees::{
    effective_rows, merge_generations, AttendeeRecord, AttendeeRef, AttendeeStatus, AttendeeType,
    LegacyRsvpRecord, PriorRegistration, StoredAttendee,
};
pub use events::{CancellationNotice, Event, EventLocation, EventStatus, EventSummary};
pub use minors::Minor;
pub use volunteers::{MetricDelta, Volunteer, VolunteerMetrics};

/// Current time as an RFC 3339 string, the format every record timestamp uses.
pub fn now_str() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Session row written by the external authentication flow.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Session {
    pub session_token: String,
    pub email: String,
    pub expires_at: String,
}
