use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Active,
    Completed,
    Cancelled,
    Archived,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Active => "active",
            EventStatus::Completed => "completed",
            EventStatus::Cancelled => "cancelled",
            EventStatus::Archived => "archived",
        }
    }

    /// Whether the lifecycle allows moving from `self` to `to`.
    pub fn can_transition_to(&self, to: EventStatus) -> bool {
        matches!(
            (self, to),
            (EventStatus::Active, EventStatus::Completed)
                | (EventStatus::Active, EventStatus::Cancelled)
                | (EventStatus::Completed, EventStatus::Archived)
        )
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct EventLocation {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl EventLocation {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "TBD"
        } else {
            &self.name
        }
    }
}

/// Event record. Older rows use `attendance_cap` for capacity, plain-string
/// locations, and timestamps without an offset; all of those still load.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Event {
    pub event_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(deserialize_with = "deserialize_event_time")]
    pub start_time: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_event_time")]
    pub end_time: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_location")]
    pub location: EventLocation,
    #[serde(alias = "attendance_cap")]
    pub capacity: u32,
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
    /// Denormalized count of active attendee records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_count: Option<u32>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Event {
    pub fn is_active(&self) -> bool {
        self.status == EventStatus::Active
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.end_time < now
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now
    }

    /// Hours from `now` until the start, to one decimal place.
    pub fn hours_before_start(&self, now: DateTime<Utc>) -> f64 {
        let hours = (self.start_time - now).num_seconds() as f64 / 3600.0;
        (hours * 10.0).round() / 10.0
    }

    pub fn summary(&self) -> EventSummary {
        EventSummary {
            event_id: self.event_id.clone(),
            title: self.title.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            location: self.location.clone(),
            status: self.status,
        }
    }
}

/// The slice of an event that gets joined onto attendee listings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EventSummary {
    pub event_id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub location: EventLocation,
    pub status: EventStatus,
}

/// Message published once per guardian when an event is cancelled.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CancellationNotice {
    #[serde(rename = "type")]
    pub notice_type: String,
    pub event_id: String,
    pub event_title: String,
    pub volunteer_email: String,
    pub reason: String,
    pub event_start_time: String,
    pub event_location: String,
}

impl CancellationNotice {
    pub const TYPE: &'static str = "event_cancellation";

    pub fn for_guardian(event: &Event, guardian_email: &str, reason: &str) -> Self {
        Self {
            notice_type: Self::TYPE.to_string(),
            event_id: event.event_id.clone(),
            event_title: event.title.clone(),
            volunteer_email: guardian_email.to_string(),
            reason: reason.to_string(),
            event_start_time: event.start_time.to_rfc3339_opts(SecondsFormat::Secs, true),
            event_location: event.location.display_name().to_string(),
        }
    }
}

/// Accepts RFC 3339 and offset-less ISO timestamps (treated as UTC).
fn deserialize_event_time<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_event_time(&raw).map_err(serde::de::Error::custom)
}

pub fn parse_event_time(raw: &str) -> Result<DateTime<Utc>, String> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(format!("invalid event timestamp '{}'", raw))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LocationShape {
    Plain(String),
    Structured {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        address: Option<String>,
    },
}

fn deserialize_location<'de, D>(deserializer: D) -> Result<EventLocation, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match LocationShape::deserialize(deserializer)? {
        LocationShape::Plain(name) => EventLocation {
            name,
            address: None,
        },
        LocationShape::Structured { name, address } => EventLocation {
            name: name.unwrap_or_default(),
            address,
        },
    })
}
