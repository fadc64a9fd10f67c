use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AttendeeType {
    /// Older clients and rows call the account holder a "volunteer"
    #[serde(alias = "volunteer")]
    Guardian,
    Minor,
}

impl fmt::Display for AttendeeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttendeeType::Guardian => f.write_str("guardian"),
            AttendeeType::Minor => f.write_str("minor"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttendeeStatus {
    #[default]
    Active,
    Cancelled,
    NoShow,
    Attended,
}

impl AttendeeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendeeStatus::Active => "active",
            AttendeeStatus::Cancelled => "cancelled",
            AttendeeStatus::NoShow => "no_show",
            AttendeeStatus::Attended => "attended",
        }
    }
}

impl fmt::Display for AttendeeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registration that was superseded when the attendee signed up again.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PriorRegistration {
    pub status: AttendeeStatus,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours_before_event: Option<f64>,
}

/// Current-generation attendee record, keyed by `(event_id, attendee_id)`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AttendeeRecord {
    pub event_id: String,
    pub attendee_id: String,
    pub guardian_email: String,
    pub attendee_type: AttendeeType,
    pub display_name: String,
    pub status: AttendeeStatus,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
    /// Hours between the cancellation and the event start, negative once
    /// the event had started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours_before_event: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendance_marked_at: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub registration_history: Vec<PriorRegistration>,
}

impl AttendeeRecord {
    pub fn new_active(event_id: &str, attendee: &AttendeeRef, guardian_email: &str, now: &str) -> Self {
        Self {
            event_id: event_id.to_string(),
            attendee_id: attendee.attendee_id.clone(),
            guardian_email: guardian_email.to_string(),
            attendee_type: attendee.attendee_type,
            display_name: attendee.display_name.clone(),
            status: AttendeeStatus::Active,
            created_at: now.to_string(),
            updated_at: now.to_string(),
            cancelled_at: None,
            cancellation_reason: None,
            hours_before_event: None,
            attendance_marked_at: None,
            registration_history: Vec::new(),
        }
    }

    /// A fresh active registration replacing `self`, which must be inactive.
    /// The replaced registration is kept in `registration_history`.
    pub fn reregistered(&self, attendee: &AttendeeRef, guardian_email: &str, now: &str) -> Self {
        let mut fresh = Self::new_active(&self.event_id, attendee, guardian_email, now);
        fresh.registration_history = self.registration_history.clone();
        fresh.registration_history.push(PriorRegistration {
            status: self.status,
            created_at: self.created_at.clone(),
            cancelled_at: self.cancelled_at.clone(),
            cancellation_reason: self.cancellation_reason.clone(),
            hours_before_event: self.hours_before_event,
        });
        fresh
    }

    pub fn is_active(&self) -> bool {
        self.status == AttendeeStatus::Active
    }

    /// A guardian owns their own record and the records of their minors.
    pub fn is_owned_by(&self, guardian_email: &str) -> bool {
        match self.attendee_type {
            AttendeeType::Guardian => {
                self.attendee_id == guardian_email && self.guardian_email == guardian_email
            }
            AttendeeType::Minor => self.guardian_email == guardian_email,
        }
    }

    pub fn key(&self) -> (String, String) {
        (self.event_id.clone(), self.attendee_id.clone())
    }

    pub fn attendee_ref(&self) -> AttendeeRef {
        AttendeeRef {
            attendee_id: self.attendee_id.clone(),
            attendee_type: self.attendee_type,
            display_name: self.display_name.clone(),
        }
    }
}

/// Identifies one attendee in request/response listings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AttendeeRef {
    pub attendee_id: String,
    #[serde(rename = "type")]
    pub attendee_type: AttendeeType,
    pub display_name: String,
}

/// Pre-multi-attendee RSVP row, keyed by `(event_id, email)`. Read-only.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LegacyRsvpRecord {
    pub event_id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub status: Option<AttendeeStatus>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub cancelled_at: Option<String>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    #[serde(default)]
    pub hours_before_event: Option<f64>,
    #[serde(default)]
    pub no_show: bool,
}

impl LegacyRsvpRecord {
    /// Interprets the row as a guardian registering themselves.
    pub fn normalize(&self) -> AttendeeRecord {
        let status = match self.status {
            Some(AttendeeStatus::Active) | None if self.no_show => AttendeeStatus::NoShow,
            Some(status) => status,
            None => AttendeeStatus::Active,
        };
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let created_at = self.created_at.clone().unwrap_or_default();

        AttendeeRecord {
            event_id: self.event_id.clone(),
            attendee_id: self.email.clone(),
            guardian_email: self.email.clone(),
            attendee_type: AttendeeType::Guardian,
            display_name: if name.is_empty() { self.email.clone() } else { name },
            status,
            updated_at: self.updated_at.clone().unwrap_or_else(|| created_at.clone()),
            created_at,
            cancelled_at: self.cancelled_at.clone(),
            cancellation_reason: self.cancellation_reason.clone(),
            hours_before_event: self.hours_before_event,
            attendance_marked_at: None,
            registration_history: Vec::new(),
        }
    }
}

/// An attendee row as read from either table generation.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredAttendee {
    Current(AttendeeRecord),
    Legacy(LegacyRsvpRecord),
}

impl StoredAttendee {
    pub fn key(&self) -> (String, String) {
        match self {
            StoredAttendee::Current(record) => record.key(),
            StoredAttendee::Legacy(legacy) => (legacy.event_id.clone(), legacy.email.clone()),
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, StoredAttendee::Legacy(_))
    }

    pub fn into_current(self) -> AttendeeRecord {
        match self {
            StoredAttendee::Current(record) => record,
            StoredAttendee::Legacy(legacy) => legacy.normalize(),
        }
    }
}

/// Keeps one row per key, ordered by key. A current record supersedes a
/// legacy row with the same key.
pub fn effective_rows(rows: Vec<StoredAttendee>) -> Vec<StoredAttendee> {
    let mut merged: BTreeMap<(String, String), StoredAttendee> = BTreeMap::new();
    for row in rows {
        let key = row.key();
        match merged.get(&key) {
            Some(StoredAttendee::Current(_)) if row.is_legacy() => {}
            _ => {
                merged.insert(key, row);
            }
        }
    }
    merged.into_values().collect()
}

/// [`effective_rows`], normalized to the current shape.
pub fn merge_generations(rows: Vec<StoredAttendee>) -> Vec<AttendeeRecord> {
    effective_rows(rows)
        .into_iter()
        .map(StoredAttendee::into_current)
        .collect()
}
