//! The attendance consistency engine.
//!
//! Every state change goes through per-key conditional writes in the stores;
//! nothing here holds state across calls. The capacity counter on each event
//! is kept in step with active records by [`counter`].

use log::{error, warn};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;
use crate::error::StoreError;
use crate::models::{AttendeeRecord, AttendeeStatus, AttendeeType, Event, EventStatus, MetricDelta};
use crate::notify::{Notifier, SnsNotifier};
use crate::retry::{retry_transient, RetryPolicy};
use crate::store::dynamo::{
    DynamoAttendeeStore, DynamoEventStore, DynamoMinorStore, DynamoVolunteerStore,
};
use crate::store::{AttendeeStore, EventStore, MinorStore, VolunteerStore};

pub mod admission;
pub mod cancellation;
pub mod counter;
pub mod guardian_query;
pub mod lifecycle;
pub mod roster;

/// Per-attendee outcome code for an entry that was already registered.
pub const DUPLICATE_ATTENDEE: &str = "DUPLICATE_ATTENDEE";
/// Logged when a notification could not be published.
pub const NOTIFICATION_DELIVERY_FAILURE: &str = "NOTIFICATION_DELIVERY_FAILURE";

#[derive(Error, Debug)]
pub enum AttendanceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Attendee {0} does not belong to the requesting guardian")]
    UnauthorizedAttendee(String),

    #[error("Not allowed to cancel the RSVP for {0}")]
    UnauthorizedCancellation(String),

    #[error("Event {0} not found")]
    EventNotFound(String),

    #[error("No RSVP for {attendee_id} at event {event_id}")]
    RsvpNotFound {
        event_id: String,
        attendee_id: String,
    },

    #[error("Minor {0} not found")]
    MinorNotFound(String),

    #[error("Event {event_id} is {status}, not active")]
    EventNotActive {
        event_id: String,
        status: EventStatus,
    },

    #[error("Cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Not enough capacity: {requested} requested, {remaining_slots} remaining")]
    CapacityExceeded { requested: u32, remaining_slots: u32 },

    #[error("Store temporarily unavailable: {0}")]
    Transient(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AttendanceError {
    pub fn code(&self) -> &'static str {
        match self {
            AttendanceError::Validation(_) => "VALIDATION_ERROR",
            AttendanceError::Forbidden(_) => "FORBIDDEN",
            AttendanceError::UnauthorizedAttendee(_) => "UNAUTHORIZED_ATTENDEE",
            AttendanceError::UnauthorizedCancellation(_) => "UNAUTHORIZED_CANCELLATION",
            AttendanceError::EventNotFound(_) => "EVENT_NOT_FOUND",
            AttendanceError::RsvpNotFound { .. } => "RSVP_NOT_FOUND",
            AttendanceError::MinorNotFound(_) => "MINOR_NOT_FOUND",
            AttendanceError::EventNotActive { .. } => "EVENT_NOT_ACTIVE",
            AttendanceError::InvalidTransition { .. } => "INVALID_TRANSITION",
            AttendanceError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            AttendanceError::Transient(_) => "TRANSIENT_STORE_ERROR",
            AttendanceError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<StoreError> for AttendanceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Throttled(msg) => AttendanceError::Transient(msg),
            other => AttendanceError::Internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AttendanceError>;

/// Everything the engine needs to talk to the outside world.
#[derive(Clone)]
pub struct AttendanceContext {
    pub events: Arc<dyn EventStore>,
    pub attendees: Arc<dyn AttendeeStore>,
    pub minors: Arc<dyn MinorStore>,
    pub volunteers: Arc<dyn VolunteerStore>,
    pub notifier: Arc<dyn Notifier>,
    pub retry: RetryPolicy,
}

impl AttendanceContext {
    /// Wires the engine to DynamoDB and SNS, sharing one client across tables.
    pub fn from_config(config: &Config, client: aws_sdk_dynamodb::Client) -> Self {
        Self {
            events: Arc::new(
                DynamoEventStore::with_client_and_table(
                    client.clone(),
                    config.events_table.clone(),
                )
                .with_retry(config.retry_policy()),
            ),
            attendees: Arc::new(DynamoAttendeeStore::with_client_and_tables(
                client.clone(),
                config.rsvps_table.clone(),
                config.legacy_rsvps_table.clone(),
            )),
            minors: Arc::new(DynamoMinorStore::with_client_and_table(
                client.clone(),
                config.minors_table.clone(),
            )),
            volunteers: Arc::new(DynamoVolunteerStore::with_client_and_table(
                client,
                config.volunteers_table.clone(),
            )),
            notifier: Arc::new(SnsNotifier::from_config(config)),
            retry: config.retry_policy(),
        }
    }

    /// Loads an event, retrying throttling and mapping absence to `EventNotFound`.
    pub async fn load_event(&self, event_id: &str) -> Result<Event> {
        let events = &self.events;
        retry_transient(&self.retry, "get event", || events.get_event(event_id))
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => AttendanceError::EventNotFound(event_id.to_string()),
                other => other.into(),
            })
    }

    /// Bumps a guardian's metric. Failures are logged and swallowed.
    pub async fn record_metric(&self, record: &AttendeeRecord, metric: MetricDelta) {
        self.adjust_metric(record, metric, 1).await
    }

    pub async fn adjust_metric(&self, record: &AttendeeRecord, metric: MetricDelta, by: i64) {
        if record.attendee_type != AttendeeType::Guardian {
            return;
        }
        if let Err(e) = self
            .volunteers
            .increment_metric(&record.guardian_email, metric, by)
            .await
        {
            match e {
                StoreError::NotFound(_) => warn!(
                    "No volunteer profile for {}, skipping {} metric",
                    record.guardian_email,
                    metric.attribute()
                ),
                other => error!(
                    "Failed to update {} for {}: {}",
                    metric.attribute(),
                    record.guardian_email,
                    other
                ),
            }
        }
    }
}

/// Per-status tallies over a set of attendee records.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub total: u32,
    pub active: u32,
    pub cancelled: u32,
    pub no_show: u32,
    pub attended: u32,
}

impl StatusCounts {
    pub fn tally<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a AttendeeRecord>,
    {
        let mut counts = StatusCounts::default();
        for record in records {
            counts.total += 1;
            match record.status {
                AttendeeStatus::Active => counts.active += 1,
                AttendeeStatus::Cancelled => counts.cancelled += 1,
                AttendeeStatus::NoShow => counts.no_show += 1,
                AttendeeStatus::Attended => counts.attended += 1,
            }
        }
        counts
    }
}
