//! Admission of guardians and their minors onto an event.

use chrono::Utc;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use super::cancellation::apply_transition;
use super::counter::{self, CounterState};
use super::{AttendanceContext, AttendanceError, Result, DUPLICATE_ATTENDEE};
use crate::directory::Directory;
use crate::models::{
    now_str, AttendeeRecord, AttendeeRef, AttendeeStatus, AttendeeType, Event, MetricDelta,
    StoredAttendee,
};
use crate::retry::retry_transient;
use crate::store::{effective_attendee, AttendeeTransition};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RequestedAttendee {
    #[serde(rename = "type")]
    pub attendee_type: AttendeeType,
    pub id: String,
}

impl RequestedAttendee {
    pub fn guardian(email: &str) -> Self {
        Self {
            attendee_type: AttendeeType::Guardian,
            id: email.to_string(),
        }
    }

    pub fn minor(minor_id: &str) -> Self {
        Self {
            attendee_type: AttendeeType::Minor,
            id: minor_id.to_string(),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RejectedAttendee {
    pub attendee_id: String,
    #[serde(rename = "type")]
    pub attendee_type: AttendeeType,
    pub code: String,
    pub reason: String,
}

/// An entry that already held an active registration; it used no capacity.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DuplicateAttendee {
    #[serde(flatten)]
    pub attendee: AttendeeRef,
    pub code: String,
}

impl DuplicateAttendee {
    pub fn new(attendee: AttendeeRef) -> Self {
        Self {
            attendee,
            code: DUPLICATE_ATTENDEE.to_string(),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FailedAttendee {
    pub attendee_id: String,
    #[serde(rename = "type")]
    pub attendee_type: AttendeeType,
    pub reason: String,
}

impl FailedAttendee {
    pub fn new(attendee: &AttendeeRef, reason: impl ToString) -> Self {
        Self {
            attendee_id: attendee.attendee_id.clone(),
            attendee_type: attendee.attendee_type,
            reason: reason.to_string(),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct AdmissionOutcome {
    pub registered: Vec<AttendeeRef>,
    pub already_registered: Vec<DuplicateAttendee>,
    pub rejected: Vec<RejectedAttendee>,
    pub failed: Vec<FailedAttendee>,
    pub active_count: u32,
    pub capacity: u32,
    pub remaining_capacity: u32,
}

impl AdmissionOutcome {
    fn new(
        already_registered: Vec<DuplicateAttendee>,
        rejected: Vec<RejectedAttendee>,
        state: CounterState,
    ) -> Self {
        Self {
            registered: Vec::new(),
            already_registered,
            rejected,
            failed: Vec::new(),
            active_count: state.active_count,
            capacity: state.capacity,
            remaining_capacity: state.remaining(),
        }
    }

    fn set_state(&mut self, state: CounterState) {
        self.active_count = state.active_count;
        self.capacity = state.capacity;
        self.remaining_capacity = state.remaining();
    }
}

/// Registration status of one guardian email for the public check endpoint.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RegistrationCheck {
    pub event_id: String,
    #[serde(rename = "isRegistered")]
    pub is_registered: bool,
    pub status: Option<AttendeeStatus>,
    pub active_count: u32,
    pub capacity: u32,
}

pub async fn check_registration(
    ctx: &AttendanceContext,
    event_id: &str,
    email: Option<&str>,
) -> Result<RegistrationCheck> {
    let event = ctx.load_event(event_id).await?;
    let state = counter::current_state(ctx, &event).await?;

    // Minor records are keyed by minor id and are never visible here.
    let status = match email.map(str::trim).filter(|e| !e.is_empty()) {
        Some(email) => effective_attendee(ctx.attendees.as_ref(), event_id, email)
            .await?
            .map(StoredAttendee::into_current)
            .filter(|record| record.attendee_type == AttendeeType::Guardian)
            .map(|record| record.status),
        None => None,
    };

    Ok(RegistrationCheck {
        event_id: event_id.to_string(),
        is_registered: status == Some(AttendeeStatus::Active),
        status,
        active_count: state.active_count,
        capacity: state.capacity,
    })
}

/// Registers the requested attendees for `guardian_email`.
///
/// Entries the guardian does not own are rejected, entries that already hold
/// an active registration are reported as such, and the remainder is admitted
/// only if the event has room for all of them.
pub async fn submit(
    ctx: &AttendanceContext,
    event_id: &str,
    guardian_email: &str,
    requested: &[RequestedAttendee],
) -> Result<AdmissionOutcome> {
    if event_id.trim().is_empty() {
        return Err(AttendanceError::Validation("event_id is required".to_string()));
    }
    if requested.is_empty() {
        return Err(AttendanceError::Validation(
            "At least one attendee is required".to_string(),
        ));
    }

    let event = ctx.load_event(event_id).await?;
    if !event.is_active() {
        return Err(AttendanceError::EventNotActive {
            event_id: event_id.to_string(),
            status: event.status,
        });
    }

    let resolution = Directory::new(ctx)
        .resolve_attendees(guardian_email, requested)
        .await?;

    let mut already_registered = Vec::new();
    let mut net_new: Vec<(AttendeeRef, Option<AttendeeRecord>)> = Vec::new();
    for attendee in resolution.owned {
        let existing =
            effective_attendee(ctx.attendees.as_ref(), event_id, &attendee.attendee_id).await?;
        match existing.map(StoredAttendee::into_current) {
            Some(record) if record.is_active() => {
                already_registered.push(DuplicateAttendee::new(attendee))
            }
            prior => net_new.push((attendee, prior)),
        }
    }

    if net_new.is_empty() {
        debug!(
            "Nothing new to register on {} for {}",
            event_id, guardian_email
        );
        let state = counter::current_state(ctx, &event).await?;
        return Ok(AdmissionOutcome::new(
            already_registered,
            resolution.rejected,
            state,
        ));
    }

    let state = counter::reserve(ctx, event_id, net_new.len() as u32).await?;
    let mut outcome = AdmissionOutcome::new(already_registered, resolution.rejected, state);

    let now = now_str();
    let mut unused_slots = 0;
    let mut written = Vec::new();
    for (attendee, prior) in net_new {
        let record = match &prior {
            Some(previous) => previous.reregistered(&attendee, guardian_email, &now),
            None => AttendeeRecord::new_active(event_id, &attendee, guardian_email, &now),
        };
        let attendees = &ctx.attendees;
        let put = retry_transient(&ctx.retry, "put attendee", || {
            attendees.put_attendee_if_inactive(record.clone())
        })
        .await;

        match put {
            Ok(()) => written.push(record),
            Err(e) if e.is_condition_failed() => {
                debug!(
                    "{} registered concurrently on {}",
                    attendee.attendee_id, event_id
                );
                unused_slots += 1;
                outcome
                    .already_registered
                    .push(DuplicateAttendee::new(attendee));
            }
            Err(e) => {
                warn!(
                    "Failed to write RSVP for {} on {}: {}",
                    attendee.attendee_id, event_id, e
                );
                unused_slots += 1;
                outcome.failed.push(FailedAttendee::new(&attendee, e));
            }
        }
    }

    if unused_slots > 0 {
        let state = counter::release_after_commit(ctx, &event, unused_slots).await;
        outcome.set_state(state);
    }

    // The event may have closed after the reservation, with its cascade
    // running before these records existed.
    match ctx.load_event(event_id).await {
        Ok(latest) if !latest.is_active() => {
            withdraw(ctx, &latest, written).await;
            return Err(AttendanceError::EventNotActive {
                event_id: event_id.to_string(),
                status: latest.status,
            });
        }
        Ok(_) => {}
        Err(e) => warn!(
            "Could not recheck {} after writing RSVPs, keeping them: {}",
            event_id, e
        ),
    }

    for record in written {
        ctx.record_metric(&record, MetricDelta::Rsvp).await;
        outcome.registered.push(record.attendee_ref());
    }

    info!(
        "RSVP submit on {} by {}: {} registered, {} already registered, {} rejected, {} failed",
        event_id,
        guardian_email,
        outcome.registered.len(),
        outcome.already_registered.len(),
        outcome.rejected.len(),
        outcome.failed.len()
    );
    Ok(outcome)
}

/// Cancels records written by an admission whose event closed meanwhile and
/// gives their slots back. Records the event's own cascade already reached
/// are left alone.
async fn withdraw(ctx: &AttendanceContext, event: &Event, written: Vec<AttendeeRecord>) {
    let reason = event
        .cancellation_reason
        .clone()
        .unwrap_or_else(|| format!("Event {}", event.status));
    let transition = AttendeeTransition::cancellation(
        now_str(),
        Some(reason),
        Some(event.hours_before_start(Utc::now())),
    );

    let mut withdrawn = 0;
    for record in written {
        let attendee_id = record.attendee_id.clone();
        match apply_transition(ctx, StoredAttendee::Current(record), &transition).await {
            Ok(Some(_)) => withdrawn += 1,
            Ok(None) => debug!(
                "RSVP {}/{} already closed by the event cascade",
                event.event_id, attendee_id
            ),
            Err(e) => error!(
                "Failed to withdraw RSVP {}/{} from {} event: {}",
                event.event_id, attendee_id, event.status, e
            ),
        }
    }
    if withdrawn > 0 {
        info!(
            "Withdrew {} RSVPs from {} after it became {}",
            withdrawn, event.event_id, event.status
        );
        counter::release_after_commit(ctx, event, withdrawn).await;
    }
}
