//! Cancelling registrations, singly or for a whole event, and the effects
//! that follow: counter release, metrics, and guardian notifications.
//!
//! State changes are committed first. Notifications go out afterwards and a
//! failure to send one never undoes a cancellation.

use chrono::Utc;
use log::{debug, error, info};
use serde::Serialize;
use std::collections::BTreeSet;

use super::admission::FailedAttendee;
use super::counter;
use super::{AttendanceContext, AttendanceError, Result, NOTIFICATION_DELIVERY_FAILURE};
use crate::error::StoreError;
use crate::models::{
    effective_rows, now_str, AttendeeRecord, AttendeeRef, AttendeeStatus, CancellationNotice,
    Event, MetricDelta, StoredAttendee,
};
use crate::retry::retry_transient;
use crate::store::{effective_attendee, AttendeeTransition};

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CancellationOutcome {
    pub cancelled: bool,
    pub already_cancelled: bool,
    pub status: AttendeeStatus,
    pub remaining_capacity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours_before_event: Option<f64>,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkCancellationOutcome {
    pub cancelled: Vec<AttendeeRef>,
    pub failed: Vec<FailedAttendee>,
    pub notified: Vec<String>,
    pub notification_failures: Vec<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AttendanceMark {
    pub record: AttendeeRecord,
    pub changed: bool,
}

/// Moves a registration from `transition.from` to `transition.to`. Returns
/// the updated record, or `None` if its status changed before the write
/// landed.
///
/// A legacy-only registration is superseded by a current-shape record at the
/// same key; the legacy row itself is never written.
pub(crate) async fn apply_transition(
    ctx: &AttendanceContext,
    row: StoredAttendee,
    transition: &AttendeeTransition,
) -> Result<Option<AttendeeRecord>> {
    let attendees = &ctx.attendees;
    let (event_id, attendee_id) = row.key();

    if let StoredAttendee::Legacy(legacy) = row {
        let mut record = legacy.normalize();
        transition.apply(&mut record);
        let inserted = retry_transient(&ctx.retry, "supersede legacy rsvp", || {
            attendees.insert_attendee_if_absent(record.clone())
        })
        .await;
        match inserted {
            Ok(()) => return Ok(Some(record)),
            // A current record appeared since the read; fall through to it.
            Err(StoreError::ConditionFailed(_)) => {
                debug!(
                    "Current record for {}/{} appeared, retrying transition on it",
                    event_id, attendee_id
                );
            }
            Err(e) => return Err(e.into()),
        }
    }

    let updated = retry_transient(&ctx.retry, "transition attendee", || {
        attendees.transition_attendee(&event_id, &attendee_id, transition.clone())
    })
    .await;
    match updated {
        Ok(record) => Ok(Some(record)),
        Err(StoreError::ConditionFailed(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn find_registration(
    ctx: &AttendanceContext,
    event_id: &str,
    attendee_id: &str,
) -> Result<StoredAttendee> {
    let attendees = &ctx.attendees;
    retry_transient(&ctx.retry, "get attendee", || {
        effective_attendee(attendees.as_ref(), event_id, attendee_id)
    })
    .await?
    .ok_or_else(|| AttendanceError::RsvpNotFound {
        event_id: event_id.to_string(),
        attendee_id: attendee_id.to_string(),
    })
}

/// Cancels one registration on behalf of `guardian_email`. Cancelling a
/// registration that is no longer active succeeds without side effects.
pub async fn cancel(
    ctx: &AttendanceContext,
    event_id: &str,
    attendee_id: &str,
    guardian_email: &str,
    reason: Option<String>,
) -> Result<CancellationOutcome> {
    let event = ctx.load_event(event_id).await?;
    let row = find_registration(ctx, event_id, attendee_id).await?;
    let current = row.clone().into_current();

    if !current.is_owned_by(guardian_email) {
        return Err(AttendanceError::UnauthorizedCancellation(
            attendee_id.to_string(),
        ));
    }

    if !current.is_active() {
        debug!(
            "RSVP {}/{} already {}, nothing to cancel",
            event_id, attendee_id, current.status
        );
        let state = counter::current_state(ctx, &event).await?;
        return Ok(CancellationOutcome {
            cancelled: true,
            already_cancelled: true,
            status: current.status,
            remaining_capacity: state.remaining(),
            hours_before_event: current.hours_before_event,
        });
    }

    let transition = AttendeeTransition::cancellation(
        now_str(),
        reason.filter(|r| !r.trim().is_empty()),
        Some(event.hours_before_start(Utc::now())),
    );
    let record = match apply_transition(ctx, row, &transition).await? {
        Some(record) => record,
        None => {
            // Lost to a concurrent cancel or attendance mark.
            let state = counter::current_state(ctx, &ctx.load_event(event_id).await?).await?;
            return Ok(CancellationOutcome {
                cancelled: true,
                already_cancelled: true,
                status: AttendeeStatus::Cancelled,
                remaining_capacity: state.remaining(),
                hours_before_event: None,
            });
        }
    };

    let state = counter::release_after_commit(ctx, &event, 1).await;
    ctx.record_metric(&record, MetricDelta::Cancellation).await;
    info!(
        "Cancelled RSVP {}/{} for {}",
        event_id, attendee_id, guardian_email
    );

    Ok(CancellationOutcome {
        cancelled: true,
        already_cancelled: false,
        status: record.status,
        remaining_capacity: state.remaining(),
        hours_before_event: record.hours_before_event,
    })
}

/// Cancels every active registration on the event, then notifies each
/// affected guardian once. Only guardians whose records this call cancelled
/// are notified, so running it again does not repeat notifications.
pub async fn cancel_all_for_event(
    ctx: &AttendanceContext,
    event: &Event,
    reason: &str,
    notify: bool,
) -> Result<BulkCancellationOutcome> {
    let attendees = &ctx.attendees;
    let event_id = event.event_id.as_str();
    let rows = retry_transient(&ctx.retry, "list event attendees", || {
        attendees.list_event_attendees(event_id)
    })
    .await?;

    let active: Vec<StoredAttendee> = effective_rows(rows)
        .into_iter()
        .filter(|row| row.clone().into_current().is_active())
        .collect();

    let transition = AttendeeTransition::cancellation(
        now_str(),
        Some(reason.to_string()),
        Some(event.hours_before_start(Utc::now())),
    );

    let mut outcome = BulkCancellationOutcome::default();
    let mut guardians = BTreeSet::new();
    for row in active {
        let attendee = row.clone().into_current().attendee_ref();
        match apply_transition(ctx, row, &transition).await {
            Ok(Some(cancelled)) => {
                ctx.record_metric(&cancelled, MetricDelta::Cancellation).await;
                guardians.insert(cancelled.guardian_email.clone());
                outcome.cancelled.push(cancelled.attendee_ref());
            }
            Ok(None) => debug!(
                "RSVP {}/{} changed concurrently, skipping",
                event_id, attendee.attendee_id
            ),
            Err(e) => {
                error!(
                    "Failed to cancel RSVP {}/{}: {}",
                    event_id, attendee.attendee_id, e
                );
                outcome.failed.push(FailedAttendee::new(&attendee, e));
            }
        }
    }

    if !outcome.cancelled.is_empty() {
        counter::release_after_commit(ctx, event, outcome.cancelled.len() as u32).await;
    }

    if notify {
        for guardian in guardians {
            let notice = CancellationNotice::for_guardian(event, &guardian, reason);
            match ctx.notifier.publish_cancellation(&notice).await {
                Ok(()) => outcome.notified.push(guardian),
                Err(e) => {
                    error!(
                        "{}: cancellation notice for {} on {}: {}",
                        NOTIFICATION_DELIVERY_FAILURE, guardian, event_id, e
                    );
                    outcome.notification_failures.push(guardian);
                }
            }
        }
    }

    info!(
        "Bulk cancellation of {}: {} cancelled, {} failed, {} notified",
        event_id,
        outcome.cancelled.len(),
        outcome.failed.len(),
        outcome.notified.len()
    );
    Ok(outcome)
}

/// Records whether an active attendee showed up. Marking with the status a
/// record already has is a no-op.
pub async fn mark_attendance(
    ctx: &AttendanceContext,
    event_id: &str,
    attendee_id: &str,
    status: AttendeeStatus,
) -> Result<AttendanceMark> {
    let metric = match status {
        AttendeeStatus::NoShow => MetricDelta::NoShow,
        AttendeeStatus::Attended => MetricDelta::Attended,
        other => {
            return Err(AttendanceError::Validation(format!(
                "Attendance status must be no_show or attended, got {}",
                other
            )))
        }
    };

    let event = ctx.load_event(event_id).await?;
    let row = find_registration(ctx, event_id, attendee_id).await?;
    let current = row.clone().into_current();

    if current.status == status {
        return Ok(AttendanceMark {
            record: current,
            changed: false,
        });
    }
    if !current.is_active() {
        return Err(AttendanceError::InvalidTransition {
            from: current.status.to_string(),
            to: status.to_string(),
        });
    }

    let transition = AttendeeTransition::attendance(status, now_str());
    let record = match apply_transition(ctx, row, &transition).await? {
        Some(record) => record,
        None => {
            let latest = find_registration(ctx, event_id, attendee_id)
                .await?
                .into_current();
            if latest.status == status {
                return Ok(AttendanceMark {
                    record: latest,
                    changed: false,
                });
            }
            return Err(AttendanceError::InvalidTransition {
                from: latest.status.to_string(),
                to: status.to_string(),
            });
        }
    };

    counter::release_after_commit(ctx, &event, 1).await;
    ctx.record_metric(&record, metric).await;
    info!("Marked {} as {} for {}", attendee_id, status, event_id);

    Ok(AttendanceMark {
        record,
        changed: true,
    })
}

/// Takes back a no-show or attended mark made in error and returns the
/// registration to active. The slot is claimed again before the record
/// changes, so a full active event refuses the correction.
pub async fn clear_attendance_mark(
    ctx: &AttendanceContext,
    event_id: &str,
    attendee_id: &str,
) -> Result<AttendanceMark> {
    let event = ctx.load_event(event_id).await?;
    let row = find_registration(ctx, event_id, attendee_id).await?;
    let current = row.clone().into_current();

    let metric = match current.status {
        AttendeeStatus::Active => {
            return Ok(AttendanceMark {
                record: current,
                changed: false,
            })
        }
        AttendeeStatus::NoShow => MetricDelta::NoShow,
        AttendeeStatus::Attended => MetricDelta::Attended,
        AttendeeStatus::Cancelled => {
            return Err(AttendanceError::InvalidTransition {
                from: AttendeeStatus::Cancelled.to_string(),
                to: AttendeeStatus::Active.to_string(),
            })
        }
    };

    counter::reclaim(ctx, event_id, 1).await?;
    let transition = AttendeeTransition::reactivation(current.status, now_str());
    let record = match apply_transition(ctx, row, &transition).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            counter::release_after_commit(ctx, &event, 1).await;
            let latest = find_registration(ctx, event_id, attendee_id)
                .await?
                .into_current();
            if latest.is_active() {
                return Ok(AttendanceMark {
                    record: latest,
                    changed: false,
                });
            }
            return Err(AttendanceError::InvalidTransition {
                from: latest.status.to_string(),
                to: AttendeeStatus::Active.to_string(),
            });
        }
        Err(e) => {
            counter::release_after_commit(ctx, &event, 1).await;
            return Err(e);
        }
    };

    ctx.adjust_metric(&record, metric, -1).await;
    info!(
        "Cleared {} mark for {} on {}",
        current.status, attendee_id, event_id
    );
    Ok(AttendanceMark {
        record,
        changed: true,
    })
}
