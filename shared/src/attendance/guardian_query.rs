//! Everything a guardian has registered for, joined with event details.
//! Read-only; nothing here feeds capacity or duplicate decisions.

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

use super::{AttendanceContext, Result, StatusCounts};
use crate::models::{merge_generations, AttendeeRecord, AttendeeStatus, EventSummary};
use crate::retry::retry_transient;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct GuardianRsvp {
    #[serde(flatten)]
    pub record: AttendeeRecord,
    /// `None` when the event no longer exists
    pub event: Option<EventSummary>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct GuardianRsvps {
    pub guardian_email: String,
    pub rsvps: Vec<GuardianRsvp>,
    pub summary: StatusCounts,
}

pub async fn rsvps_for_guardian(
    ctx: &AttendanceContext,
    guardian_email: &str,
    status: Option<AttendeeStatus>,
    now: DateTime<Utc>,
) -> Result<GuardianRsvps> {
    let attendees = &ctx.attendees;
    let rows = retry_transient(&ctx.retry, "list guardian attendees", || {
        attendees.list_guardian_attendees(guardian_email)
    })
    .await?;

    let records: Vec<AttendeeRecord> = merge_generations(rows)
        .into_iter()
        .filter(|record| status.map_or(true, |wanted| record.status == wanted))
        .collect();

    let mut event_ids: Vec<String> = records.iter().map(|r| r.event_id.clone()).collect();
    event_ids.sort();
    event_ids.dedup();

    let events = &ctx.events;
    let events: HashMap<String, EventSummary> = retry_transient(&ctx.retry, "get events", || {
        events.get_events(&event_ids)
    })
    .await?
    .into_iter()
    .map(|event| (event.event_id.clone(), event.summary()))
    .collect();
    debug!(
        "Guardian {} has {} RSVPs across {} events",
        guardian_email,
        records.len(),
        events.len()
    );

    let summary = StatusCounts::tally(&records);
    let mut rsvps: Vec<GuardianRsvp> = records
        .into_iter()
        .map(|record| GuardianRsvp {
            event: events.get(&record.event_id).cloned(),
            record,
        })
        .collect();
    rsvps.sort_by(|a, b| dashboard_order(a, b, now));

    Ok(GuardianRsvps {
        guardian_email: guardian_email.to_string(),
        rsvps,
        summary,
    })
}

/// Upcoming events soonest first, then past events most recent first, then
/// RSVPs whose event is gone.
fn dashboard_order(a: &GuardianRsvp, b: &GuardianRsvp, now: DateTime<Utc>) -> Ordering {
    let by_event = match (&a.event, &b.event) {
        (Some(x), Some(y)) => {
            let x_upcoming = x.start_time >= now;
            let y_upcoming = y.start_time >= now;
            match (x_upcoming, y_upcoming) {
                (true, true) => x.start_time.cmp(&y.start_time),
                (false, false) => y.start_time.cmp(&x.start_time),
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.record.event_id.cmp(&b.record.event_id),
    };
    by_event.then_with(|| a.record.attendee_id.cmp(&b.record.attendee_id))
}
