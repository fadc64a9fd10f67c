use serde::Serialize;

use super::counter;
use super::{AttendanceContext, Result, StatusCounts};
use crate::models::{merge_generations, AttendeeRecord, Event};
use crate::retry::retry_transient;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RosterStatistics {
    #[serde(flatten)]
    pub counts: StatusCounts,
    pub capacity: u32,
    pub active_count: u32,
    pub remaining_capacity: u32,
}

/// Admin view of one event's attendees.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct EventRoster {
    pub event: Event,
    pub attendees: Vec<AttendeeRecord>,
    pub statistics: RosterStatistics,
}

pub async fn event_roster(ctx: &AttendanceContext, event_id: &str) -> Result<EventRoster> {
    let event = ctx.load_event(event_id).await?;
    let attendees = &ctx.attendees;
    let rows = retry_transient(&ctx.retry, "list event attendees", || {
        attendees.list_event_attendees(event_id)
    })
    .await?;

    let mut records = merge_generations(rows);
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    let counts = StatusCounts::tally(&records);
    let state = counter::current_state(ctx, &event).await?;

    Ok(EventRoster {
        statistics: RosterStatistics {
            counts,
            capacity: state.capacity,
            active_count: state.active_count,
            remaining_capacity: state.remaining(),
        },
        event,
        attendees: records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttendeeStatus;
    use crate::test_utils::fixtures::{active_event, guardian_record, TestContext};

    #[tokio::test]
    async fn roster_counts_each_status() {
        let t = TestContext::new();
        let mut event = active_event("e1", 4);
        event.active_count = Some(1);
        t.events.insert(event);
        t.attendees
            .insert(guardian_record("e1", "a@x.com", AttendeeStatus::Active));
        t.attendees
            .insert(guardian_record("e1", "b@x.com", AttendeeStatus::Cancelled));
        t.attendees.insert_legacy("e1", "c@x.com", "no_show");

        let roster = event_roster(&t.ctx, "e1").await.unwrap();
        assert_eq!(roster.attendees.len(), 3);
        assert_eq!(roster.statistics.counts.active, 1);
        assert_eq!(roster.statistics.counts.cancelled, 1);
        assert_eq!(roster.statistics.counts.no_show, 1);
        assert_eq!(roster.statistics.remaining_capacity, 3);

        let json = serde_json::to_value(&roster.statistics).unwrap();
        assert_eq!(json["total"], 3);
        assert_eq!(json["capacity"], 4);
    }
}
