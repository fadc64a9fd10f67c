//! Optimistic compare-and-swap on an event's `active_count`.
//!
//! A reservation succeeds only if the stored count still equals what was read
//! and the event is still active. Events written before the counter existed
//! get it seeded from their active records under an `attribute_not_exists`
//! precondition.

use log::{debug, warn};

use super::{AttendanceContext, AttendanceError, Result};
use crate::error::StoreError;
use crate::models::{merge_generations, now_str, Event};
use crate::retry::retry_transient;

/// Counter value and capacity as of the last successful read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterState {
    pub active_count: u32,
    pub capacity: u32,
}

impl CounterState {
    pub fn remaining(&self) -> u32 {
        self.capacity.saturating_sub(self.active_count)
    }
}

/// Active registrations for the event as the records see them, both
/// generations merged.
pub async fn count_active_records(ctx: &AttendanceContext, event_id: &str) -> Result<u32> {
    let attendees = &ctx.attendees;
    let rows = retry_transient(&ctx.retry, "list event attendees", || {
        attendees.list_event_attendees(event_id)
    })
    .await?;
    Ok(merge_generations(rows)
        .iter()
        .filter(|record| record.is_active())
        .count() as u32)
}

/// The counter as stored, or the record count for events without one.
pub async fn current_state(ctx: &AttendanceContext, event: &Event) -> Result<CounterState> {
    let active_count = match event.active_count {
        Some(count) => count,
        None => count_active_records(ctx, &event.event_id).await?,
    };
    Ok(CounterState {
        active_count,
        capacity: event.capacity,
    })
}

/// Claims `slots` places on an active event, all or nothing.
pub async fn reserve(ctx: &AttendanceContext, event_id: &str, slots: u32) -> Result<CounterState> {
    claim(ctx, event_id, slots, true).await
}

/// Counts `slots` registrations that are returning to active. While the
/// event is active this is a [`reserve`]; once it has closed the count is
/// raised without a capacity check.
pub async fn reclaim(ctx: &AttendanceContext, event_id: &str, slots: u32) -> Result<CounterState> {
    claim(ctx, event_id, slots, false).await
}

async fn claim(
    ctx: &AttendanceContext,
    event_id: &str,
    slots: u32,
    require_active: bool,
) -> Result<CounterState> {
    let policy = &ctx.retry;
    let mut attempt = 0;

    loop {
        let event = ctx.load_event(event_id).await?;
        if require_active && !event.is_active() {
            return Err(AttendanceError::EventNotActive {
                event_id: event_id.to_string(),
                status: event.status,
            });
        }
        let enforce = event.is_active();

        let state = current_state(ctx, &event).await?;
        if enforce && state.active_count + slots > state.capacity {
            return Err(AttendanceError::CapacityExceeded {
                requested: slots,
                remaining_slots: state.remaining(),
            });
        }

        let new_count = state.active_count + slots;
        match ctx
            .events
            .compare_and_set_active_count(
                event_id,
                event.active_count,
                new_count,
                enforce,
                &now_str(),
            )
            .await
        {
            Ok(()) => {
                debug!(
                    "Reserved {} slots on {} ({} -> {} of {})",
                    slots, event_id, state.active_count, new_count, state.capacity
                );
                return Ok(CounterState {
                    active_count: new_count,
                    capacity: state.capacity,
                });
            }
            Err(e) if e.is_condition_failed() || e.is_transient() => {
                attempt += 1;
                if !policy.should_retry(attempt) {
                    warn!(
                        "Gave up reserving {} slots on {} after {} attempts",
                        slots, event_id, attempt
                    );
                    return Err(AttendanceError::Transient(format!(
                        "capacity counter for {} is contended",
                        event_id
                    )));
                }
                let delay = policy.delay_for_attempt(attempt - 1);
                debug!(
                    "Counter CAS on {} lost ({}), retrying in {:?}",
                    event_id, e, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Gives back `slots` places. Must run after the records that held them
/// stopped being active, so a seeded counter already excludes them.
pub async fn release(ctx: &AttendanceContext, event_id: &str, slots: u32) -> Result<CounterState> {
    let policy = &ctx.retry;
    let mut attempt = 0;

    loop {
        let event = ctx.load_event(event_id).await?;
        let new_count = match event.active_count {
            Some(count) => {
                if count < slots {
                    warn!(
                        "Clamping active_count on {} at 0 (count {}, releasing {})",
                        event_id, count, slots
                    );
                }
                count.saturating_sub(slots)
            }
            None => count_active_records(ctx, event_id).await?,
        };

        match ctx
            .events
            .compare_and_set_active_count(event_id, event.active_count, new_count, false, &now_str())
            .await
        {
            Ok(()) => {
                return Ok(CounterState {
                    active_count: new_count,
                    capacity: event.capacity,
                })
            }
            Err(StoreError::NotFound(_)) => {
                return Err(AttendanceError::EventNotFound(event_id.to_string()))
            }
            Err(e) if e.is_condition_failed() || e.is_transient() => {
                attempt += 1;
                if !policy.should_retry(attempt) {
                    return Err(AttendanceError::Transient(format!(
                        "capacity counter for {} is contended",
                        event_id
                    )));
                }
                tokio::time::sleep(policy.delay_for_attempt(attempt - 1)).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Release for a state change that is already committed. On failure the
/// counter stays high and the last known state is returned.
pub async fn release_after_commit(
    ctx: &AttendanceContext,
    event: &Event,
    slots: u32,
) -> CounterState {
    match release(ctx, &event.event_id, slots).await {
        Ok(state) => state,
        Err(e) => {
            warn!(
                "Failed to release {} slots on {}, counter left high: {}",
                slots, event.event_id, e
            );
            CounterState {
                active_count: event.active_count.unwrap_or(0),
                capacity: event.capacity,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttendeeStatus, EventStatus};
    use crate::test_utils::fixtures::{active_event, guardian_record, TestContext};
    use crate::test_utils::test_logging::init_test_logging;

    #[tokio::test]
    async fn reserve_seeds_missing_counter_from_records() {
        init_test_logging();
        let t = TestContext::new();
        let mut event = active_event("seed", 5);
        event.active_count = None;
        t.events.insert(event);
        t.attendees.insert(guardian_record("seed", "a@x.com", AttendeeStatus::Active));
        t.attendees.insert(guardian_record("seed", "b@x.com", AttendeeStatus::Cancelled));
        t.attendees.insert_legacy("seed", "c@x.com", "active");

        let state = reserve(&t.ctx, "seed", 1).await.unwrap();
        assert_eq!(state.active_count, 3);
        assert_eq!(t.events.active_count("seed"), Some(3));
    }

    #[tokio::test]
    async fn reserve_rejects_whole_batch_over_capacity() {
        let t = TestContext::new();
        let mut event = active_event("full", 2);
        event.active_count = Some(1);
        t.events.insert(event);

        let err = reserve(&t.ctx, "full", 2).await.unwrap_err();
        assert!(matches!(
            err,
            AttendanceError::CapacityExceeded {
                requested: 2,
                remaining_slots: 1
            }
        ));
        assert_eq!(t.events.active_count("full"), Some(1));
    }

    #[tokio::test]
    async fn reserve_requires_active_event() {
        let t = TestContext::new();
        let mut event = active_event("done", 2);
        event.status = EventStatus::Completed;
        t.events.insert(event);

        let err = reserve(&t.ctx, "done", 1).await.unwrap_err();
        assert_eq!(err.code(), "EVENT_NOT_ACTIVE");
    }

    #[tokio::test]
    async fn reclaim_checks_capacity_only_while_active() {
        let t = TestContext::new();
        let mut event = active_event("open", 1);
        event.active_count = Some(1);
        t.events.insert(event.clone());

        let err = reclaim(&t.ctx, "open", 1).await.unwrap_err();
        assert_eq!(err.code(), "CAPACITY_EXCEEDED");

        event.event_id = "closed".into();
        event.status = EventStatus::Completed;
        t.events.insert(event);
        let state = reclaim(&t.ctx, "closed", 1).await.unwrap();
        assert_eq!(state.active_count, 2);
        assert_eq!(t.events.active_count("closed"), Some(2));
    }

    #[tokio::test]
    async fn release_clamps_at_zero() {
        let t = TestContext::new();
        let mut event = active_event("low", 3);
        event.active_count = Some(1);
        t.events.insert(event);

        let state = release(&t.ctx, "low", 2).await.unwrap();
        assert_eq!(state.active_count, 0);
        assert_eq!(t.events.active_count("low"), Some(0));
    }

    #[tokio::test]
    async fn persistent_contention_surfaces_as_transient() {
        let t = TestContext::new();
        t.events.insert(active_event("hot", 10));
        t.events.fail_next_cas(100);

        let err = reserve(&t.ctx, "hot", 1).await.unwrap_err();
        assert_eq!(err.code(), "TRANSIENT_STORE_ERROR");
    }
}
