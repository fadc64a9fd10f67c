//! Event status state machine and the sweeps that drive it.
//!
//! ```text
//! active ──> completed ──> archived
//!    └─────> cancelled
//! ```
//!
//! Every transition is a conditional write on the source status, so
//! overlapping sweeps and repeated admin actions are harmless.

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use serde::Serialize;

use super::cancellation::{cancel_all_for_event, BulkCancellationOutcome};
use super::{AttendanceContext, AttendanceError, Result};
use crate::error::StoreError;
use crate::models::{now_str, Event, EventStatus, EventSummary};
use crate::retry::retry_transient;

pub const DEFAULT_CANCELLATION_REASON: &str = "Event cancelled";

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub event: Event,
    pub changed: bool,
}

/// Owns event records and their status changes.
pub struct EventCatalog<'a> {
    ctx: &'a AttendanceContext,
}

impl<'a> EventCatalog<'a> {
    pub fn new(ctx: &'a AttendanceContext) -> Self {
        Self { ctx }
    }

    /// Stores a new active event with its counter seeded at zero.
    pub async fn create(&self, mut event: Event) -> Result<Event> {
        if event.event_id.trim().is_empty() || event.title.trim().is_empty() {
            return Err(AttendanceError::Validation(
                "event_id and title are required".to_string(),
            ));
        }
        if event.capacity == 0 {
            return Err(AttendanceError::Validation(
                "capacity must be at least 1".to_string(),
            ));
        }
        if event.end_time <= event.start_time {
            return Err(AttendanceError::Validation(
                "end_time must be after start_time".to_string(),
            ));
        }

        let now = now_str();
        event.status = EventStatus::Active;
        event.active_count = Some(0);
        event.cancellation_reason = None;
        event.created_at = now.clone();
        event.updated_at = now;

        match self.ctx.events.create_event(event).await {
            Ok(created) => {
                info!("Created event {} with capacity {}", created.event_id, created.capacity);
                Ok(created)
            }
            Err(StoreError::ConditionFailed(_)) => Err(AttendanceError::Validation(
                "An event with this id already exists".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Moves the event to `to`. Already being in `to` is a no-op; any source
    /// status the state machine does not allow is `InvalidTransition`.
    pub async fn transition(
        &self,
        event_id: &str,
        to: EventStatus,
        reason: Option<&str>,
    ) -> Result<TransitionOutcome> {
        let event = self.ctx.load_event(event_id).await?;
        self.transition_loaded(event, to, reason).await
    }

    async fn transition_loaded(
        &self,
        event: Event,
        to: EventStatus,
        reason: Option<&str>,
    ) -> Result<TransitionOutcome> {
        if event.status == to {
            return Ok(TransitionOutcome {
                event,
                changed: false,
            });
        }
        if !event.status.can_transition_to(to) {
            return Err(AttendanceError::InvalidTransition {
                from: event.status.to_string(),
                to: to.to_string(),
            });
        }

        let events = &self.ctx.events;
        let now = now_str();
        let from = event.status;
        let result = retry_transient(&self.ctx.retry, "transition event", || {
            events.transition_status(&event.event_id, from, to, reason, &now)
        })
        .await;

        match result {
            Ok(updated) => {
                info!("Event {} moved {} -> {}", updated.event_id, from, to);
                Ok(TransitionOutcome {
                    event: updated,
                    changed: true,
                })
            }
            Err(StoreError::ConditionFailed(_)) => {
                // Someone else moved it first; report what it is now.
                let latest = self.ctx.load_event(&event.event_id).await?;
                if latest.status == to {
                    Ok(TransitionOutcome {
                        event: latest,
                        changed: false,
                    })
                } else {
                    Err(AttendanceError::InvalidTransition {
                        from: latest.status.to_string(),
                        to: to.to_string(),
                    })
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SweepFailure {
    pub event_id: String,
    pub error: String,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub updated: Vec<String>,
    pub failed: Vec<SweepFailure>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct EventCancellationOutcome {
    pub event_id: String,
    pub status_changed: bool,
    pub reason: String,
    #[serde(flatten)]
    pub cascade: BulkCancellationOutcome,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct EventCategories {
    pub upcoming: Vec<EventSummary>,
    pub current: Vec<EventSummary>,
    pub past: Vec<EventSummary>,
}

impl EventCategories {
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.upcoming.len(), self.current.len(), self.past.len())
    }
}

pub struct LifecycleSweeper<'a> {
    ctx: &'a AttendanceContext,
}

impl<'a> LifecycleSweeper<'a> {
    pub fn new(ctx: &'a AttendanceContext) -> Self {
        Self { ctx }
    }

    async fn events_with_status(
        &self,
        status: EventStatus,
        started_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Event>> {
        let events = &self.ctx.events;
        Ok(retry_transient(&self.ctx.retry, "list events by status", || {
            events.list_events_by_status(status, started_before)
        })
        .await?)
    }

    /// Marks active events whose end time has passed as completed.
    pub async fn sweep_completed(&self, now: DateTime<Utc>) -> Result<SweepOutcome> {
        let candidates: Vec<Event> = self
            .events_with_status(EventStatus::Active, Some(now))
            .await?
            .into_iter()
            .filter(|event| event.has_ended(now))
            .collect();
        info!("Found {} active events past their end time", candidates.len());

        let outcome = self
            .advance_all(candidates, EventStatus::Completed, None)
            .await;
        info!(
            "Completion sweep updated {} events, {} failed",
            outcome.updated.len(),
            outcome.failed.len()
        );
        Ok(outcome)
    }

    /// Archives events in `status` that started before `before`.
    pub async fn archive_events(
        &self,
        before: DateTime<Utc>,
        status: EventStatus,
    ) -> Result<SweepOutcome> {
        if !status.can_transition_to(EventStatus::Archived) {
            return Err(AttendanceError::Validation(format!(
                "Events with status {} cannot be archived",
                status
            )));
        }
        let candidates = self.events_with_status(status, Some(before)).await?;
        info!(
            "Archiving {} {} events that started before {}",
            candidates.len(),
            status,
            before
        );
        Ok(self
            .advance_all(candidates, EventStatus::Archived, None)
            .await)
    }

    async fn advance_all(
        &self,
        events: Vec<Event>,
        to: EventStatus,
        reason: Option<&str>,
    ) -> SweepOutcome {
        let catalog = EventCatalog::new(self.ctx);
        let mut outcome = SweepOutcome::default();
        for event in events {
            let event_id = event.event_id.clone();
            match catalog.transition_loaded(event, to, reason).await {
                Ok(result) if result.changed => outcome.updated.push(event_id),
                Ok(_) => debug!("Event {} already {}", event_id, to),
                // Moved elsewhere by a concurrent writer since the query.
                Err(AttendanceError::InvalidTransition { from, .. }) => {
                    debug!("Event {} is now {}, skipping", event_id, from)
                }
                Err(e) => {
                    error!("Failed to move event {} to {}: {}", event_id, to, e);
                    outcome.failed.push(SweepFailure {
                        event_id,
                        error: e.to_string(),
                    });
                }
            }
        }
        outcome
    }

    /// Cancels the event and every registration on it. When the event is
    /// already cancelled only the registration cascade runs, which lets a
    /// partially failed cancellation be finished.
    pub async fn cancel_event(
        &self,
        event_id: &str,
        reason: Option<&str>,
        notify: bool,
    ) -> Result<EventCancellationOutcome> {
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_CANCELLATION_REASON);

        let transition = EventCatalog::new(self.ctx)
            .transition(event_id, EventStatus::Cancelled, Some(reason))
            .await?;
        let cascade = cancel_all_for_event(self.ctx, &transition.event, reason, notify).await?;

        Ok(EventCancellationOutcome {
            event_id: event_id.to_string(),
            status_changed: transition.changed,
            reason: reason.to_string(),
            cascade,
        })
    }

    /// Groups active events by where `now` falls relative to them.
    pub async fn categorize(&self, now: DateTime<Utc>) -> Result<EventCategories> {
        let mut events = self.events_with_status(EventStatus::Active, None).await?;
        events.sort_by(|a, b| a.start_time.cmp(&b.start_time));

        let mut categories = EventCategories::default();
        for event in events {
            let summary = event.summary();
            if !event.has_started(now) {
                categories.upcoming.push(summary);
            } else if event.has_ended(now) {
                categories.past.push(summary);
            } else {
                categories.current.push(summary);
            }
        }
        Ok(categories)
    }
}
