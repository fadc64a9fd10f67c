use axum::{
    extract::{Extension, State},
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use cleanup_shared::attendance::lifecycle::{EventCatalog, LifecycleSweeper};
use cleanup_shared::auth::AuthenticatedGuardian;
use cleanup_shared::models::events::parse_event_time;
use cleanup_shared::models::{Event, EventStatus};
use log::info;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::require_admin;
use crate::error::{AppError, Result};
use crate::models::{CreateEventRequest, LifecycleRequest};
use crate::state::AppState;

/// Accepts a full timestamp or a bare `YYYY-MM-DD` (midnight UTC).
fn parse_cutoff(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        return Ok(date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc());
    }
    parse_event_time(raw).map_err(AppError::bad_request)
}

fn parse_status(raw: &str) -> Result<EventStatus> {
    serde_json::from_value(json!(raw.trim().to_lowercase()))
        .map_err(|_| AppError::bad_request(format!("Unknown event status '{}'", raw)))
}

// POST /events
pub async fn create_event(
    State(state): State<Arc<AppState>>,
    Extension(guardian): Extension<AuthenticatedGuardian>,
    Json(payload): Json<CreateEventRequest>,
) -> Result<Json<serde_json::Value>> {
    require_admin(&guardian)?;

    let event = Event {
        event_id: payload
            .event_id
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        title: payload.title,
        description: payload.description,
        start_time: parse_event_time(&payload.start_time).map_err(AppError::bad_request)?,
        end_time: parse_event_time(&payload.end_time).map_err(AppError::bad_request)?,
        location: payload.location.unwrap_or_default(),
        capacity: payload.capacity,
        status: EventStatus::Active,
        cancellation_reason: None,
        active_count: Some(0),
        created_at: String::new(),
        updated_at: String::new(),
    };

    let event = EventCatalog::new(&state.ctx).create(event).await?;
    Ok(Json(json!({ "event": event })))
}

// POST /events/lifecycle
pub async fn run_lifecycle_action(
    State(state): State<Arc<AppState>>,
    Extension(guardian): Extension<AuthenticatedGuardian>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>> {
    require_admin(&guardian)?;

    let request: LifecycleRequest = serde_json::from_value(payload)
        .map_err(|e| AppError::bad_request(format!("Invalid lifecycle request: {}", e)))?;
    info!("Lifecycle action {:?} requested by {}", request, guardian.email);

    let sweeper = LifecycleSweeper::new(&state.ctx);
    let body = match request {
        LifecycleRequest::UpdateCompletedEvents => {
            let outcome = sweeper.sweep_completed(Utc::now()).await?;
            json!({
                "action": "update_completed_events",
                "updated_count": outcome.updated.len(),
                "updated": outcome.updated,
                "failed": outcome.failed,
            })
        }
        LifecycleRequest::ArchiveEvents {
            archive_before_date,
            archive_status,
        } => {
            let before = parse_cutoff(&archive_before_date)?;
            let status = parse_status(&archive_status)?;
            let outcome = sweeper.archive_events(before, status).await?;
            json!({
                "action": "archive_events",
                "archived_count": outcome.updated.len(),
                "archived": outcome.updated,
                "failed": outcome.failed,
            })
        }
        LifecycleRequest::CancelEvent {
            event_id,
            reason,
            notify_volunteers,
        } => {
            let outcome = sweeper
                .cancel_event(&event_id, reason.as_deref(), notify_volunteers)
                .await?;
            json!({
                "action": "cancel_event",
                "cancelled_rsvps": outcome.cascade.cancelled.len(),
                "notifications_sent": outcome.cascade.notified.len(),
                "result": outcome,
            })
        }
        LifecycleRequest::CategorizeEvents => {
            let categories = sweeper.categorize(Utc::now()).await?;
            let (upcoming, current, past) = categories.counts();
            json!({
                "action": "categorize_events",
                "counts": { "upcoming": upcoming, "current": current, "past": past },
                "categories": categories,
            })
        }
    };

    Ok(Json(body))
}
