use axum::{
    extract::{Extension, State},
    Json,
};
use cleanup_shared::attendance::{admission, cancellation, roster};
use cleanup_shared::auth::AuthenticatedGuardian;
use cleanup_shared::models::AttendeeStatus;
use log::info;
use serde_json::json;
use std::sync::Arc;

use super::require_admin;
use crate::error::{AppError, Result};
use crate::models::{
    CancelRsvpRequest, CheckRsvpRequest, ListRsvpsRequest, MarkAttendanceRequest,
    SubmitRsvpRequest,
};
use crate::state::AppState;

// POST /rsvps/check
pub async fn check_rsvp(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CheckRsvpRequest>,
) -> Result<Json<serde_json::Value>> {
    let check =
        admission::check_registration(&state.ctx, &payload.event_id, payload.email.as_deref())
            .await?;
    Ok(Json(json!(check)))
}

// POST /rsvps/submit
pub async fn submit_rsvp(
    State(state): State<Arc<AppState>>,
    Extension(guardian): Extension<AuthenticatedGuardian>,
    Json(payload): Json<SubmitRsvpRequest>,
) -> Result<Json<serde_json::Value>> {
    if let Some(claimed) = payload.guardian_email.as_deref() {
        if claimed.trim() != guardian.email {
            return Err(AppError::forbidden(
                "guardian_email does not match the signed-in account".into(),
            ));
        }
    }

    info!(
        "Submitting {} attendee(s) for event {} by {}",
        payload.attendees.len(),
        payload.event_id,
        guardian.email
    );
    let outcome = admission::submit(
        &state.ctx,
        &payload.event_id,
        &guardian.email,
        &payload.attendees,
    )
    .await?;

    Ok(Json(json!(outcome)))
}

// POST /rsvps/cancel
pub async fn cancel_rsvp(
    State(state): State<Arc<AppState>>,
    Extension(guardian): Extension<AuthenticatedGuardian>,
    Json(payload): Json<CancelRsvpRequest>,
) -> Result<Json<serde_json::Value>> {
    let outcome = cancellation::cancel(
        &state.ctx,
        &payload.event_id,
        &payload.attendee_id,
        &guardian.email,
        payload.reason,
    )
    .await?;

    Ok(Json(json!(outcome)))
}

// POST /rsvps/list
pub async fn list_rsvps(
    State(state): State<Arc<AppState>>,
    Extension(guardian): Extension<AuthenticatedGuardian>,
    Json(payload): Json<ListRsvpsRequest>,
) -> Result<Json<serde_json::Value>> {
    require_admin(&guardian)?;

    let roster = roster::event_roster(&state.ctx, &payload.event_id).await?;
    Ok(Json(json!(roster)))
}

// POST /rsvps/attendance
pub async fn mark_attendance(
    State(state): State<Arc<AppState>>,
    Extension(guardian): Extension<AuthenticatedGuardian>,
    Json(payload): Json<MarkAttendanceRequest>,
) -> Result<Json<serde_json::Value>> {
    require_admin(&guardian)?;

    let mark = match payload.status {
        AttendeeStatus::NoShow | AttendeeStatus::Attended => {
            cancellation::mark_attendance(
                &state.ctx,
                &payload.event_id,
                &payload.attendee_id,
                payload.status,
            )
            .await?
        }
        // Correcting an earlier mark
        AttendeeStatus::Active => {
            cancellation::clear_attendance_mark(
                &state.ctx,
                &payload.event_id,
                &payload.attendee_id,
            )
            .await?
        }
        AttendeeStatus::Cancelled => {
            return Err(AppError::bad_request(
                "status must be no_show, attended or active".into(),
            ))
        }
    };

    Ok(Json(json!({
        "rsvp": mark.record,
        "changed": mark.changed,
    })))
}
