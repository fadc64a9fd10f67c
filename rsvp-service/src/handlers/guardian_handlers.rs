use axum::{
    extract::{Extension, Query, State},
    Json,
};
use chrono::Utc;
use cleanup_shared::attendance::guardian_query;
use cleanup_shared::auth::AuthenticatedGuardian;
use serde_json::json;
use std::sync::Arc;

use crate::error::Result;
use crate::models::GuardianRsvpsQuery;
use crate::state::AppState;

// GET /guardian/rsvps
pub async fn get_guardian_rsvps(
    State(state): State<Arc<AppState>>,
    Extension(guardian): Extension<AuthenticatedGuardian>,
    Query(query): Query<GuardianRsvpsQuery>,
) -> Result<Json<serde_json::Value>> {
    let rsvps =
        guardian_query::rsvps_for_guardian(&state.ctx, &guardian.email, query.status, Utc::now())
            .await?;
    Ok(Json(json!(rsvps)))
}
