use axum::{
    extract::{Extension, Path, State},
    Json,
};
use cleanup_shared::auth::AuthenticatedGuardian;
use cleanup_shared::directory::{Directory, MinorInput, MinorPatch};
use log::info;
use serde_json::json;
use std::sync::Arc;

use crate::error::Result;
use crate::state::AppState;

// GET /minors
pub async fn get_minors(
    State(state): State<Arc<AppState>>,
    Extension(guardian): Extension<AuthenticatedGuardian>,
) -> Result<Json<serde_json::Value>> {
    let minors = Directory::new(&state.ctx)
        .list_minors(&guardian.email)
        .await?;
    Ok(Json(json!({ "minors": minors })))
}

// POST /minors
pub async fn create_minor(
    State(state): State<Arc<AppState>>,
    Extension(guardian): Extension<AuthenticatedGuardian>,
    Json(payload): Json<MinorInput>,
) -> Result<Json<serde_json::Value>> {
    let minor = Directory::new(&state.ctx)
        .add_minor(&guardian.email, payload)
        .await?;
    info!("Guardian {} added minor {}", guardian.email, minor.minor_id);
    Ok(Json(json!({ "minor": minor })))
}

// PUT /minors/:minor_id
pub async fn update_minor(
    State(state): State<Arc<AppState>>,
    Path(minor_id): Path<String>,
    Extension(guardian): Extension<AuthenticatedGuardian>,
    Json(payload): Json<MinorPatch>,
) -> Result<Json<serde_json::Value>> {
    let minor = Directory::new(&state.ctx)
        .update_minor(&guardian.email, &minor_id, payload)
        .await?;
    Ok(Json(json!({ "minor": minor })))
}

// DELETE /minors/:minor_id
pub async fn delete_minor(
    State(state): State<Arc<AppState>>,
    Path(minor_id): Path<String>,
    Extension(guardian): Extension<AuthenticatedGuardian>,
) -> Result<Json<serde_json::Value>> {
    let deletion = Directory::new(&state.ctx)
        .delete_minor(&guardian.email, &minor_id)
        .await?;
    info!(
        "Guardian {} deleted minor {} ({} RSVPs cancelled)",
        guardian.email, deletion.minor_id, deletion.cancelled_rsvps
    );
    Ok(Json(json!(deletion)))
}
