use axum::{
    extract::Request,
    middleware,
    routing::{get, post, put},
    Router,
};
use cleanup_shared::attendance::AttendanceContext;
use cleanup_shared::auth::{auth_middleware, SessionValidator};
use cleanup_shared::config::Config;
use cleanup_shared::store::dynamo::{create_client, DynamoSessionStore};
use log::{info, warn};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::handlers::{
    guardian_handlers::get_guardian_rsvps,
    lifecycle_handlers::{create_event, run_lifecycle_action},
    minor_handlers::{create_minor, delete_minor, get_minors, update_minor},
    rsvp_handlers::{cancel_rsvp, check_rsvp, list_rsvps, mark_attendance, submit_rsvp},
};
use crate::state::AppState;

/// Creates a router backed by DynamoDB and SNS
pub async fn create_router() -> Router {
    info!("Creating router with DynamoDB stores");
    let config = Config::get();

    let client = create_client().await;
    let sessions = Arc::new(DynamoSessionStore::with_client_and_table(
        client.clone(),
        config.sessions_table.clone(),
    ));
    let state = AppState {
        ctx: AttendanceContext::from_config(config, client),
        validator: SessionValidator::new(sessions, config.admin_emails.clone()),
    };

    // If REMOVE_BASE_PATH is set to true, don't add the /Prod prefix
    let prefix = if config.remove_base_path { "" } else { "/Prod" };
    info!("Using API route prefix: {}", prefix);

    create_router_with_state(state, prefix)
}

/// Creates a router over the given engine and session validator
pub fn create_router_with_state(state: AppState, prefix: &str) -> Router {
    info!("Setting up API routes with prefix: '{}'", prefix);

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Logging middleware to trace all requests
    async fn logging_middleware(
        req: Request,
        next: axum::middleware::Next,
    ) -> impl axum::response::IntoResponse {
        info!(
            "Router received request: method={}, uri={}",
            req.method(),
            req.uri()
        );
        next.run(req).await
    }

    let validator = state.validator.clone();
    let state = Arc::new(state);

    // Anyone may check a registration
    let public_routes = Router::new()
        .route("/rsvps/check", post(check_rsvp))
        .with_state(state.clone());

    let rsvp_routes = Router::new()
        .route("/rsvps/submit", post(submit_rsvp))
        .route("/rsvps/cancel", post(cancel_rsvp))
        .route("/rsvps/list", post(list_rsvps))
        .route("/rsvps/attendance", post(mark_attendance))
        .route("/guardian/rsvps", get(get_guardian_rsvps))
        .route("/minors", get(get_minors).post(create_minor))
        .route("/minors/:minor_id", put(update_minor).delete(delete_minor))
        .route("/events", post(create_event))
        .route("/events/lifecycle", post(run_lifecycle_action))
        .layer(middleware::from_fn_with_state(validator, auth_middleware))
        .with_state(state);

    let api_routes = public_routes.merge(rsvp_routes);

    let router = if prefix.is_empty() {
        // For tests or when no prefix is needed, don't nest the routes
        api_routes
            .layer(cors)
            .layer(middleware::from_fn(logging_middleware))
    } else {
        Router::new()
            .nest(prefix, api_routes)
            .layer(cors)
            .layer(middleware::from_fn(logging_middleware))
    };

    // Add a fallback handler for 404s
    router.fallback(|req: Request| async move {
        warn!("No route matched for: {} {}", req.method(), req.uri());
        (
            axum::http::StatusCode::NOT_FOUND,
            "The requested resource was not found".to_string(),
        )
    })
}
