mod lifecycle_handlers_test;
mod minor_handlers_test;
mod rsvp_handlers_test;

use axum::Router;
use chrono::{Duration, Utc};
use cleanup_shared::auth::SessionValidator;
use cleanup_shared::test_utils::fixtures::TestContext;
use cleanup_shared::test_utils::mock_store::MockSessionStore;
use cleanup_shared::test_utils::test_logging::init_test_logging;
use std::sync::Arc;

use crate::routes::create_router_with_state;
use crate::state::AppState;

pub const GUARDIAN: &str = "g@x.com";
pub const GUARDIAN_TOKEN: &str = "guardian-token";
pub const OTHER_GUARDIAN: &str = "other@x.com";
pub const OTHER_TOKEN: &str = "other-token";
pub const ADMIN_TOKEN: &str = "admin-token";
pub const EXPIRED_TOKEN: &str = "expired-token";

/// Router over in-memory stores with sessions for a guardian, a second
/// guardian and an admin.
pub fn create_test_app() -> (Router, TestContext) {
    init_test_logging();

    let t = TestContext::new();
    let sessions = Arc::new(MockSessionStore::new());
    let expires = Utc::now() + Duration::hours(1);
    sessions.add_session(GUARDIAN_TOKEN, GUARDIAN, expires);
    sessions.add_session(OTHER_TOKEN, OTHER_GUARDIAN, expires);
    sessions.add_session(ADMIN_TOKEN, "admin@x.com", expires);
    sessions.add_session(EXPIRED_TOKEN, GUARDIAN, Utc::now() - Duration::minutes(5));

    let state = AppState {
        ctx: t.ctx.clone(),
        validator: SessionValidator::new(sessions, vec!["Admin@X.com".to_string()]),
    };
    (create_router_with_state(state, ""), t)
}
