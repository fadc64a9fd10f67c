use cleanup_shared::attendance::AttendanceContext;
use cleanup_shared::auth::SessionValidator;

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub ctx: AttendanceContext,
    pub validator: SessionValidator,
}
