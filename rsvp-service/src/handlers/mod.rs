pub mod guardian_handlers;
pub mod lifecycle_handlers;
pub mod minor_handlers;
pub mod rsvp_handlers;

use cleanup_shared::auth::AuthenticatedGuardian;
use log::warn;

use crate::error::{AppError, Result};

fn require_admin(guardian: &AuthenticatedGuardian) -> Result<()> {
    if guardian.is_admin {
        Ok(())
    } else {
        warn!("Non-admin {} attempted an admin action", guardian.email);
        Err(AppError::forbidden("Admin access required".into()))
    }
}
