use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cleanup_shared::attendance::AttendanceError;
use log::{error, warn};
use serde_json::{json, Map, Value};

/// Error returned by every handler, rendered as `{error: {code, message, ...}}`.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Map<String, Value>,
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: String) -> Self {
        Self {
            status,
            code,
            message,
            details: Map::new(),
        }
    }

    fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn bad_request(message: String) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub fn forbidden(message: String) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("Request failed with {}: {}", self.code, self.message);
        } else {
            warn!("Request rejected with {}: {}", self.code, self.message);
        }

        let mut body = Map::new();
        body.insert("code".to_string(), json!(self.code));
        body.insert("message".to_string(), json!(self.message));
        body.extend(self.details);

        (self.status, Json(json!({ "error": body }))).into_response()
    }
}

impl From<AttendanceError> for AppError {
    fn from(err: AttendanceError) -> Self {
        let code = err.code();
        let status = match &err {
            AttendanceError::Validation(_) => StatusCode::BAD_REQUEST,
            AttendanceError::Forbidden(_)
            | AttendanceError::UnauthorizedAttendee(_)
            | AttendanceError::UnauthorizedCancellation(_) => StatusCode::FORBIDDEN,
            AttendanceError::EventNotFound(_)
            | AttendanceError::RsvpNotFound { .. }
            | AttendanceError::MinorNotFound(_) => StatusCode::NOT_FOUND,
            AttendanceError::EventNotActive { .. }
            | AttendanceError::InvalidTransition { .. }
            | AttendanceError::CapacityExceeded { .. } => StatusCode::CONFLICT,
            AttendanceError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            AttendanceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let app_error = match &err {
            // Internal details stay in the logs
            AttendanceError::Internal(detail) => {
                error!("Internal error: {}", detail);
                AppError::new(status, code, "Internal server error".to_string())
            }
            other => AppError::new(status, code, other.to_string()),
        };

        match err {
            AttendanceError::CapacityExceeded {
                requested,
                remaining_slots,
            } => app_error
                .with_detail("requested", requested)
                .with_detail("remaining_slots", remaining_slots),
            AttendanceError::EventNotActive { event_id, status } => app_error
                .with_detail("event_id", event_id)
                .with_detail("status", status.as_str()),
            AttendanceError::RsvpNotFound {
                event_id,
                attendee_id,
            } => app_error
                .with_detail("event_id", event_id)
                .with_detail("attendee_id", attendee_id),
            _ => app_error,
        }
    }
}
