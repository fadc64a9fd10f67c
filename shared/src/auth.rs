use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::error::StoreError;
use crate::models::events::parse_event_time;
use crate::store::SessionStore;

/// Identity attached to every authenticated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedGuardian {
    pub email: String,
    pub is_admin: bool,
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Missing or malformed Authorization header")]
    MissingToken,

    #[error("Invalid session")]
    InvalidSession,

    #[error("Session expired")]
    ExpiredSession,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AuthError::Store(e) if e.is_transient() => {
                (StatusCode::SERVICE_UNAVAILABLE, "TRANSIENT_STORE_ERROR")
            }
            AuthError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            _ => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        };
        if let AuthError::Store(e) = &self {
            error!("Session lookup failed: {}", e);
        }
        let message = match &self {
            AuthError::Store(_) => "Unable to validate session".to_string(),
            other => other.to_string(),
        };
        (
            status,
            Json(json!({ "error": { "code": code, "message": message } })),
        )
            .into_response()
    }
}

/// Checks opaque bearer tokens against the sessions table.
#[derive(Clone)]
pub struct SessionValidator {
    sessions: Arc<dyn SessionStore>,
    admin_emails: Arc<Vec<String>>,
}

impl SessionValidator {
    pub fn new(sessions: Arc<dyn SessionStore>, admin_emails: Vec<String>) -> Self {
        Self {
            sessions,
            admin_emails: Arc::new(
                admin_emails
                    .into_iter()
                    .map(|e| e.trim().to_lowercase())
                    .collect(),
            ),
        }
    }

    pub fn is_admin(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.admin_emails.iter().any(|admin| *admin == email)
    }

    /// Resolves a token to its guardian. Expired sessions are deleted.
    pub async fn validate(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthenticatedGuardian, AuthError> {
        let session = self
            .sessions
            .get_session(token)
            .await?
            .ok_or(AuthError::InvalidSession)?;

        let expires_at = parse_event_time(&session.expires_at).ok();
        if expires_at.map_or(true, |at| at <= now) {
            debug!("Session for {} expired at {}", session.email, session.expires_at);
            if let Err(e) = self.sessions.delete_session(token).await {
                warn!("Failed to delete expired session: {}", e);
            }
            return Err(AuthError::ExpiredSession);
        }

        let email = session.email.trim().to_string();
        if email.is_empty() {
            return Err(AuthError::InvalidSession);
        }
        Ok(AuthenticatedGuardian {
            is_admin: self.is_admin(&email),
            email,
        })
    }
}

pub fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Rejects requests without a live session and attaches the
/// `AuthenticatedGuardian` extension otherwise.
pub async fn auth_middleware(
    State(validator): State<SessionValidator>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = match bearer_token(&req) {
        Some(token) => token.to_string(),
        None => return AuthError::MissingToken.into_response(),
    };

    match validator.validate(&token, Utc::now()).await {
        Ok(guardian) => {
            debug!("Authenticated request for {}", guardian.email);
            req.extensions_mut().insert(guardian);
            next.run(req).await
        }
        Err(e) => {
            warn!("Rejected request to {}: {}", req.uri(), e);
            e.into_response()
        }
    }
}

/// Builds a request for router tests. An empty token sends no
/// Authorization header.
#[cfg(any(test, feature = "test_utils"))]
pub fn create_test_request(
    method: &str,
    uri: &str,
    token: &str,
    body: Option<serde_json::Value>,
) -> Request {
    use axum::body::Body;

    let mut builder = axum::http::Request::builder().method(method).uri(uri);
    if !token.is_empty() {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    builder
        .body(body)
        .unwrap_or_else(|e| panic!("invalid test request {} {}: {}", method, uri, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mock_store::MockSessionStore;
    use chrono::Duration;

    fn validator(store: Arc<MockSessionStore>) -> SessionValidator {
        SessionValidator::new(store, vec!["Admin@Example.org".to_string()])
    }

    #[tokio::test]
    async fn valid_session_resolves_identity() {
        let store = Arc::new(MockSessionStore::new());
        store.add_session("tok", "admin@example.org", Utc::now() + Duration::hours(1));

        let guardian = validator(store).validate("tok", Utc::now()).await.unwrap();
        assert_eq!(guardian.email, "admin@example.org");
        assert!(guardian.is_admin);
    }

    #[tokio::test]
    async fn expired_session_is_rejected_and_deleted() {
        let store = Arc::new(MockSessionStore::new());
        store.add_session("old", "g@x.com", Utc::now() - Duration::minutes(1));

        let result = validator(store.clone()).validate("old", Utc::now()).await;
        assert!(matches!(result, Err(AuthError::ExpiredSession)));
        assert!(store.get_session("old").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let store = Arc::new(MockSessionStore::new());
        let result = validator(store).validate("nope", Utc::now()).await;
        assert!(matches!(result, Err(AuthError::InvalidSession)));
    }

    #[test]
    fn bearer_prefix_is_required() {
        let req = create_test_request("GET", "/minors", "abc", None);
        assert_eq!(bearer_token(&req), Some("abc"));

        let req = create_test_request("GET", "/minors", "", None);
        assert_eq!(bearer_token(&req), None);
    }
}
