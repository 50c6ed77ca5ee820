//! Request plumbing shared by the workflow routers.

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::warn;

use crate::error::ServiceError;
use crate::session::{Caller, Flash, FlashLevel, SessionStore, SessionToken};

/// Header carrying the opaque session token.
pub const SESSION_HEADER: &str = "x-session-token";

pub fn session_token(headers: &HeaderMap) -> Option<SessionToken> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(SessionToken::from)
}

/// Resolve the caller behind the request; an unknown token is no caller.
pub fn resolve_caller<T>(sessions: &T, headers: &HeaderMap) -> Result<Option<Caller>, ServiceError>
where
    T: SessionStore + ?Sized,
{
    match session_token(headers) {
        Some(token) => Ok(sessions.caller(&token)?),
        None => Ok(None),
    }
}

/// Run a synchronous workflow call on the blocking pool. Database access
/// happens inside `work`, never on a runtime worker.
pub async fn run_blocking<T, F>(work: F) -> Result<T, ServiceError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

/// Render a workflow result. Access denials leave an error flash in the
/// caller's session before redirecting.
pub fn respond<T, S>(sessions: &S, result: Result<T, ServiceError>, success: StatusCode) -> Response
where
    T: Serialize,
    S: SessionStore + ?Sized,
{
    match result {
        Ok(value) => (success, Json(value)).into_response(),
        Err(ServiceError::AccessDenied(denied)) => {
            if let Some(token) = denied.session() {
                let flash = Flash::new(FlashLevel::Error, denied.to_string());
                if let Err(err) = sessions.push_flash(token, flash) {
                    warn!(error = %err, "could not record access-denied flash");
                }
            }
            ServiceError::AccessDenied(denied).into_response()
        }
        Err(other) => other.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[tokio::test]
    async fn blocking_work_leaves_the_runtime_thread() {
        let runtime_thread = thread::current().id();
        let worker_thread = run_blocking(|| Ok(thread::current().id()))
            .await
            .expect("work completes");
        assert_ne!(worker_thread, runtime_thread);
    }

    #[tokio::test]
    async fn panicking_work_becomes_a_server_error() {
        let err = run_blocking::<(), _>(|| panic!("gateway exploded"))
            .await
            .expect_err("panic surfaces as an error");
        assert_eq!(err.code(), "worker_failed");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn workflow_errors_pass_through() {
        let err = run_blocking::<(), _>(|| Err(ServiceError::not_found("no such vacancy")))
            .await
            .expect_err("error kept");
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }
}
