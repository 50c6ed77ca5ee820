//! Login, logout and the per-role section menu.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::access::{section, AccessDenied, AccessPolicy};
use crate::database::{decode_row, named_params, RowExpectation, SqlError, SqlGateway};
use crate::error::ServiceError;
use crate::forms::{RawForm, ValidationFailure};
use crate::session::{Caller, Flash, Identity, SessionStore, SessionToken};
use crate::web::{resolve_caller, respond, run_blocking, session_token};

const KNOWN_SECTIONS: [&str; 4] = [
    section::INTERVIEWS,
    section::QUERIES,
    section::REPORTS,
    section::REPORTS_BUILD,
];

/// Verifies a login/password pair against the user table.
pub trait CredentialStore: Send + Sync {
    fn authenticate(&self, login: &str, password: &str) -> Result<Option<Identity>, SqlError>;
}

#[derive(Debug, Clone)]
pub struct SqlCredentialStore {
    gateway: SqlGateway,
}

impl SqlCredentialStore {
    pub fn new(gateway: SqlGateway) -> Self {
        Self { gateway }
    }
}

impl CredentialStore for SqlCredentialStore {
    fn authenticate(&self, login: &str, password: &str) -> Result<Option<Identity>, SqlError> {
        match self.gateway.run_one(
            "authenticate.sql",
            named_params! { ":login": login, ":password": password },
            RowExpectation::EXACTLY_ONE,
        ) {
            Ok(row) => row.map(decode_row).transpose(),
            Err(SqlError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub token: SessionToken,
    pub identity: Identity,
}

#[derive(Debug, Clone, Serialize)]
pub struct MenuView {
    pub identity: Identity,
    pub sections: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub login: String,
    #[serde(default, alias = "pass")]
    pub password: String,
}

pub struct AuthService<C, B> {
    credentials: Arc<C>,
    sessions: Arc<B>,
    policy: Arc<AccessPolicy>,
}

impl<C, B> AuthService<C, B>
where
    C: CredentialStore + 'static,
    B: SessionStore + 'static,
{
    pub fn new(credentials: Arc<C>, sessions: Arc<B>, policy: Arc<AccessPolicy>) -> Self {
        Self {
            credentials,
            sessions,
            policy,
        }
    }

    pub fn sessions(&self) -> &B {
        &self.sessions
    }

    /// Both fields are required; the password is never echoed back.
    pub fn login(&self, request: &LoginRequest) -> Result<LoginOutcome, ServiceError> {
        let login = request.login.trim();
        let password = request.password.trim();
        if login.is_empty() || password.is_empty() {
            let form = RawForm::from_pairs([("login", login.into())]);
            return Err(ValidationFailure::single("login", "Enter login and password", &form).into());
        }

        let Some(identity) = self.credentials.authenticate(login, password)? else {
            warn!(target: "hr_desk::audit", login, "login rejected");
            return Err(ServiceError::InvalidCredentials);
        };

        let token = self.sessions.create(identity.clone())?;
        info!(login = %identity.login, role = %identity.role, "login succeeded");
        Ok(LoginOutcome { token, identity })
    }

    pub fn logout(&self, token: &SessionToken) -> Result<(), ServiceError> {
        self.sessions.destroy(token)?;
        Ok(())
    }

    pub fn menu(&self, caller: Option<&Caller>) -> Result<MenuView, ServiceError> {
        let caller = caller.ok_or(AccessDenied::NotAuthenticated)?;
        let sections = KNOWN_SECTIONS
            .iter()
            .filter(|name| self.policy.check(&caller.identity.role, name).is_allowed())
            .map(|name| name.to_string())
            .collect();
        Ok(MenuView {
            identity: caller.identity.clone(),
            sections,
        })
    }

    pub fn flashes(&self, caller: Option<&Caller>) -> Result<Vec<Flash>, ServiceError> {
        let caller = caller.ok_or(AccessDenied::NotAuthenticated)?;
        Ok(self.sessions.take_flashes(&caller.token)?)
    }
}

pub fn auth_router<C, B>(service: Arc<AuthService<C, B>>) -> Router
where
    C: CredentialStore + 'static,
    B: SessionStore + 'static,
{
    Router::new()
        .route("/auth/login", post(login_handler::<C, B>))
        .route("/auth/logout", post(logout_handler::<C, B>))
        .route("/api/v1/menu", get(menu_handler::<C, B>))
        .route("/api/v1/session/flashes", get(flashes_handler::<C, B>))
        .with_state(service)
}

pub(crate) async fn login_handler<C, B>(
    State(service): State<Arc<AuthService<C, B>>>,
    Json(request): Json<LoginRequest>,
) -> Response
where
    C: CredentialStore + 'static,
    B: SessionStore + 'static,
{
    let worker = service.clone();
    let result = run_blocking(move || worker.login(&request)).await;
    respond(service.sessions(), result, StatusCode::OK)
}

pub(crate) async fn logout_handler<C, B>(
    State(service): State<Arc<AuthService<C, B>>>,
    headers: HeaderMap,
) -> Response
where
    C: CredentialStore + 'static,
    B: SessionStore + 'static,
{
    let Some(token) = session_token(&headers) else {
        return StatusCode::NO_CONTENT.into_response();
    };
    match run_blocking(move || service.logout(&token)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn menu_handler<C, B>(
    State(service): State<Arc<AuthService<C, B>>>,
    headers: HeaderMap,
) -> Response
where
    C: CredentialStore + 'static,
    B: SessionStore + 'static,
{
    let worker = service.clone();
    let result = run_blocking(move || {
        let caller = resolve_caller(worker.sessions(), &headers)?;
        worker.menu(caller.as_ref())
    })
    .await;
    respond(service.sessions(), result, StatusCode::OK)
}

pub(crate) async fn flashes_handler<C, B>(
    State(service): State<Arc<AuthService<C, B>>>,
    headers: HeaderMap,
) -> Response
where
    C: CredentialStore + 'static,
    B: SessionStore + 'static,
{
    let worker = service.clone();
    let result = run_blocking(move || {
        let caller = resolve_caller(worker.sessions(), &headers)?;
        worker.flashes(caller.as_ref())
    })
    .await;
    respond(service.sessions(), result, StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{FlashLevel, InMemorySessionStore};
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;

    struct StaticCredentials;

    impl CredentialStore for StaticCredentials {
        fn authenticate(&self, login: &str, password: &str) -> Result<Option<Identity>, SqlError> {
            Ok((login == "hr.lead" && password == "secret").then(|| Identity {
                user_id: 3,
                login: login.to_string(),
                role: "recruiter".to_string(),
            }))
        }
    }

    fn service() -> Arc<AuthService<StaticCredentials, InMemorySessionStore>> {
        let policy = AccessPolicy::from_entries([("recruiter", vec!["interviews", "queries"])]);
        Arc::new(AuthService::new(
            Arc::new(StaticCredentials),
            Arc::new(InMemorySessionStore::default()),
            Arc::new(policy),
        ))
    }

    fn request(login: &str, password: &str) -> LoginRequest {
        LoginRequest {
            login: login.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn blank_fields_fail_validation_keeping_the_login() {
        let err = service()
            .login(&request("  hr.lead ", ""))
            .expect_err("blank password");

        match err {
            ServiceError::Validation(failure) => {
                assert_eq!(failure.values.get("login").map(String::as_str), Some("hr.lead"));
                assert!(!failure.values.contains_key("password"));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn login_creates_a_session_and_logout_ends_it() {
        let service = service();
        let outcome = service
            .login(&request("hr.lead", "secret"))
            .expect("login succeeds");

        let caller = service
            .sessions()
            .caller(&outcome.token)
            .expect("lookup")
            .expect("session exists");
        assert_eq!(caller.identity.role, "recruiter");

        service.logout(&outcome.token).expect("logout");
        assert!(service.sessions().caller(&outcome.token).expect("lookup").is_none());
    }

    #[test]
    fn menu_lists_only_permitted_sections() {
        let service = service();
        let outcome = service.login(&request("hr.lead", "secret")).expect("login");
        let caller = Caller {
            token: outcome.token,
            identity: outcome.identity,
        };

        let menu = service.menu(Some(&caller)).expect("menu");
        assert_eq!(menu.sections, vec!["interviews", "queries"]);
        assert!(matches!(
            service.menu(None),
            Err(ServiceError::AccessDenied(AccessDenied::NotAuthenticated))
        ));
    }

    #[test]
    fn flashes_are_returned_once() {
        let service = service();
        let outcome = service.login(&request("hr.lead", "secret")).expect("login");
        service
            .sessions()
            .push_flash(&outcome.token, Flash::new(FlashLevel::Info, "welcome"))
            .expect("flash");
        let caller = Caller {
            token: outcome.token,
            identity: outcome.identity,
        };

        assert_eq!(service.flashes(Some(&caller)).expect("flashes").len(), 1);
        assert!(service.flashes(Some(&caller)).expect("flashes").is_empty());
    }

    #[tokio::test]
    async fn unknown_credentials_are_unauthorized() {
        let response = auth_router(service())
            .oneshot(
                Request::post("/auth/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"login": "hr.lead", "pass": "wrong"}"#))
                    .expect("request builds"),
            )
            .await
            .expect("route executes");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_without_a_session_is_harmless() {
        let response = auth_router(service())
            .oneshot(
                Request::post("/auth/logout")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("route executes");

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
