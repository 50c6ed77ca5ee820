use crate::access::{AccessDenied, AccessPolicyError};
use crate::config::ConfigError;
use crate::database::{ScriptError, SqlError};
use crate::forms::ValidationFailure;
use crate::session::RepositoryError;
use crate::telemetry::TelemetryError;
use crate::workflows::CatalogError;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

/// Startup and process-level failures.
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Scripts(ScriptError),
    AccessPolicy(AccessPolicyError),
    Catalog(CatalogError),
    Sql(SqlError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Scripts(err) => write!(f, "sql script error: {}", err),
            AppError::AccessPolicy(err) => write!(f, "access policy error: {}", err),
            AppError::Catalog(err) => write!(f, "catalog error: {}", err),
            AppError::Sql(err) => write!(f, "database error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Scripts(err) => Some(err),
            AppError::AccessPolicy(err) => Some(err),
            AppError::Catalog(err) => Some(err),
            AppError::Sql(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string() }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<ScriptError> for AppError {
    fn from(value: ScriptError) -> Self {
        Self::Scripts(value)
    }
}

impl From<AccessPolicyError> for AppError {
    fn from(value: AccessPolicyError) -> Self {
        Self::AccessPolicy(value)
    }
}

impl From<CatalogError> for AppError {
    fn from(value: CatalogError) -> Self {
        Self::Catalog(value)
    }
}

impl From<SqlError> for AppError {
    fn from(value: SqlError) -> Self {
        Self::Sql(value)
    }
}

/// Domain rules that reject an otherwise well-formed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusinessRule {
    BasketEmpty,
    VacancyClosed,
}

impl BusinessRule {
    pub fn code(self) -> &'static str {
        match self {
            Self::BasketEmpty => "basket_empty",
            Self::VacancyClosed => "vacancy_closed",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::BasketEmpty => "The basket is empty; add candidates before confirming.",
            Self::VacancyClosed => "The vacancy is closed for new interviews.",
        }
    }
}

/// Request-level outcome of every workflow operation. Nothing here is fatal.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    AccessDenied(#[from] AccessDenied),
    #[error("{0}")]
    Validation(#[from] ValidationFailure),
    #[error("{message}")]
    NotFound { message: String },
    #[error("{message}")]
    Ambiguous { message: String },
    #[error("{message}")]
    BackendUnavailable { code: &'static str, message: String },
    #[error(transparent)]
    Database(SqlError),
    #[error("{}", .0.message())]
    BusinessRule(BusinessRule),
    #[error("invalid login or password")]
    InvalidCredentials,
    #[error("request worker failed: {message}")]
    Worker { message: String },
}

impl ServiceError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AccessDenied(AccessDenied::NotAuthenticated) => "not_authenticated",
            Self::AccessDenied(AccessDenied::Forbidden { .. }) => "access_denied",
            Self::Validation(_) => "validation_failed",
            Self::NotFound { .. } => "not_found",
            Self::Ambiguous { .. } => "ambiguous_result",
            Self::BackendUnavailable { code, .. } => *code,
            Self::Database(err) => err.code(),
            Self::BusinessRule(rule) => rule.code(),
            Self::InvalidCredentials => "invalid_credentials",
            Self::Worker { .. } => "worker_failed",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::AccessDenied(_) => StatusCode::SEE_OTHER,
            Self::Validation(_) | Self::BusinessRule(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Ambiguous { .. } => StatusCode::CONFLICT,
            Self::BackendUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(err) if err.kind().is_some_and(|kind| kind.is_data_violation()) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Worker { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SqlError> for ServiceError {
    fn from(value: SqlError) -> Self {
        match value {
            SqlError::NotFound => Self::NotFound {
                message: value.to_string(),
            },
            SqlError::Ambiguous { .. } => Self::Ambiguous {
                message: value.to_string(),
            },
            err if err.is_transient() => Self::BackendUnavailable {
                code: err.code(),
                message: err.to_string(),
            },
            err => Self::Database(err),
        }
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::UnknownSession => Self::AccessDenied(AccessDenied::NotAuthenticated),
            RepositoryError::Unavailable(message) => Self::BackendUnavailable {
                code: "session_unavailable",
                message,
            },
        }
    }
}

impl From<tokio::task::JoinError> for ServiceError {
    fn from(value: tokio::task::JoinError) -> Self {
        let message = if value.is_panic() {
            "workflow call panicked".to_string()
        } else {
            value.to_string()
        };
        Self::Worker { message }
    }
}

/// Where a denied caller is sent.
pub fn redirect_target(denied: &AccessDenied) -> &'static str {
    match denied {
        AccessDenied::NotAuthenticated => "/auth/login",
        AccessDenied::Forbidden { .. } => "/api/v1/menu",
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        match self {
            ServiceError::AccessDenied(denied) => {
                let body = Json(json!({
                    "error": denied.to_string(),
                    "code": code,
                    "redirect": redirect_target(&denied),
                }));
                (
                    status,
                    [(header::LOCATION, redirect_target(&denied))],
                    body,
                )
                    .into_response()
            }
            ServiceError::Validation(failure) => {
                let body = Json(json!({
                    "error": failure.to_string(),
                    "code": code,
                    "fields": failure.errors,
                    "values": failure.values,
                }));
                (status, body).into_response()
            }
            other => {
                let body = Json(json!({ "error": other.to_string(), "code": code }));
                (status, body).into_response()
            }
        }
    }
}
