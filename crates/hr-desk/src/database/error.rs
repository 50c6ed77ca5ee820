use rusqlite::ErrorCode;

const SQLITE_CONSTRAINT_FOREIGNKEY: i32 = 787;

/// Classified database failure. Each kind carries a stable machine code and a
/// fixed user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    PermissionDenied,
    DatabaseMissing,
    ConnectionLost,
    MissingTable,
    UnknownColumn,
    SyntaxError,
    ForeignKeyViolation,
    ConstraintViolation,
    DataMismatch,
    Other,
}

impl DbErrorKind {
    pub const fn code(self) -> &'static str {
        match self {
            Self::PermissionDenied => "db_permission_denied",
            Self::DatabaseMissing => "db_missing",
            Self::ConnectionLost => "db_connection_lost",
            Self::MissingTable => "db_missing_table",
            Self::UnknownColumn => "db_unknown_column",
            Self::SyntaxError => "db_syntax_error",
            Self::ForeignKeyViolation => "db_foreign_key_violation",
            Self::ConstraintViolation => "db_constraint_violation",
            Self::DataMismatch => "db_data_mismatch",
            Self::Other => "db_error",
        }
    }

    pub const fn message(self) -> &'static str {
        match self {
            Self::PermissionDenied => "Access to the database was denied.",
            Self::DatabaseMissing => "The configured database could not be found.",
            Self::ConnectionLost => "The connection to the database was lost.",
            Self::MissingTable => "Table or view does not exist.",
            Self::UnknownColumn => "Unknown column in SQL.",
            Self::SyntaxError => "Syntax error in SQL.",
            Self::ForeignKeyViolation => "Foreign key constraint violated.",
            Self::ConstraintViolation => "Integrity constraint violated.",
            Self::DataMismatch => "Invalid data type or format.",
            Self::Other => "Database error.",
        }
    }

    /// The store cannot be reached at all; retrying later may succeed.
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::PermissionDenied | Self::DatabaseMissing | Self::ConnectionLost
        )
    }

    /// The request carried data the schema rejects.
    pub const fn is_data_violation(self) -> bool {
        matches!(
            self,
            Self::ForeignKeyViolation | Self::ConstraintViolation | Self::DataMismatch
        )
    }

    fn classify(code: ErrorCode, extended_code: i32, text: &str) -> Self {
        match code {
            ErrorCode::PermissionDenied
            | ErrorCode::AuthorizationForStatementDenied
            | ErrorCode::ReadOnly => Self::PermissionDenied,
            ErrorCode::CannotOpen | ErrorCode::NotADatabase => Self::DatabaseMissing,
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::SystemIoFailure
            | ErrorCode::FileLockingProtocolFailed => Self::ConnectionLost,
            ErrorCode::ConstraintViolation if extended_code == SQLITE_CONSTRAINT_FOREIGNKEY => {
                Self::ForeignKeyViolation
            }
            ErrorCode::ConstraintViolation => Self::ConstraintViolation,
            ErrorCode::TypeMismatch | ErrorCode::ParameterOutOfRange | ErrorCode::TooBig => {
                Self::DataMismatch
            }
            _ => {
                // SQLITE_ERROR covers several distinct faults; only the text tells them apart
                let text = text.to_ascii_lowercase();
                if text.contains("no such table") || text.contains("no such view") {
                    Self::MissingTable
                } else if text.contains("no such column") || text.contains("has no column") {
                    Self::UnknownColumn
                } else if text.contains("syntax error") || text.contains("incomplete input") {
                    Self::SyntaxError
                } else {
                    Self::Other
                }
            }
        }
    }
}

/// Typed failure produced by the SQL gateway.
#[derive(Debug, thiserror::Error)]
pub enum SqlError {
    #[error("{} (code {code})", kind.message())]
    Database {
        kind: DbErrorKind,
        code: i32,
        #[source]
        source: rusqlite::Error,
    },
    #[error("No record matches the given parameters.")]
    NotFound,
    #[error("Expected exactly one result row, got {count}. Refine the filters.")]
    Ambiguous { count: usize },
    #[error("SQL script '{0}' is not registered")]
    UnknownScript(String),
    #[error("{message}")]
    Unexpected {
        message: String,
        /// Only populated in debug mode.
        detail: Option<String>,
    },
}

impl SqlError {
    /// Translate a driver error. Anything that is not a database failure is
    /// wrapped as `Unexpected`, with diagnostic detail only when `debug` is set.
    pub fn from_driver(err: rusqlite::Error, debug: bool) -> Self {
        let ffi_error = match &err {
            rusqlite::Error::SqliteFailure(ffi_error, _) => Some(*ffi_error),
            rusqlite::Error::SqlInputError { error, .. } => Some(*error),
            _ => None,
        };
        match ffi_error {
            Some(ffi_error) => {
                let kind =
                    DbErrorKind::classify(ffi_error.code, ffi_error.extended_code, &err.to_string());
                Self::Database {
                    kind,
                    code: ffi_error.extended_code,
                    source: err,
                }
            }
            None => Self::unexpected(&err, debug),
        }
    }

    pub fn unexpected(err: &dyn std::fmt::Display, debug: bool) -> Self {
        if debug {
            Self::Unexpected {
                message: format!("Unexpected error: {err}"),
                detail: Some(err.to_string()),
            }
        } else {
            Self::Unexpected {
                message: "Unexpected error while executing the query.".to_string(),
                detail: None,
            }
        }
    }

    pub fn kind(&self) -> Option<DbErrorKind> {
        match self {
            Self::Database { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Stable machine-readable code for API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database { kind, .. } => kind.code(),
            Self::NotFound => "not_found",
            Self::Ambiguous { .. } => "ambiguous_result",
            Self::UnknownScript(_) => "unknown_script",
            Self::Unexpected { .. } => "unexpected",
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind().is_some_and(DbErrorKind::is_transient)
    }
}
