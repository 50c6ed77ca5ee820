//! SQL execution gateway: named scripts loaded once at startup, executed one
//! connection and one transaction per call, with driver failures translated
//! into a small set of user-facing errors.

mod error;
mod gateway;
mod provider;

pub use error::{DbErrorKind, SqlError};
pub use gateway::{
    bind_named, decode_row, decode_rows, Connector, NamedParams, Row, RowExpectation, SqlGateway,
};
pub use provider::{ScriptError, ScriptProvider};
pub use rusqlite::named_params;
pub use rusqlite::types::Value as SqlValue;
