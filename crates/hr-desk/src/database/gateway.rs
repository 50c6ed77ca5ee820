use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Batch, Connection, OpenFlags, Params, Statement, ToSql, Transaction};
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};
use tracing::{debug, error};

use super::error::SqlError;
use super::provider::ScriptProvider;

/// A result row keyed by column name.
pub type Row = Map<String, Value>;

/// Named parameters as produced by `rusqlite::named_params!`.
pub type NamedParams<'a> = &'a [(&'a str, &'a dyn ToSql)];

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens one connection per gateway call.
#[derive(Debug, Clone)]
pub struct Connector {
    path: PathBuf,
    create_if_missing: bool,
}

impl Connector {
    /// Connects to an existing database file; a missing file is a failure.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            create_if_missing: false,
        }
    }

    /// Connects and creates the file when absent (bootstrap only).
    pub fn creating(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            create_if_missing: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> rusqlite::Result<Connection> {
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        let conn = Connection::open_with_flags(&self.path, flags)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }
}

/// Row-count expectations for single-row lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RowExpectation {
    /// Zero rows is an error instead of `None`.
    pub required: bool,
    /// Fetch everything and fail unless exactly one row came back.
    pub strict_one: bool,
}

impl RowExpectation {
    pub const OPTIONAL: Self = Self {
        required: false,
        strict_one: false,
    };
    pub const REQUIRED: Self = Self {
        required: true,
        strict_one: false,
    };
    pub const EXACTLY_ONE: Self = Self {
        required: true,
        strict_one: true,
    };
}

/// Executes named scripts against the relational store and translates driver
/// failures into `SqlError`.
#[derive(Debug, Clone)]
pub struct SqlGateway {
    scripts: Arc<ScriptProvider>,
    connector: Connector,
    debug: bool,
}

impl SqlGateway {
    pub fn new(scripts: Arc<ScriptProvider>, connector: Connector, debug: bool) -> Self {
        Self {
            scripts,
            connector,
            debug,
        }
    }

    pub fn scripts(&self) -> &ScriptProvider {
        &self.scripts
    }

    pub fn run_many(&self, name: &str, params: NamedParams<'_>) -> Result<Vec<Row>, SqlError> {
        let sql = self.scripts.get(name)?;
        self.within_transaction(name, |tx| {
            let mut stmt = tx.prepare(sql)?;
            let bound = bind_known(&stmt, params)?;
            collect_rows(&mut stmt, bound.as_slice(), None)
        })
    }

    pub fn run_one(
        &self,
        name: &str,
        params: NamedParams<'_>,
        expect: RowExpectation,
    ) -> Result<Option<Row>, SqlError> {
        let sql = self.scripts.get(name)?;
        let limit = if expect.strict_one { None } else { Some(1) };
        let mut rows = self.within_transaction(name, |tx| {
            let mut stmt = tx.prepare(sql)?;
            let bound = bind_known(&stmt, params)?;
            collect_rows(&mut stmt, bound.as_slice(), limit)
        })?;

        match rows.len() {
            0 if expect.required => Err(SqlError::NotFound),
            0 => Ok(None),
            1 => Ok(rows.pop()),
            count => Err(SqlError::Ambiguous { count }),
        }
    }

    /// INSERT/UPDATE/DELETE; returns the affected-row count.
    pub fn execute(&self, name: &str, params: NamedParams<'_>) -> Result<usize, SqlError> {
        let sql = self.scripts.get(name)?;
        self.within_transaction(name, |tx| {
            let mut stmt = tx.prepare(sql)?;
            let bound = bind_known(&stmt, params)?;
            stmt.execute(bound.as_slice())
        })
    }

    /// INSERT; returns the new row identifier.
    pub fn execute_returning_id(
        &self,
        name: &str,
        params: NamedParams<'_>,
    ) -> Result<i64, SqlError> {
        let sql = self.scripts.get(name)?;
        self.within_transaction(name, |tx| {
            let mut stmt = tx.prepare(sql)?;
            let bound = bind_known(&stmt, params)?;
            stmt.execute(bound.as_slice())?;
            Ok(tx.last_insert_rowid())
        })
    }

    /// Run a procedure script. Every statement binds the ordered arguments
    /// positionally (`?1`, `?2`, ...); the first result set is returned and the
    /// remaining statements are drained.
    pub fn call_procedure(&self, name: &str, args: &[SqlValue]) -> Result<Vec<Row>, SqlError> {
        let sql = self.scripts.get(name)?;
        self.within_transaction(name, |tx| {
            let mut batch = Batch::new(tx, sql);
            let mut first: Option<Vec<Row>> = None;
            while let Some(mut stmt) = batch.next()? {
                let bound = params_from_iter(args.iter().take(stmt.parameter_count()));
                if stmt.column_count() == 0 {
                    stmt.execute(bound)?;
                    continue;
                }
                let rows = collect_rows(&mut stmt, bound, None)?;
                if first.is_none() {
                    first = Some(rows);
                }
            }
            Ok(first.unwrap_or_default())
        })
    }

    /// Execute a multi-statement script without parameters (schema bootstrap).
    pub fn apply_script(&self, name: &str) -> Result<(), SqlError> {
        let sql = self.scripts.get(name)?;
        self.within_transaction(name, |tx| tx.execute_batch(sql))
    }

    fn within_transaction<T>(
        &self,
        name: &str,
        op: impl FnOnce(&Transaction<'_>) -> rusqlite::Result<T>,
    ) -> Result<T, SqlError> {
        debug!(script = name, "executing sql script");
        run_in_transaction(&self.connector, op).map_err(|err| self.translate(name, err))
    }

    fn translate(&self, name: &str, err: rusqlite::Error) -> SqlError {
        if self.debug {
            error!(script = name, error = ?err, "sql execution failed");
        }
        let translated = SqlError::from_driver(err, self.debug);
        error!(
            script = name,
            code = translated.code(),
            error = %translated,
            "sql execution failed"
        );
        translated
    }
}

/// Commit on success; any error drops the transaction (rollback) and the
/// connection is released when this returns.
fn run_in_transaction<T>(
    connector: &Connector,
    op: impl FnOnce(&Transaction<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<T> {
    let mut conn = connector.open()?;
    let tx = conn.transaction()?;
    let value = op(&tx)?;
    tx.commit()?;
    Ok(value)
}

/// Keep only the parameters the statement references, so one parameter set
/// can serve scripts that use a subset of it.
fn bind_known<'p>(
    stmt: &Statement<'_>,
    params: NamedParams<'p>,
) -> rusqlite::Result<Vec<(&'p str, &'p dyn ToSql)>> {
    let mut bound = Vec::with_capacity(params.len());
    for &(name, value) in params {
        if stmt.parameter_index(name)?.is_some() {
            bound.push((name, value));
        }
    }
    Ok(bound)
}

fn collect_rows<P: Params>(
    stmt: &mut Statement<'_>,
    params: P,
    limit: Option<usize>,
) -> rusqlite::Result<Vec<Row>> {
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut rows = stmt.query(params)?;
    let mut collected = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Row::new();
        for (index, column) in columns.iter().enumerate() {
            record.insert(column.clone(), json_value(row.get_ref(index)?));
        }
        collected.push(record);
        if limit.is_some_and(|limit| collected.len() >= limit) {
            break;
        }
    }
    Ok(collected)
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(number) => Value::from(number),
        ValueRef::Real(number) => Number::from_f64(number)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// Deserialize a row into a typed record.
pub fn decode_row<T: DeserializeOwned>(row: Row) -> Result<T, SqlError> {
    serde_json::from_value(Value::Object(row)).map_err(|err| SqlError::Unexpected {
        message: format!("Result row has an unexpected shape: {err}"),
        detail: None,
    })
}

pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>, SqlError> {
    rows.into_iter().map(decode_row).collect()
}

/// Borrow owned `(name, value)` pairs as named parameters.
pub fn bind_named(values: &[(String, SqlValue)]) -> Vec<(&str, &dyn ToSql)> {
    values
        .iter()
        .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
        .collect()
}
