//! Monthly reports: aggregate tables filled by build procedures, read back by
//! period, with a history of every build.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::access::{section, AccessGate};
use crate::database::{
    bind_named, decode_row, named_params, Row, RowExpectation, SqlError, SqlGateway, SqlValue,
};
use crate::error::ServiceError;
use crate::forms::{collect, FormValues, RawForm, ValidationFailure};
use crate::session::{Caller, Flash, FlashLevel, SessionStore};
use crate::web::{resolve_caller, respond, run_blocking};

use super::catalog::{Catalog, ReportDefinition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportAction {
    /// Read an already built period.
    View,
    /// Build the period if needed, then read it.
    Create,
}

impl ReportAction {
    fn from_form(form: &RawForm) -> Result<Self, ValidationFailure> {
        match form.text("action").as_deref() {
            Some("view") => Ok(Self::View),
            Some("create") => Ok(Self::Create),
            _ => Err(ValidationFailure::single(
                "action",
                "Action must be 'view' or 'create'",
                form,
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportOutcome {
    pub report_id: String,
    pub title: String,
    pub action: ReportAction,
    pub rows: Vec<Row>,
    /// The build procedure ran during this call.
    pub built: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_id: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LogRecord {
    report_id: String,
    #[serde(default)]
    params_json: Option<String>,
}

pub struct ReportRunner<B> {
    gate: AccessGate,
    gateway: SqlGateway,
    catalog: Arc<Catalog>,
    sessions: Arc<B>,
}

impl<B> ReportRunner<B>
where
    B: SessionStore + 'static,
{
    pub fn new(gate: AccessGate, gateway: SqlGateway, catalog: Arc<Catalog>, sessions: Arc<B>) -> Self {
        Self {
            gate,
            gateway,
            catalog,
            sessions,
        }
    }

    pub fn sessions(&self) -> &B {
        &self.sessions
    }

    pub fn list(&self, caller: Option<&Caller>) -> Result<Vec<ReportDefinition>, ServiceError> {
        self.gate.admit(caller, section::REPORTS)?;
        Ok(self.catalog.reports().to_vec())
    }

    /// Expects `report_id`, `action` and the report's declared fields.
    pub fn run(&self, caller: Option<&Caller>, form: &RawForm) -> Result<ReportOutcome, ServiceError> {
        let caller = self.gate.admit(caller, section::REPORTS)?;
        let report_id = form
            .text("report_id")
            .ok_or_else(|| ServiceError::not_found("Choose a report"))?;
        let report = self
            .catalog
            .report(&report_id)
            .ok_or_else(|| ServiceError::not_found(format!("Unknown report '{report_id}'")))?;
        let action = ReportAction::from_form(form)?;
        let values = collect(form, &report.fields)?;

        match action {
            ReportAction::View => {
                if !self.is_built(report, &values)? {
                    return Err(ServiceError::not_found(
                        "No report has been built for the given period",
                    ));
                }
                Ok(self.outcome(report, action, self.select(report, &values)?))
            }
            ReportAction::Create => {
                self.gate.admit(Some(caller), section::REPORTS_BUILD)?;
                self.create(caller, report, &values)
            }
        }
    }

    fn create(
        &self,
        caller: &Caller,
        report: &ReportDefinition,
        values: &FormValues,
    ) -> Result<ReportOutcome, ServiceError> {
        if self.is_built(report, values)? {
            self.flash(caller, FlashLevel::Info, "Report for this period already exists");
            return Ok(self.outcome(report, ReportAction::Create, self.select(report, values)?));
        }

        // procedures that declare one more parameter than `arg_order` receive the login
        let mut args = values.ordered(&report.arg_order);
        args.push(SqlValue::Text(caller.identity.login.clone()));
        self.gateway.call_procedure(&report.build_procedure, &args)?;

        let rows = self.select(report, values)?;
        let mut outcome = self.outcome(report, ReportAction::Create, rows);
        outcome.built = true;
        info!(
            report = %report.id,
            rows = outcome.rows.len(),
            login = %caller.identity.login,
            "report built"
        );

        match self.record_history(caller, report, values, outcome.rows.len()) {
            Ok(log_id) => outcome.log_id = Some(log_id),
            Err(err) => {
                warn!(report = %report.id, error = %err, "report history not recorded");
                let message = format!("Report was built but not added to history: {err}");
                self.flash(caller, FlashLevel::Warning, &message);
                outcome.warnings.push(message);
            }
        }
        self.flash(caller, FlashLevel::Success, "Report created");
        Ok(outcome)
    }

    pub fn history(&self, caller: Option<&Caller>) -> Result<Vec<Row>, ServiceError> {
        self.gate.admit(caller, section::REPORTS)?;
        Ok(self.gateway.run_many("report_log_list.sql", &[])?)
    }

    /// Re-read a logged report with the parameters it was built with.
    pub fn history_entry(&self, caller: Option<&Caller>, log_id: i64) -> Result<ReportOutcome, ServiceError> {
        self.gate.admit(caller, section::REPORTS)?;
        let record: LogRecord = self
            .gateway
            .run_one(
                "report_log_get.sql",
                named_params! { ":log_id": log_id },
                RowExpectation::REQUIRED,
            )?
            .map(decode_row)
            .transpose()?
            .ok_or(SqlError::NotFound)?;

        let report = self.catalog.report(&record.report_id).ok_or_else(|| {
            ServiceError::not_found(format!(
                "Report type '{}' no longer exists",
                record.report_id
            ))
        })?;
        let stored = record
            .params_json
            .as_deref()
            .and_then(|raw| serde_json::from_str::<serde_json::Map<String, Value>>(raw).ok())
            .unwrap_or_default();
        let form = RawForm(stored.into_iter().collect());
        let values = collect(&form, &report.fields)?;

        let mut outcome = self.outcome(report, ReportAction::View, self.select(report, &values)?);
        outcome.log_id = Some(log_id);
        Ok(outcome)
    }

    fn is_built(&self, report: &ReportDefinition, values: &FormValues) -> Result<bool, SqlError> {
        let params = values.named_params();
        let row = self.gateway.run_one(
            &report.exists_script,
            &bind_named(&params),
            RowExpectation::REQUIRED,
        )?;
        let count = row
            .as_ref()
            .and_then(|row| row.get("cnt").or_else(|| row.get("count")))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        Ok(count > 0)
    }

    fn select(&self, report: &ReportDefinition, values: &FormValues) -> Result<Vec<Row>, SqlError> {
        let params = values.named_params();
        self.gateway
            .run_many(&report.select_script, &bind_named(&params))
    }

    fn record_history(
        &self,
        caller: &Caller,
        report: &ReportDefinition,
        values: &FormValues,
        row_count: usize,
    ) -> Result<i64, SqlError> {
        let params_json = Value::Object(values.as_json()).to_string();
        let row_count = row_count as i64;
        self.gateway.execute_returning_id(
            "report_log_insert.sql",
            named_params! {
                ":report_id": report.id,
                ":params_json": params_json,
                ":row_count": row_count,
                ":created_by": caller.identity.login,
            },
        )
    }

    fn outcome(&self, report: &ReportDefinition, action: ReportAction, rows: Vec<Row>) -> ReportOutcome {
        ReportOutcome {
            report_id: report.id.clone(),
            title: report.title.clone(),
            action,
            rows,
            built: false,
            log_id: None,
            warnings: Vec::new(),
        }
    }

    fn flash(&self, caller: &Caller, level: FlashLevel, message: &str) {
        if let Err(err) = self.sessions.push_flash(&caller.token, Flash::new(level, message)) {
            warn!(error = %err, "could not record report flash");
        }
    }
}

pub fn report_router<B>(runner: Arc<ReportRunner<B>>) -> Router
where
    B: SessionStore + 'static,
{
    Router::new()
        .route("/api/v1/reports", get(list_handler::<B>))
        .route("/api/v1/reports/run", post(run_handler::<B>))
        .route("/api/v1/reports/history", get(history_handler::<B>))
        .route(
            "/api/v1/reports/history/:log_id",
            get(history_entry_handler::<B>),
        )
        .with_state(runner)
}

pub(crate) async fn list_handler<B>(
    State(runner): State<Arc<ReportRunner<B>>>,
    headers: HeaderMap,
) -> Response
where
    B: SessionStore + 'static,
{
    let worker = runner.clone();
    let result = run_blocking(move || {
        let caller = resolve_caller(worker.sessions(), &headers)?;
        worker.list(caller.as_ref())
    })
    .await;
    respond(runner.sessions(), result, StatusCode::OK)
}

pub(crate) async fn run_handler<B>(
    State(runner): State<Arc<ReportRunner<B>>>,
    headers: HeaderMap,
    Json(form): Json<RawForm>,
) -> Response
where
    B: SessionStore + 'static,
{
    let worker = runner.clone();
    let result = run_blocking(move || {
        let caller = resolve_caller(worker.sessions(), &headers)?;
        worker.run(caller.as_ref(), &form)
    })
    .await;
    respond(runner.sessions(), result, StatusCode::OK)
}

pub(crate) async fn history_handler<B>(
    State(runner): State<Arc<ReportRunner<B>>>,
    headers: HeaderMap,
) -> Response
where
    B: SessionStore + 'static,
{
    let worker = runner.clone();
    let result = run_blocking(move || {
        let caller = resolve_caller(worker.sessions(), &headers)?;
        worker.history(caller.as_ref())
    })
    .await;
    respond(runner.sessions(), result, StatusCode::OK)
}

pub(crate) async fn history_entry_handler<B>(
    State(runner): State<Arc<ReportRunner<B>>>,
    headers: HeaderMap,
    Path(log_id): Path<i64>,
) -> Response
where
    B: SessionStore + 'static,
{
    let worker = runner.clone();
    let result = run_blocking(move || {
        let caller = resolve_caller(worker.sessions(), &headers)?;
        worker.history_entry(caller.as_ref(), log_id)
    })
    .await;
    respond(runner.sessions(), result, StatusCode::OK)
}
