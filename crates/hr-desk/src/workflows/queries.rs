//! Parameterized ad-hoc queries from the catalog.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::access::{section, AccessGate};
use crate::database::{bind_named, Row, SqlGateway};
use crate::error::ServiceError;
use crate::forms::{collect, RawForm};
use crate::session::{Caller, SessionStore};
use crate::web::{resolve_caller, respond, run_blocking};

use super::catalog::{Catalog, QueryDefinition};

/// One submitted filter as shown next to the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterDisplay {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub query_id: String,
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
    pub filters: Vec<FilterDisplay>,
}

pub struct QueryRunner<B> {
    gate: AccessGate,
    gateway: SqlGateway,
    catalog: Arc<Catalog>,
    sessions: Arc<B>,
}

impl<B> QueryRunner<B>
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

    pub fn list(&self, caller: Option<&Caller>) -> Result<Vec<QueryDefinition>, ServiceError> {
        self.gate.admit(caller, section::QUERIES)?;
        Ok(self.catalog.queries().to_vec())
    }

    /// `query_id` is read from the form alongside the declared fields.
    pub fn run(&self, caller: Option<&Caller>, form: &RawForm) -> Result<QueryResult, ServiceError> {
        self.gate.admit(caller, section::QUERIES)?;
        let query_id = form
            .text("query_id")
            .ok_or_else(|| ServiceError::not_found("Choose a query to run"))?;
        let query = self
            .catalog
            .query(&query_id)
            .ok_or_else(|| ServiceError::not_found(format!("Unknown query '{query_id}'")))?;

        let values = collect(form, &query.fields)?;
        let params = values.named_params();
        let rows = self.gateway.run_many(&query.script, &bind_named(&params))?;

        let headers = rows
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default();
        let filters = query
            .fields
            .iter()
            .map(|field| FilterDisplay {
                label: field.label.clone(),
                value: values
                    .get(&field.name)
                    .map(|value| value.display())
                    .unwrap_or_default(),
            })
            .collect();

        Ok(QueryResult {
            query_id,
            title: query.title.clone(),
            headers,
            rows,
            filters,
        })
    }
}

pub fn query_router<B>(runner: Arc<QueryRunner<B>>) -> Router
where
    B: SessionStore + 'static,
{
    Router::new()
        .route("/api/v1/queries", get(list_handler::<B>))
        .route("/api/v1/queries/run", post(run_handler::<B>))
        .with_state(runner)
}

pub(crate) async fn list_handler<B>(
    State(runner): State<Arc<QueryRunner<B>>>,
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
    State(runner): State<Arc<QueryRunner<B>>>,
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
