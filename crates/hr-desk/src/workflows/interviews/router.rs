use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};

use crate::error::ServiceError;
use crate::forms::RawForm;
use crate::session::SessionStore;
use crate::web::{resolve_caller, respond, run_blocking};

use super::basket::BasketRepository;
use super::domain::Basket;
use super::service::{candidate_from_form, AppointmentService, AppointmentSlot};
use super::store::InterviewStore;

/// Router builder exposing the interview-appointment endpoints.
pub fn interview_router<S, B>(service: Arc<AppointmentService<S, B>>) -> Router
where
    S: InterviewStore + 'static,
    B: BasketRepository + SessionStore + 'static,
{
    Router::new()
        .route("/api/v1/interviews/menu", get(menu_handler::<S, B>))
        .route(
            "/api/v1/interviews/candidates",
            get(candidates_handler::<S, B>),
        )
        .route("/api/v1/interviews/basket/add", post(add_handler::<S, B>))
        .route(
            "/api/v1/interviews/basket/remove",
            post(remove_handler::<S, B>),
        )
        .route("/api/v1/interviews/confirm", post(confirm_handler::<S, B>))
        .with_state(service)
}

pub(crate) async fn menu_handler<S, B>(
    State(service): State<Arc<AppointmentService<S, B>>>,
    headers: HeaderMap,
) -> Response
where
    S: InterviewStore + 'static,
    B: BasketRepository + SessionStore + 'static,
{
    let worker = service.clone();
    let result = run_blocking(move || {
        let caller = resolve_caller(worker.sessions(), &headers)?;
        worker.view_menu(caller.as_ref())
    })
    .await;
    respond(service.sessions(), result, StatusCode::OK)
}

pub(crate) async fn candidates_handler<S, B>(
    State(service): State<Arc<AppointmentService<S, B>>>,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
) -> Response
where
    S: InterviewStore + 'static,
    B: BasketRepository + SessionStore + 'static,
{
    let form = RawForm::from_query(query);
    let worker = service.clone();
    let result = run_blocking(move || {
        let caller = resolve_caller(worker.sessions(), &headers)?;
        worker.admit(caller.as_ref())?;
        let slot = AppointmentSlot::from_form(&form)?;
        worker.view_candidates(caller.as_ref(), &slot)
    })
    .await;
    respond(service.sessions(), result, StatusCode::OK)
}

pub(crate) async fn add_handler<S, B>(
    State(service): State<Arc<AppointmentService<S, B>>>,
    headers: HeaderMap,
    Json(form): Json<RawForm>,
) -> Response
where
    S: InterviewStore + 'static,
    B: BasketRepository + SessionStore + 'static,
{
    let worker = service.clone();
    let result =
        run_blocking(move || mutate_basket(&worker, &headers, &form, BasketChange::Add)).await;
    respond(service.sessions(), result, StatusCode::OK)
}

pub(crate) async fn remove_handler<S, B>(
    State(service): State<Arc<AppointmentService<S, B>>>,
    headers: HeaderMap,
    Json(form): Json<RawForm>,
) -> Response
where
    S: InterviewStore + 'static,
    B: BasketRepository + SessionStore + 'static,
{
    let worker = service.clone();
    let result =
        run_blocking(move || mutate_basket(&worker, &headers, &form, BasketChange::Remove)).await;
    respond(service.sessions(), result, StatusCode::OK)
}

pub(crate) async fn confirm_handler<S, B>(
    State(service): State<Arc<AppointmentService<S, B>>>,
    headers: HeaderMap,
    Json(form): Json<RawForm>,
) -> Response
where
    S: InterviewStore + 'static,
    B: BasketRepository + SessionStore + 'static,
{
    let worker = service.clone();
    let result = run_blocking(move || {
        let caller = resolve_caller(worker.sessions(), &headers)?;
        worker.admit(caller.as_ref())?;
        let slot = AppointmentSlot::from_form(&form)?;
        worker.confirm(caller.as_ref(), &slot)
    })
    .await;
    respond(service.sessions(), result, StatusCode::CREATED)
}

enum BasketChange {
    Add,
    Remove,
}

fn mutate_basket<S, B>(
    service: &AppointmentService<S, B>,
    headers: &HeaderMap,
    form: &RawForm,
    change: BasketChange,
) -> Result<Basket, ServiceError>
where
    S: InterviewStore + 'static,
    B: BasketRepository + SessionStore + 'static,
{
    let caller = resolve_caller(service.sessions(), headers)?;
    service.admit(caller.as_ref())?;
    let slot = AppointmentSlot::from_form(form)?;
    let candidate_id = candidate_from_form(form)?;
    match change {
        BasketChange::Add => service.add_to_basket(caller.as_ref(), &slot, candidate_id),
        BasketChange::Remove => service.remove_from_basket(caller.as_ref(), &slot, candidate_id),
    }
}
