use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{ApplicantId, ApplicationId, ApplicationStatusView, NewApplication};
use super::errors::WorkflowError;
use super::payments::{PaymentLedger, PaymentOutcome};
use super::repository::{ApplicationFilter, ApplicationRepository, RepositoryError};
use super::service::AdmissionsWorkflow;

type SharedWorkflow<R, L> = Arc<AdmissionsWorkflow<R, L>>;

#[derive(Debug, Deserialize)]
pub(crate) struct PaymentRequest {
    pub(crate) applicant_id: ApplicantId,
    #[serde(flatten)]
    pub(crate) outcome: PaymentOutcome,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CofounderRequest {
    pub(crate) name: String,
    pub(crate) email: String,
}

/// Router exposing the admissions workflow over JSON.
pub fn admissions_router<R, L>(workflow: SharedWorkflow<R, L>) -> Router
where
    R: ApplicationRepository + 'static,
    L: PaymentLedger + 'static,
{
    Router::new()
        .route(
            "/api/v1/admissions/applications",
            post(create_handler::<R, L>).get(list_handler::<R, L>),
        )
        .route(
            "/api/v1/admissions/applications/:application_id",
            get(status_handler::<R, L>).delete(delete_handler::<R, L>),
        )
        .route(
            "/api/v1/admissions/applications/:application_id/payments",
            post(payment_handler::<R, L>),
        )
        .route(
            "/api/v1/admissions/applications/:application_id/cofounders",
            post(cofounder_handler::<R, L>),
        )
        .route(
            "/api/v1/admissions/applications/:application_id/stages/:stage_number/submission",
            post(submit_handler::<R, L>).delete(redo_handler::<R, L>),
        )
        .route(
            "/api/v1/admissions/applications/:application_id/review",
            post(review_handler::<R, L>),
        )
        .route(
            "/api/v1/admissions/applications/:application_id/advance",
            post(advance_handler::<R, L>),
        )
        .with_state(workflow)
}

pub(crate) async fn create_handler<R, L>(
    State(workflow): State<SharedWorkflow<R, L>>,
    Json(request): Json<NewApplication>,
) -> Response
where
    R: ApplicationRepository + 'static,
    L: PaymentLedger + 'static,
{
    match workflow.create_application(request) {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(error) => rejection(error),
    }
}

pub(crate) async fn list_handler<R, L>(
    State(workflow): State<SharedWorkflow<R, L>>,
    Query(filter): Query<ApplicationFilter>,
) -> Response
where
    R: ApplicationRepository + 'static,
    L: PaymentLedger + 'static,
{
    match workflow.list(&filter) {
        Ok(records) => {
            let views: Vec<ApplicationStatusView> =
                records.iter().map(|record| record.status_view()).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(error) => rejection(error),
    }
}

pub(crate) async fn status_handler<R, L>(
    State(workflow): State<SharedWorkflow<R, L>>,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    L: PaymentLedger + 'static,
{
    match workflow.get(&ApplicationId(application_id)) {
        Ok(record) => (StatusCode::OK, Json(record.status_view())).into_response(),
        Err(error) => rejection(error),
    }
}

pub(crate) async fn delete_handler<R, L>(
    State(workflow): State<SharedWorkflow<R, L>>,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    L: PaymentLedger + 'static,
{
    match workflow.delete_application(&ApplicationId(application_id)) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => rejection(error),
    }
}

pub(crate) async fn payment_handler<R, L>(
    State(workflow): State<SharedWorkflow<R, L>>,
    Path(application_id): Path<String>,
    Json(request): Json<PaymentRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    L: PaymentLedger + 'static,
{
    let id = ApplicationId(application_id);
    match workflow.record_payment(&id, &request.applicant_id, request.outcome) {
        Ok(payment) => (StatusCode::CREATED, Json(payment)).into_response(),
        Err(error) => rejection(error),
    }
}

pub(crate) async fn cofounder_handler<R, L>(
    State(workflow): State<SharedWorkflow<R, L>>,
    Path(application_id): Path<String>,
    Json(request): Json<CofounderRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    L: PaymentLedger + 'static,
{
    let id = ApplicationId(application_id);
    match workflow.add_cofounder(&id, &request.name, &request.email) {
        Ok(record) => (StatusCode::CREATED, Json(record.status_view())).into_response(),
        Err(error) => rejection(error),
    }
}

pub(crate) async fn submit_handler<R, L>(
    State(workflow): State<SharedWorkflow<R, L>>,
    Path((application_id, stage_number)): Path<(String, u32)>,
    Json(payload): Json<BTreeMap<String, String>>,
) -> Response
where
    R: ApplicationRepository + 'static,
    L: PaymentLedger + 'static,
{
    let id = ApplicationId(application_id);
    match workflow.submit(&id, stage_number, &payload) {
        Ok(accepted) => (StatusCode::ACCEPTED, Json(accepted)).into_response(),
        Err(error) => rejection(error),
    }
}

pub(crate) async fn redo_handler<R, L>(
    State(workflow): State<SharedWorkflow<R, L>>,
    Path((application_id, stage_number)): Path<(String, u32)>,
) -> Response
where
    R: ApplicationRepository + 'static,
    L: PaymentLedger + 'static,
{
    let id = ApplicationId(application_id);
    match workflow.redo_submission(&id, stage_number) {
        Ok(record) => (StatusCode::OK, Json(record.status_view())).into_response(),
        Err(error) => rejection(error),
    }
}

pub(crate) async fn review_handler<R, L>(
    State(workflow): State<SharedWorkflow<R, L>>,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    L: PaymentLedger + 'static,
{
    match workflow.mark_advanced(&ApplicationId(application_id)) {
        Ok(record) => (StatusCode::OK, Json(record.status_view())).into_response(),
        Err(error) => rejection(error),
    }
}

pub(crate) async fn advance_handler<R, L>(
    State(workflow): State<SharedWorkflow<R, L>>,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    L: PaymentLedger + 'static,
{
    match workflow.advance(&ApplicationId(application_id)) {
        Ok(record) => (StatusCode::OK, Json(record.status_view())).into_response(),
        Err(error) => rejection(error),
    }
}

/// Map engine failures onto status codes. Field errors are only present for validation failures.
pub(crate) fn rejection(error: WorkflowError) -> Response {
    let (status, kind) = match &error {
        WorkflowError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
        WorkflowError::Precondition(_) => (StatusCode::CONFLICT, "precondition"),
        WorkflowError::WindowClosed { .. } => (StatusCode::GONE, "window_closed"),
        WorkflowError::WindowNotOpen { .. } => (StatusCode::CONFLICT, "window_not_open"),
        WorkflowError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        WorkflowError::Repository(RepositoryError::StaleVersion { .. }) => {
            (StatusCode::CONFLICT, "conflict")
        }
        WorkflowError::Repository(_) | WorkflowError::Ledger(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal")
        }
    };

    let mut payload = json!({
        "error": kind,
        "message": error.to_string(),
    });
    if let WorkflowError::Validation(validation) = &error {
        payload["field_errors"] = json!(validation.field_errors);
    }

    (status, Json(payload)).into_response()
}
