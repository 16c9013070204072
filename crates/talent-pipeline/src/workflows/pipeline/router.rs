use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::actions::ActionSubmission;
use super::domain::{
    ActorContext, ActorRole, ApplicationId, CompanyId, JobId, NewApplication, Owner, StageId,
    UserId,
};
use super::error::PipelineError;
use super::messaging::MessageDispatcher;
use super::service::PipelineService;
use super::store::{PipelineStore, RepositoryError};
use crate::config::AppEnvironment;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const COMPANY_ID_HEADER: &str = "x-company-id";

struct PipelineState<S, D> {
    service: Arc<PipelineService<S, D>>,
    environment: AppEnvironment,
}

impl<S, D> Clone for PipelineState<S, D> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            environment: self.environment,
        }
    }
}

/// Router exposing pipeline actions and stage management.
pub fn pipeline_router<S, D>(
    service: Arc<PipelineService<S, D>>,
    environment: AppEnvironment,
) -> Router
where
    S: PipelineStore + 'static,
    D: MessageDispatcher + 'static,
{
    Router::new()
        .route("/api/v1/applications", post(open_handler::<S, D>))
        .route(
            "/api/v1/applications/:application_id",
            get(application_handler::<S, D>),
        )
        .route(
            "/api/v1/applications/:application_id/actions",
            get(list_actions_handler::<S, D>).post(execute_handler::<S, D>),
        )
        .route(
            "/api/v1/applications/:application_id/history",
            get(history_handler::<S, D>),
        )
        .route(
            "/api/v1/applications/:application_id/feedback",
            get(feedback_handler::<S, D>),
        )
        .route("/api/v1/pipeline-stages", get(stages_handler::<S, D>))
        .route(
            "/api/v1/pipeline-stages/reorder",
            post(reorder_handler::<S, D>),
        )
        .with_state(PipelineState {
            service,
            environment,
        })
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenApplicationRequest {
    job_id: JobId,
    applicant_id: UserId,
    #[serde(default)]
    company_id: Option<CompanyId>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReorderRequest {
    order: Vec<StageRef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StageRef {
    id: StageId,
}

async fn open_handler<S, D>(
    State(state): State<PipelineState<S, D>>,
    axum::Json(request): axum::Json<OpenApplicationRequest>,
) -> Response
where
    S: PipelineStore + 'static,
    D: MessageDispatcher + 'static,
{
    let application = NewApplication {
        job_id: request.job_id,
        job_owner: request.company_id.map_or(Owner::Global, Owner::Company),
        applicant_id: request.applicant_id,
    };

    match state.service.open_application(application) {
        Ok(created) => (StatusCode::CREATED, axum::Json(created)).into_response(),
        Err(err) => error_response(err, state.environment),
    }
}

async fn application_handler<S, D>(
    State(state): State<PipelineState<S, D>>,
    Path(application_id): Path<u64>,
    headers: HeaderMap,
) -> Response
where
    S: PipelineStore + 'static,
    D: MessageDispatcher + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match state.service.view(&actor, ApplicationId(application_id)) {
        Ok(application) => (StatusCode::OK, axum::Json(application)).into_response(),
        Err(err) => error_response(err, state.environment),
    }
}

async fn list_actions_handler<S, D>(
    State(state): State<PipelineState<S, D>>,
    Path(application_id): Path<u64>,
    headers: HeaderMap,
) -> Response
where
    S: PipelineStore + 'static,
    D: MessageDispatcher + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match state
        .service
        .actions_for(&actor, ApplicationId(application_id))
    {
        Ok(menu) => (StatusCode::OK, axum::Json(menu)).into_response(),
        Err(err) => error_response(err, state.environment),
    }
}

async fn execute_handler<S, D>(
    State(state): State<PipelineState<S, D>>,
    Path(application_id): Path<u64>,
    headers: HeaderMap,
    axum::Json(submission): axum::Json<ActionSubmission>,
) -> Response
where
    S: PipelineStore + 'static,
    D: MessageDispatcher + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match state
        .service
        .submit(&actor, ApplicationId(application_id), submission)
    {
        Ok(outcome) => {
            let payload = json!({
                "message": outcome.message,
                "stage": outcome.application.stage,
                "status": outcome.application.status,
                "stage_changed": outcome.stage_changed,
                "actions": outcome.actions,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => error_response(err, state.environment),
    }
}

async fn history_handler<S, D>(
    State(state): State<PipelineState<S, D>>,
    Path(application_id): Path<u64>,
    headers: HeaderMap,
) -> Response
where
    S: PipelineStore + 'static,
    D: MessageDispatcher + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match state.service.history(&actor, ApplicationId(application_id)) {
        Ok(history) => (StatusCode::OK, axum::Json(history)).into_response(),
        Err(err) => error_response(err, state.environment),
    }
}

async fn feedback_handler<S, D>(
    State(state): State<PipelineState<S, D>>,
    Path(application_id): Path<u64>,
    headers: HeaderMap,
) -> Response
where
    S: PipelineStore + 'static,
    D: MessageDispatcher + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match state.service.feedback(&actor, ApplicationId(application_id)) {
        Ok(entries) => (StatusCode::OK, axum::Json(entries)).into_response(),
        Err(err) => error_response(err, state.environment),
    }
}

async fn stages_handler<S, D>(
    State(state): State<PipelineState<S, D>>,
    headers: HeaderMap,
) -> Response
where
    S: PipelineStore + 'static,
    D: MessageDispatcher + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match state.service.stages(&actor) {
        Ok(stages) => (StatusCode::OK, axum::Json(stages)).into_response(),
        Err(err) => error_response(err, state.environment),
    }
}

async fn reorder_handler<S, D>(
    State(state): State<PipelineState<S, D>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<ReorderRequest>,
) -> Response
where
    S: PipelineStore + 'static,
    D: MessageDispatcher + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    let ordered: Vec<StageId> = request.order.iter().map(|stage| stage.id).collect();
    match state.service.reorder(&actor, &ordered) {
        Ok(stages) => (StatusCode::OK, axum::Json(stages)).into_response(),
        Err(err) => error_response(err, state.environment),
    }
}

/// Build the caller identity from the platform's identity headers.
pub(crate) fn actor_from_headers(headers: &HeaderMap) -> Result<ActorContext, Response> {
    let user_id = numeric_header(headers, ACTOR_ID_HEADER)?.map(UserId);
    let company_id = numeric_header(headers, COMPANY_ID_HEADER)?.map(CompanyId);

    let role = match header_text(headers, ACTOR_ROLE_HEADER)? {
        Some(raw) => ActorRole::parse(raw).ok_or_else(|| {
            bad_request(format!("{ACTOR_ROLE_HEADER} '{raw}' is not a known role"))
        })?,
        None => ActorRole::Guest,
    };

    Ok(ActorContext {
        user_id,
        role,
        company_id,
    })
}

fn header_text<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, Response> {
    match headers.get(name) {
        Some(value) => value
            .to_str()
            .map(|text| Some(text.trim()))
            .map_err(|_| bad_request(format!("{name} must be visible ASCII"))),
        None => Ok(None),
    }
}

fn numeric_header(headers: &HeaderMap, name: &str) -> Result<Option<u64>, Response> {
    match header_text(headers, name)? {
        Some("") | None => Ok(None),
        Some(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|_| bad_request(format!("{name} must be a non-negative integer"))),
    }
}

fn bad_request(message: String) -> Response {
    let payload = json!({ "error": message });
    (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
}

pub(crate) fn error_response(err: PipelineError, environment: AppEnvironment) -> Response {
    let (status, payload) = match &err {
        PipelineError::Forbidden(_) => (StatusCode::FORBIDDEN, json!({ "error": err.to_string() })),
        PipelineError::ApplicationNotFound(_) | PipelineError::Storage(RepositoryError::NotFound) => {
            (StatusCode::NOT_FOUND, json!({ "error": err.to_string() }))
        }
        PipelineError::StaleApplication { stage, .. } => (
            StatusCode::CONFLICT,
            json!({ "error": err.to_string(), "stage": stage }),
        ),
        PipelineError::Storage(RepositoryError::VersionConflict { .. })
        | PipelineError::Storage(RepositoryError::Conflict(_)) => {
            (StatusCode::CONFLICT, json!({ "error": err.to_string() }))
        }
        PipelineError::ValidationFailed(errors) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "error": "validation failed", "fields": errors }),
        ),
        PipelineError::StageSetMismatch {
            missing,
            unexpected,
            duplicated,
        } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({
                "error": "submitted order does not match the current stage set",
                "missing": missing,
                "unexpected": unexpected,
                "duplicated": duplicated,
            }),
        ),
        PipelineError::UnknownStage(_)
        | PipelineError::TerminalStageViolation { .. }
        | PipelineError::UnsupportedAction(_) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "error": err.to_string() }),
        ),
        PipelineError::MissingDefaults | PipelineError::Storage(RepositoryError::Unavailable(_)) => {
            tracing::error!(error = %err, "pipeline request failed");
            let message = if environment.exposes_error_detail() {
                err.to_string()
            } else {
                "internal server error".to_string()
            };
            (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": message }))
        }
    };

    (status, axum::Json(payload)).into_response()
}
