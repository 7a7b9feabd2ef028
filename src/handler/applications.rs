// handler/applications.rs
use std::sync::Arc;

use axum::{
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::{post, put},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{dtos::verificationdtos::*, error::HttpError, AppState};

pub fn applications_handler() -> Router {
    Router::new()
        .route("/jobs/:job_id/applications", post(apply_to_job))
        .route("/applications/:application_id/accept", put(accept_application))
        .route("/applications/:application_id/reject", put(reject_application))
        .route("/applications/:application_id/withdraw", put(withdraw_application))
}

pub async fn apply_to_job(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
    Json(body): Json<ApplyToJobDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let worker_id = body.worker_id;
    let application = app_state
        .application_service
        .apply(job_id, worker_id, body.into())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Application submitted successfully", application)),
    ))
}

pub async fn accept_application(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(application_id): Path<Uuid>,
    Json(body): Json<PosterActionDto>,
) -> Result<impl IntoResponse, HttpError> {
    let updated = app_state
        .application_service
        .accept(application_id, body.poster_id)
        .await?;

    Ok(transition_response(application_id, updated, "Application accepted"))
}

pub async fn reject_application(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(application_id): Path<Uuid>,
    Json(body): Json<PosterActionDto>,
) -> Result<impl IntoResponse, HttpError> {
    let updated = app_state
        .application_service
        .reject(application_id, body.poster_id)
        .await?;

    Ok(transition_response(application_id, updated, "Application rejected"))
}

pub async fn withdraw_application(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(application_id): Path<Uuid>,
    Json(body): Json<WorkerActionDto>,
) -> Result<impl IntoResponse, HttpError> {
    let updated = app_state
        .application_service
        .withdraw(application_id, body.worker_id)
        .await?;

    Ok(transition_response(application_id, updated, "Application withdrawn"))
}

// A non-pending application is a normal outcome, reported in the body
fn transition_response(
    application_id: Uuid,
    updated: bool,
    message: &str,
) -> Json<ApiResponse<TransitionResponseDto>> {
    let message = if updated {
        message
    } else {
        "Application is no longer pending; nothing changed"
    };

    Json(ApiResponse::success(
        message,
        TransitionResponseDto {
            application_id,
            updated,
        },
    ))
}
