// handler/verification.rs
use std::sync::Arc;

use axum::{
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{dtos::verificationdtos::*, error::HttpError, AppState};

pub fn verification_handler() -> Router {
    Router::new()
        .route("/jobs/:job_id/workers/:worker_id/arrival", post(record_arrival))
        .route("/jobs/:job_id/workers/:worker_id/arrival/confirm", put(confirm_arrival))
        .route("/jobs/:job_id/workers/:worker_id/handover/worker", put(confirm_handover_by_worker))
        .route("/jobs/:job_id/workers/:worker_id/handover/poster", put(confirm_handover_by_poster))
        .route("/jobs/:job_id/workers/:worker_id/completion/worker", put(confirm_completion_by_worker))
        .route("/jobs/:job_id/workers/:worker_id/completion/poster", put(confirm_completion_by_poster))
        .route("/jobs/:job_id/workers/:worker_id/payment", put(confirm_payment))
        .route("/jobs/:job_id/workers/:worker_id/rating", post(rate_worker))
        .route("/jobs/:job_id/workers/:worker_id/dispute", post(raise_dispute))
        .route("/jobs/:job_id/workers/:worker_id/dispute/resolve", put(resolve_dispute))
        .route("/jobs/:job_id/workers/:worker_id/summary", get(get_verification_summary))
        .route("/workers/:worker_id/badges", get(get_worker_badges))
        .route("/workers/:worker_id/verifications", get(get_worker_verifications))
}

pub async fn record_arrival(
    Extension(app_state): Extension<Arc<AppState>>,
    Path((job_id, worker_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<RecordArrivalDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;
    let arrival = body.into_details().map_err(HttpError::bad_request)?;

    let verification = app_state
        .verification_service
        .record_arrival(job_id, worker_id, arrival)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Arrival recorded", verification)),
    ))
}

pub async fn confirm_arrival(
    Extension(app_state): Extension<Arc<AppState>>,
    Path((job_id, worker_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<PosterActionDto>,
) -> Result<impl IntoResponse, HttpError> {
    let verification = app_state
        .verification_service
        .confirm_arrival(job_id, worker_id, body.poster_id)
        .await?;

    Ok(Json(ApiResponse::success("Arrival confirmed", verification)))
}

pub async fn confirm_handover_by_worker(
    Extension(app_state): Extension<Arc<AppState>>,
    Path((job_id, worker_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<WorkerActionDto>,
) -> Result<impl IntoResponse, HttpError> {
    let verification = app_state
        .verification_service
        .confirm_handover_by_worker(job_id, worker_id, body.worker_id)
        .await?;

    Ok(Json(ApiResponse::success("Handover confirmed by worker", verification)))
}

pub async fn confirm_handover_by_poster(
    Extension(app_state): Extension<Arc<AppState>>,
    Path((job_id, worker_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<PosterActionDto>,
) -> Result<impl IntoResponse, HttpError> {
    let verification = app_state
        .verification_service
        .confirm_handover_by_poster(job_id, worker_id, body.poster_id)
        .await?;

    Ok(Json(ApiResponse::success("Handover confirmed by poster", verification)))
}

pub async fn confirm_completion_by_worker(
    Extension(app_state): Extension<Arc<AppState>>,
    Path((job_id, worker_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<WorkerActionDto>,
) -> Result<impl IntoResponse, HttpError> {
    let verification = app_state
        .verification_service
        .confirm_by_worker(job_id, worker_id, body.worker_id)
        .await?;

    Ok(Json(ApiResponse::success("Completion confirmed by worker", verification)))
}

pub async fn confirm_completion_by_poster(
    Extension(app_state): Extension<Arc<AppState>>,
    Path((job_id, worker_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<PosterActionDto>,
) -> Result<impl IntoResponse, HttpError> {
    let verification = app_state
        .verification_service
        .confirm_by_poster(job_id, worker_id, body.poster_id)
        .await?;

    Ok(Json(ApiResponse::success("Completion confirmed by poster", verification)))
}

pub async fn confirm_payment(
    Extension(app_state): Extension<Arc<AppState>>,
    Path((job_id, worker_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<ConfirmPaymentDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let outcome = app_state
        .verification_service
        .confirm_payment(
            job_id,
            worker_id,
            body.poster_id,
            body.payment_method,
            body.payment_reference,
        )
        .await?;

    let message = if outcome.job_completed {
        "Payment confirmed and job completed"
    } else {
        "Payment confirmed; job awaits mutual completion"
    };

    Ok(Json(ApiResponse::success(message, outcome)))
}

pub async fn rate_worker(
    Extension(app_state): Extension<Arc<AppState>>,
    Path((job_id, worker_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<RateWorkerDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let outcome = app_state
        .verification_service
        .rate_worker(job_id, worker_id, body.poster_id, body.rating, body.comment)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Worker rated successfully", outcome)),
    ))
}

pub async fn raise_dispute(
    Extension(app_state): Extension<Arc<AppState>>,
    Path((job_id, worker_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<RaiseDisputeDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let verification = app_state
        .verification_service
        .raise_dispute(job_id, worker_id, body.raised_by, body.reason)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Dispute raised", verification)),
    ))
}

pub async fn resolve_dispute(
    Extension(app_state): Extension<Arc<AppState>>,
    Path((job_id, worker_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<ResolveDisputeDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let verification = app_state
        .verification_service
        .resolve_dispute(job_id, worker_id, body.resolved_by, body.resolution)
        .await?;

    Ok(Json(ApiResponse::success("Dispute resolved", verification)))
}

pub async fn get_verification_summary(
    Extension(app_state): Extension<Arc<AppState>>,
    Path((job_id, worker_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, HttpError> {
    let summary = app_state
        .verification_service
        .summary(job_id, worker_id)
        .await?;

    Ok(Json(ApiResponse::success("Verification summary retrieved", summary)))
}

pub async fn get_worker_badges(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(worker_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let badges: Vec<WorkerBadgeDto> = app_state
        .badge_service
        .worker_badges(worker_id)
        .await?
        .into_iter()
        .map(WorkerBadgeDto::from)
        .collect();

    Ok(Json(ApiResponse::success("Worker badges retrieved", badges)))
}

pub async fn get_worker_verifications(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(worker_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let verifications = app_state
        .verification_service
        .worker_verifications(worker_id)
        .await?;

    Ok(Json(ApiResponse::success("Worker verifications retrieved", verifications)))
}
