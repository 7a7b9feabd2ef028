use thiserror::Error;
use uuid::Uuid;
use crate::{
    models::labourmodel::{JobCategory, JobStatus},
    error::HttpError,
};
use axum::http::StatusCode;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Job {0} not found")]
    JobNotFound(Uuid),

    #[error("Worker profile {0} not found")]
    WorkerProfileNotFound(Uuid),

    #[error("Job application {0} not found")]
    ApplicationNotFound(Uuid),

    #[error("No verification record for job {job_id} and worker {worker_id}")]
    VerificationNotFound { job_id: Uuid, worker_id: Uuid },

    #[error("Job {0} is not in status {1:?}")]
    InvalidJobStatus(Uuid, JobStatus),

    #[error("User {0} is not authorized to perform this action on job {1}")]
    UnauthorizedJobAccess(Uuid, Uuid),

    #[error("Worker {worker_id} has already applied to job {job_id}")]
    DuplicateApplication { job_id: Uuid, worker_id: Uuid },

    #[error("Worker {worker_id} has no accepted application for job {job_id}")]
    WorkerNotAccepted { job_id: Uuid, worker_id: Uuid },

    #[error("Worker {worker_id} has not recorded arrival for job {job_id}")]
    ArrivalNotRecorded { job_id: Uuid, worker_id: Uuid },

    #[error("Arrival for job {0} was already confirmed by the poster")]
    ArrivalAlreadyConfirmed(Uuid),

    #[error("Job {0} is in category {1:?}, which has no handover step")]
    HandoverNotApplicable(Uuid, JobCategory),

    #[error("Payment for job {0} was already confirmed")]
    PaymentAlreadyConfirmed(Uuid),

    #[error("Worker was already rated for job {0}")]
    AlreadyRated(Uuid),

    #[error("A dispute was already raised for job {0}")]
    DisputeAlreadyRaised(Uuid),

    #[error("No open dispute for job {0}")]
    NoOpenDispute(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        let status = error.status_code();
        HttpError::new(error.to_string(), status)
    }
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::JobNotFound(_)
            | ServiceError::WorkerProfileNotFound(_)
            | ServiceError::ApplicationNotFound(_)
            | ServiceError::VerificationNotFound { .. } => StatusCode::NOT_FOUND,

            ServiceError::WorkerNotAccepted { .. }
            | ServiceError::ArrivalNotRecorded { .. }
            | ServiceError::HandoverNotApplicable(_, _)
            | ServiceError::NoOpenDispute(_)
            | ServiceError::InvalidJobStatus(_, _)
            | ServiceError::Validation(_) => StatusCode::BAD_REQUEST,

            ServiceError::UnauthorizedJobAccess(_, _) => StatusCode::UNAUTHORIZED,

            ServiceError::DuplicateApplication { .. }
            | ServiceError::ArrivalAlreadyConfirmed(_)
            | ServiceError::PaymentAlreadyConfirmed(_)
            | ServiceError::AlreadyRated(_)
            | ServiceError::DisputeAlreadyRaised(_) => StatusCode::CONFLICT,

            ServiceError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
