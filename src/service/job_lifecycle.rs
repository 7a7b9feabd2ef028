// service/job_lifecycle.rs
use std::sync::Arc;

use uuid::Uuid;

use crate::{
    db::db::Store,
    models::labourmodel::*,
    service::error::ServiceError,
    utils::clock::Clock,
};

/// Job status transitions driven by the verification workflow. Assignment and
/// the applicant counter move together with the application rows in the store.
///
/// `start` and `complete` are idempotent: calling them on a job that is
/// already in (or past) the target status returns the job unchanged.
#[derive(Debug, Clone)]
pub struct JobLifecycleService {
    db_client: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl JobLifecycleService {
    pub fn new(db_client: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { db_client, clock }
    }

    pub async fn job(&self, job_id: Uuid) -> Result<Job, ServiceError> {
        self.db_client
            .get_job_by_id(job_id)
            .await?
            .ok_or(ServiceError::JobNotFound(job_id))
    }

    pub async fn start(&self, job_id: Uuid) -> Result<Job, ServiceError> {
        self.transition(
            job_id,
            &[JobStatus::Open, JobStatus::Assigned],
            JobStatus::InProgress,
            &[JobStatus::InProgress, JobStatus::Completed],
        )
        .await
    }

    pub async fn complete(&self, job_id: Uuid) -> Result<Job, ServiceError> {
        self.transition(
            job_id,
            &[JobStatus::Assigned, JobStatus::InProgress],
            JobStatus::Completed,
            &[JobStatus::Completed],
        )
        .await
    }

    async fn transition(
        &self,
        job_id: Uuid,
        from: &[JobStatus],
        to: JobStatus,
        already: &[JobStatus],
    ) -> Result<Job, ServiceError> {
        if let Some(job) = self
            .db_client
            .update_job_status(job_id, from, to, self.clock.now())
            .await?
        {
            tracing::info!(job_id = %job_id, status = to.to_str(), "job status changed");
            return Ok(job);
        }

        let job = self.job(job_id).await?;
        if already.contains(&job.status) {
            return Ok(job);
        }

        tracing::warn!(
            job_id = %job_id,
            current = job.status.to_str(),
            wanted = to.to_str(),
            "rejected job status transition"
        );
        Err(ServiceError::InvalidJobStatus(job_id, job.status))
    }
}
