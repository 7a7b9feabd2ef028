// service/trust_service.rs
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::db::Store,
    models::{badgemodel::WorkerBadge, verificationmodels::JobVerification},
    service::{badge_service::BadgeService, error::ServiceError, rating::RatingAggregate},
    utils::clock::Clock,
};

/// Worker reputation: rolling rating aggregate plus milestone badges.
#[derive(Debug, Clone)]
pub struct TrustService {
    db_client: Arc<dyn Store>,
    badge_service: Arc<BadgeService>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReputationUpdate {
    pub worker_id: Uuid,
    pub rating: RatingAggregate,
    pub awarded_badges: Vec<WorkerBadge>,
}

impl TrustService {
    pub fn new(
        db_client: Arc<dyn Store>,
        badge_service: Arc<BadgeService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db_client,
            badge_service,
            clock,
        }
    }

    /// Stores a job's rating and folds it into the worker's aggregate in one
    /// store write, then runs the milestone check. `None` when the job was
    /// already rated.
    pub async fn record_job_rating(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        rating: i32,
        comment: Option<String>,
    ) -> Result<Option<(JobVerification, ReputationUpdate)>, ServiceError> {
        let rated = match self
            .db_client
            .record_rating(job_id, worker_id, rating, comment, self.clock.now())
            .await
        {
            Ok(Some(rated)) => rated,
            Ok(None) => return Ok(None),
            Err(sqlx::Error::RowNotFound) => return Err(ServiceError::WorkerProfileNotFound(worker_id)),
            Err(e) => return Err(e.into()),
        };
        let (verification, worker) = rated;

        tracing::info!(
            worker_id = %worker_id,
            rating = worker.rating,
            rating_count = worker.rating_count,
            "worker rating updated"
        );

        let awarded_badges = self.refresh_milestones(worker_id).await;

        Ok(Some((
            verification,
            ReputationUpdate {
                worker_id,
                rating: RatingAggregate::new(worker.rating, worker.rating_count),
                awarded_badges,
            },
        )))
    }

    /// Milestone check whose failure never undoes the write that triggered it.
    pub async fn refresh_milestones(&self, worker_id: Uuid) -> Vec<WorkerBadge> {
        match self.badge_service.check_milestones(worker_id).await {
            Ok(awarded) => awarded,
            Err(e) => {
                tracing::error!(worker_id = %worker_id, "milestone check failed: {}", e);
                Vec::new()
            }
        }
    }
}
