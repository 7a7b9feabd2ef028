// service/badge_service.rs
use std::sync::Arc;

use serde_json::{json, Value};
use sqlx::types::BigDecimal;
use uuid::Uuid;

use crate::{
    db::db::Store,
    models::badgemodel::*,
    service::error::ServiceError,
    utils::clock::{start_of_week, Clock},
};

/// Checks a single rule against already-loaded stats.
///
/// Returns the snapshot to store with the badge when the worker qualifies.
pub fn qualifies(badge_type: BadgeType, stats: &WorkerStats) -> Option<Value> {
    match badge_type.requirement() {
        BadgeRequirement::CompletedJobs(threshold) => (stats.completed_jobs >= threshold).then(|| {
            json!({
                "completed_jobs": stats.completed_jobs,
                "threshold": threshold,
            })
        }),
        BadgeRequirement::WeeklyEarnings(threshold) => {
            (stats.weekly_earnings >= BigDecimal::from(threshold)).then(|| {
                json!({
                    "weekly_earnings": stats.weekly_earnings.to_string(),
                    "week_start": stats.week_start,
                    "threshold": threshold,
                })
            })
        }
        BadgeRequirement::RatingStreak { min_average, min_count } => {
            (stats.rating_count >= min_count && stats.rating >= min_average).then(|| {
                json!({
                    "rating": stats.rating,
                    "rating_count": stats.rating_count,
                    "min_average": min_average,
                    "min_count": min_count,
                })
            })
        }
    }
}

#[derive(Debug, Clone)]
pub struct BadgeService {
    db_client: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl BadgeService {
    pub fn new(db_client: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { db_client, clock }
    }

    pub async fn worker_stats(&self, worker_id: Uuid) -> Result<WorkerStats, ServiceError> {
        let week_start = start_of_week(self.clock.now());
        match self.db_client.get_worker_stats(worker_id, week_start).await {
            Ok(stats) => Ok(stats),
            Err(sqlx::Error::RowNotFound) => Err(ServiceError::WorkerProfileNotFound(worker_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// `None` if the worker already holds the badge or does not qualify.
    pub async fn evaluate(
        &self,
        worker_id: Uuid,
        badge_type: BadgeType,
    ) -> Result<Option<AwardedBadge>, ServiceError> {
        if self.db_client.has_badge(worker_id, badge_type).await? {
            return Ok(None);
        }

        let stats = self.worker_stats(worker_id).await?;

        Ok(qualifies(badge_type, &stats).map(|snapshot| AwardedBadge {
            worker_id,
            badge_type,
            snapshot,
        }))
    }

    /// Persists an award. A second grant of the same badge is a silent no-op.
    pub async fn award(&self, award: AwardedBadge) -> Result<Option<WorkerBadge>, ServiceError> {
        let worker_id = award.worker_id;
        let badge_type = award.badge_type;

        let badge = self.db_client.award_badge(award, self.clock.now()).await?;
        match &badge {
            Some(_) => tracing::info!(
                worker_id = %worker_id,
                badge = badge_type.to_str(),
                "badge awarded"
            ),
            None => tracing::debug!(
                worker_id = %worker_id,
                badge = badge_type.to_str(),
                "badge already held"
            ),
        }

        Ok(badge)
    }

    /// Awards every milestone badge the worker newly qualifies for, in
    /// milestone order. Badges are never revoked.
    pub async fn check_milestones(&self, worker_id: Uuid) -> Result<Vec<WorkerBadge>, ServiceError> {
        let held: Vec<BadgeType> = self
            .db_client
            .get_worker_badges(worker_id)
            .await?
            .into_iter()
            .map(|b| b.badge_type)
            .collect();

        let stats = self.worker_stats(worker_id).await?;
        let mut awarded = Vec::new();

        for badge_type in MILESTONE_BADGES.iter().copied() {
            if held.contains(&badge_type) {
                continue;
            }
            let Some(snapshot) = qualifies(badge_type, &stats) else {
                continue;
            };

            let award = AwardedBadge { worker_id, badge_type, snapshot };
            // A concurrent check may have won the insert; that is not an error
            if let Some(badge) = self.award(award).await? {
                awarded.push(badge);
            }
        }

        Ok(awarded)
    }

    pub async fn worker_badges(&self, worker_id: Uuid) -> Result<Vec<WorkerBadge>, ServiceError> {
        Ok(self.db_client.get_worker_badges(worker_id).await?)
    }
}
