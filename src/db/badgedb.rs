// db/badgedb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::badgemodel::*;

#[async_trait]
pub trait BadgeExt: Send + Sync {
    async fn get_worker_badges(&self, worker_id: Uuid) -> Result<Vec<WorkerBadge>, Error>;

    async fn has_badge(&self, worker_id: Uuid, badge_type: BadgeType) -> Result<bool, Error>;

    /// Relies on UNIQUE(worker_id, badge_type); `None` if already held.
    async fn award_badge(
        &self,
        award: AwardedBadge,
        at: DateTime<Utc>,
    ) -> Result<Option<WorkerBadge>, Error>;
}

#[async_trait]
impl BadgeExt for DBClient {
    async fn get_worker_badges(&self, worker_id: Uuid) -> Result<Vec<WorkerBadge>, Error> {
        sqlx::query_as::<_, WorkerBadge>(
            r#"
            SELECT id, worker_id, badge_type, snapshot, awarded_at
            FROM worker_badges
            WHERE worker_id = $1
            ORDER BY awarded_at ASC
            "#,
        )
        .bind(worker_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn has_badge(&self, worker_id: Uuid, badge_type: BadgeType) -> Result<bool, Error> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM worker_badges WHERE worker_id = $1 AND badge_type = $2
            )
            "#,
        )
        .bind(worker_id)
        .bind(badge_type)
        .fetch_one(&self.pool)
        .await
    }

    async fn award_badge(
        &self,
        award: AwardedBadge,
        at: DateTime<Utc>,
    ) -> Result<Option<WorkerBadge>, Error> {
        sqlx::query_as::<_, WorkerBadge>(
            r#"
            INSERT INTO worker_badges (id, worker_id, badge_type, snapshot, awarded_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (worker_id, badge_type) DO NOTHING
            RETURNING id, worker_id, badge_type, snapshot, awarded_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(award.worker_id)
        .bind(award.badge_type)
        .bind(award.snapshot)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
    }
}
