// db/labourdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::BigDecimal, Error, Row};
use uuid::Uuid;

use super::db::DBClient;
use crate::models::{badgemodel::WorkerStats, labourmodel::*};

const JOB_COLUMNS: &str = r#"id, poster_id, category, title, pay_amount, status,
    applications_count, latitude, longitude, created_at, updated_at"#;

pub(super) const WORKER_COLUMNS: &str = "id, latitude, longitude, rating, rating_count, created_at, updated_at";

const APPLICATION_COLUMNS: &str = r#"id, job_id, worker_id, status, proposed_amount,
    distance_km, applied_at, responded_at"#;

#[async_trait]
pub trait LabourExt: Send + Sync {
    async fn get_job_by_id(&self, job_id: Uuid) -> Result<Option<Job>, Error>;

    /// Moves the job to `to` only if it is currently in one of `from`.
    async fn update_job_status(
        &self,
        job_id: Uuid,
        from: &[JobStatus],
        to: JobStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Job>, Error>;

    async fn get_worker_profile(&self, worker_id: Uuid) -> Result<Option<WorkerProfile>, Error>;

    async fn get_worker_stats(
        &self,
        worker_id: Uuid,
        week_start: DateTime<Utc>,
    ) -> Result<WorkerStats, Error>;

    /// Inserts a pending application and bumps the job's applicant counter in
    /// one transaction. `None` when the worker already applied to this job.
    async fn create_job_application(
        &self,
        application: NewJobApplication,
    ) -> Result<Option<JobApplication>, Error>;

    async fn get_job_application_by_id(
        &self,
        application_id: Uuid,
    ) -> Result<Option<JobApplication>, Error>;

    async fn get_application_for_pair(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
    ) -> Result<Option<JobApplication>, Error>;

    /// Leaves `pending` for `to` together with the job-side effect: accepting
    /// moves an open job to `assigned`, withdrawing releases an applicant slot.
    /// Nothing is written unless every part applies.
    async fn transition_application(
        &self,
        application_id: Uuid,
        to: ApplicationStatus,
        at: DateTime<Utc>,
    ) -> Result<ApplicationTransition, Error>;
}

#[async_trait]
impl LabourExt for DBClient {
    async fn get_job_by_id(&self, job_id: Uuid) -> Result<Option<Job>, Error> {
        sqlx::query_as::<_, Job>(&format!("SELECT {} FROM jobs WHERE id = $1", JOB_COLUMNS))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn update_job_status(
        &self,
        job_id: Uuid,
        from: &[JobStatus],
        to: JobStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Job>, Error> {
        let from: Vec<String> = from.iter().map(|s| s.to_str().to_string()).collect();

        sqlx::query_as::<_, Job>(&format!(
            r#"
            UPDATE jobs
            SET status = $2, updated_at = $3
            WHERE id = $1 AND status::text = ANY($4)
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(job_id)
        .bind(to)
        .bind(at)
        .bind(from)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_worker_profile(&self, worker_id: Uuid) -> Result<Option<WorkerProfile>, Error> {
        sqlx::query_as::<_, WorkerProfile>(&format!(
            "SELECT {} FROM worker_profiles WHERE id = $1",
            WORKER_COLUMNS
        ))
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_worker_stats(
        &self,
        worker_id: Uuid,
        week_start: DateTime<Utc>,
    ) -> Result<WorkerStats, Error> {
        let worker = self
            .get_worker_profile(worker_id)
            .await?
            .ok_or(Error::RowNotFound)?;

        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS completed_jobs,
                COALESCE(SUM(
                    CASE WHEN v.payment_confirmed_at >= $2
                    THEN COALESCE(a.proposed_amount, j.pay_amount)
                    END
                ), 0) AS weekly_earnings
            FROM job_verifications v
            JOIN jobs j ON j.id = v.job_id
            LEFT JOIN job_applications a
                ON a.job_id = v.job_id
                AND a.worker_id = v.worker_id
                AND a.status = 'accepted'
            WHERE v.worker_id = $1 AND j.status = 'completed'
            "#,
        )
        .bind(worker_id)
        .bind(week_start)
        .fetch_one(&self.pool)
        .await?;

        Ok(WorkerStats {
            worker_id,
            completed_jobs: row.try_get::<i64, _>("completed_jobs")?,
            weekly_earnings: row.try_get::<BigDecimal, _>("weekly_earnings")?,
            week_start,
            rating: worker.rating,
            rating_count: worker.rating_count,
        })
    }

    async fn create_job_application(
        &self,
        application: NewJobApplication,
    ) -> Result<Option<JobApplication>, Error> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, JobApplication>(&format!(
            r#"
            INSERT INTO job_applications
            (id, job_id, worker_id, status, proposed_amount, distance_km, applied_at)
            VALUES ($1, $2, $3, 'pending', $4, $5, $6)
            ON CONFLICT (job_id, worker_id) DO NOTHING
            RETURNING {}
            "#,
            APPLICATION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(application.job_id)
        .bind(application.worker_id)
        .bind(application.proposed_amount)
        .bind(application.distance_km)
        .bind(application.applied_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(created) = created else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE jobs
            SET applications_count = applications_count + 1, updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(application.job_id)
        .bind(application.applied_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(created))
    }

    async fn get_job_application_by_id(
        &self,
        application_id: Uuid,
    ) -> Result<Option<JobApplication>, Error> {
        sqlx::query_as::<_, JobApplication>(&format!(
            "SELECT {} FROM job_applications WHERE id = $1",
            APPLICATION_COLUMNS
        ))
        .bind(application_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_application_for_pair(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
    ) -> Result<Option<JobApplication>, Error> {
        sqlx::query_as::<_, JobApplication>(&format!(
            "SELECT {} FROM job_applications WHERE job_id = $1 AND worker_id = $2",
            APPLICATION_COLUMNS
        ))
        .bind(job_id)
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn transition_application(
        &self,
        application_id: Uuid,
        to: ApplicationStatus,
        at: DateTime<Utc>,
    ) -> Result<ApplicationTransition, Error> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, JobApplication>(&format!(
            "SELECT {} FROM job_applications WHERE id = $1 FOR UPDATE",
            APPLICATION_COLUMNS
        ))
        .bind(application_id)
        .fetch_one(&mut *tx)
        .await?;

        if current.status != ApplicationStatus::Pending {
            return Ok(ApplicationTransition::NotPending(current.status));
        }

        match to {
            ApplicationStatus::Accepted => {
                // Losing this race leaves the job with whoever was accepted first
                let assigned = sqlx::query(
                    r#"
                    UPDATE jobs
                    SET status = 'assigned', updated_at = $2
                    WHERE id = $1 AND status = 'open'
                    "#,
                )
                .bind(current.job_id)
                .bind(at)
                .execute(&mut *tx)
                .await?;

                if assigned.rows_affected() == 0 {
                    let status = sqlx::query_scalar::<_, JobStatus>(
                        "SELECT status FROM jobs WHERE id = $1",
                    )
                    .bind(current.job_id)
                    .fetch_one(&mut *tx)
                    .await?;
                    return Ok(ApplicationTransition::JobNotOpen(status));
                }
            }
            ApplicationStatus::Withdrawn => {
                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET applications_count = GREATEST(0, applications_count - 1), updated_at = $2
                    WHERE id = $1
                    "#,
                )
                .bind(current.job_id)
                .bind(at)
                .execute(&mut *tx)
                .await?;
            }
            ApplicationStatus::Pending | ApplicationStatus::Rejected => {}
        }

        let moved = sqlx::query_as::<_, JobApplication>(&format!(
            r#"
            UPDATE job_applications
            SET status = $2, responded_at = $3
            WHERE id = $1
            RETURNING {}
            "#,
            APPLICATION_COLUMNS
        ))
        .bind(application_id)
        .bind(to)
        .bind(at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ApplicationTransition::Moved(moved))
    }
}
