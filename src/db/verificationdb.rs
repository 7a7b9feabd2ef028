// db/verificationdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Error;
use uuid::Uuid;

use super::{db::DBClient, labourdb::WORKER_COLUMNS};
use crate::models::{labourmodel::WorkerProfile, verificationmodels::*};
use crate::service::rating::update as fold_rating;

const VERIFICATION_COLUMNS: &str = r#"id, job_id, worker_id,
    arrival_photo, arrived_at, arrival_latitude, arrival_longitude,
    arrival_confirmed, arrival_confirmed_at,
    handover_worker_confirmed, handover_worker_confirmed_at,
    handover_poster_confirmed, handover_poster_confirmed_at,
    worker_confirmed, worker_confirmed_at, poster_confirmed, poster_confirmed_at,
    payment_method, payment_confirmed_at, payment_reference,
    rating, rating_comment, rated_at,
    disputed, dispute_raised_by, dispute_reason, dispute_raised_at,
    dispute_resolution, dispute_resolved_at,
    created_at, updated_at"#;

/// Mutations on the per-(job, worker) verification record.
///
/// Every write is a single statement scoped to one row, so two parties
/// confirming different flags at the same time never overwrite each other.
/// Write-once fields return `None` when the field was already set.
#[async_trait]
pub trait VerificationExt: Send + Sync {
    async fn get_verification(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
    ) -> Result<Option<JobVerification>, Error>;

    async fn get_worker_verifications(
        &self,
        worker_id: Uuid,
    ) -> Result<Vec<JobVerification>, Error>;

    /// Creates the record on first arrival, overwrites arrival details after.
    /// `None` once the poster has confirmed the arrival.
    async fn record_arrival(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        arrival: ArrivalDetails,
        at: DateTime<Utc>,
    ) -> Result<Option<JobVerification>, Error>;

    async fn set_confirmation(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        flag: ConfirmationFlag,
        at: DateTime<Utc>,
    ) -> Result<Option<JobVerification>, Error>;

    async fn confirm_payment(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        method: PaymentMethod,
        reference: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<JobVerification>, Error>;

    /// Stores the rating and folds it into the worker's aggregate in one
    /// transaction, with the worker row locked against concurrent raters.
    /// `None` when the record was already rated.
    async fn record_rating(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        rating: i32,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<(JobVerification, WorkerProfile)>, Error>;

    async fn raise_dispute(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        raised_by: Uuid,
        reason: String,
        at: DateTime<Utc>,
    ) -> Result<Option<JobVerification>, Error>;

    async fn resolve_dispute(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        resolution: String,
        at: DateTime<Utc>,
    ) -> Result<Option<JobVerification>, Error>;
}

#[async_trait]
impl VerificationExt for DBClient {
    async fn get_verification(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
    ) -> Result<Option<JobVerification>, Error> {
        sqlx::query_as::<_, JobVerification>(&format!(
            "SELECT {} FROM job_verifications WHERE job_id = $1 AND worker_id = $2",
            VERIFICATION_COLUMNS
        ))
        .bind(job_id)
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_worker_verifications(
        &self,
        worker_id: Uuid,
    ) -> Result<Vec<JobVerification>, Error> {
        sqlx::query_as::<_, JobVerification>(&format!(
            r#"
            SELECT {} FROM job_verifications
            WHERE worker_id = $1
            ORDER BY created_at DESC
            "#,
            VERIFICATION_COLUMNS
        ))
        .bind(worker_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn record_arrival(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        arrival: ArrivalDetails,
        at: DateTime<Utc>,
    ) -> Result<Option<JobVerification>, Error> {
        let (latitude, longitude) = match arrival.coordinates {
            Some(c) => (Some(c.latitude), Some(c.longitude)),
            None => (None, None),
        };

        sqlx::query_as::<_, JobVerification>(&format!(
            r#"
            INSERT INTO job_verifications
            (id, job_id, worker_id, arrival_photo, arrived_at, arrival_latitude,
             arrival_longitude, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $5, $5)
            ON CONFLICT (job_id, worker_id) DO UPDATE
            SET arrival_photo = EXCLUDED.arrival_photo,
                arrived_at = EXCLUDED.arrived_at,
                arrival_latitude = EXCLUDED.arrival_latitude,
                arrival_longitude = EXCLUDED.arrival_longitude,
                updated_at = EXCLUDED.updated_at
            WHERE job_verifications.arrival_confirmed = FALSE
            RETURNING {}
            "#,
            VERIFICATION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(job_id)
        .bind(worker_id)
        .bind(arrival.photo)
        .bind(at)
        .bind(latitude)
        .bind(longitude)
        .fetch_optional(&self.pool)
        .await
    }

    async fn set_confirmation(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        flag: ConfirmationFlag,
        at: DateTime<Utc>,
    ) -> Result<Option<JobVerification>, Error> {
        let (flag_column, at_column) = flag.columns();

        // Only this flag's own columns are written; the first timestamp sticks
        sqlx::query_as::<_, JobVerification>(&format!(
            r#"
            UPDATE job_verifications
            SET {flag} = TRUE,
                {stamp} = COALESCE({stamp}, $3),
                updated_at = $3
            WHERE job_id = $1 AND worker_id = $2
            RETURNING {columns}
            "#,
            flag = flag_column,
            stamp = at_column,
            columns = VERIFICATION_COLUMNS
        ))
        .bind(job_id)
        .bind(worker_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
    }

    async fn confirm_payment(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        method: PaymentMethod,
        reference: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<JobVerification>, Error> {
        sqlx::query_as::<_, JobVerification>(&format!(
            r#"
            UPDATE job_verifications
            SET payment_method = $3,
                payment_reference = $4,
                payment_confirmed_at = $5,
                updated_at = $5
            WHERE job_id = $1 AND worker_id = $2 AND payment_confirmed_at IS NULL
            RETURNING {}
            "#,
            VERIFICATION_COLUMNS
        ))
        .bind(job_id)
        .bind(worker_id)
        .bind(method)
        .bind(reference)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
    }

    async fn record_rating(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        rating: i32,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<(JobVerification, WorkerProfile)>, Error> {
        let mut tx = self.pool.begin().await?;

        let verification = sqlx::query_as::<_, JobVerification>(&format!(
            r#"
            UPDATE job_verifications
            SET rating = $3, rating_comment = $4, rated_at = $5, updated_at = $5
            WHERE job_id = $1 AND worker_id = $2 AND rating IS NULL
            RETURNING {}
            "#,
            VERIFICATION_COLUMNS
        ))
        .bind(job_id)
        .bind(worker_id)
        .bind(rating)
        .bind(comment)
        .bind(at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(verification) = verification else {
            return Ok(None);
        };

        // Row lock serializes concurrent raters of the same worker
        let current = sqlx::query_as::<_, WorkerProfile>(&format!(
            "SELECT {} FROM worker_profiles WHERE id = $1 FOR UPDATE",
            WORKER_COLUMNS
        ))
        .bind(worker_id)
        .fetch_one(&mut *tx)
        .await?;

        let (average, count) = fold_rating(current.rating, current.rating_count, rating);

        let worker = sqlx::query_as::<_, WorkerProfile>(&format!(
            r#"
            UPDATE worker_profiles
            SET rating = $2, rating_count = $3, updated_at = $4
            WHERE id = $1
            RETURNING {}
            "#,
            WORKER_COLUMNS
        ))
        .bind(worker_id)
        .bind(average)
        .bind(count)
        .bind(at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some((verification, worker)))
    }

    async fn raise_dispute(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        raised_by: Uuid,
        reason: String,
        at: DateTime<Utc>,
    ) -> Result<Option<JobVerification>, Error> {
        sqlx::query_as::<_, JobVerification>(&format!(
            r#"
            UPDATE job_verifications
            SET disputed = TRUE,
                dispute_raised_by = $3,
                dispute_reason = $4,
                dispute_raised_at = $5,
                updated_at = $5
            WHERE job_id = $1 AND worker_id = $2 AND disputed = FALSE
            RETURNING {}
            "#,
            VERIFICATION_COLUMNS
        ))
        .bind(job_id)
        .bind(worker_id)
        .bind(raised_by)
        .bind(reason)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
    }

    async fn resolve_dispute(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        resolution: String,
        at: DateTime<Utc>,
    ) -> Result<Option<JobVerification>, Error> {
        // The disputed flag itself is never cleared
        sqlx::query_as::<_, JobVerification>(&format!(
            r#"
            UPDATE job_verifications
            SET dispute_resolution = $3, dispute_resolved_at = $4, updated_at = $4
            WHERE job_id = $1 AND worker_id = $2
              AND disputed = TRUE AND dispute_resolved_at IS NULL
            RETURNING {}
            "#,
            VERIFICATION_COLUMNS
        ))
        .bind(job_id)
        .bind(worker_id)
        .bind(resolution)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
    }
}
