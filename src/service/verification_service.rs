// service/verification_service.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::BigDecimal;
use uuid::Uuid;

use crate::{
    db::db::Store,
    models::{badgemodel::WorkerBadge, labourmodel::*, verificationmodels::*},
    service::{
        error::ServiceError,
        job_lifecycle::JobLifecycleService,
        rating::clamp_rating,
        trust_service::{ReputationUpdate, TrustService},
    },
    utils::{clock::Clock, time_ago::time_since_opt},
};

#[derive(Debug, Clone, Serialize)]
pub struct PaymentOutcome {
    pub verification: JobVerification,
    /// True only when both completion flags were already set when payment landed.
    pub job_completed: bool,
    pub awarded_badges: Vec<WorkerBadge>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RatingOutcome {
    pub verification: JobVerification,
    pub reputation: ReputationUpdate,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationSummary {
    pub job_id: Uuid,
    pub worker_id: Uuid,
    pub category: JobCategory,
    pub job_status: JobStatus,
    pub stage: VerificationStage,
    pub progress_percentage: u8,

    pub arrived: bool,
    pub arrival_confirmed: bool,
    pub handover_required: bool,
    pub handover_complete: bool,
    pub worker_confirmed: bool,
    pub poster_confirmed: bool,
    pub payment_confirmed: bool,
    pub rated: bool,
    pub disputed: bool,
    pub dispute_resolved: bool,

    pub payment_method: Option<&'static str>,
    pub effective_amount: BigDecimal,
    pub rating: Option<i32>,

    pub arrived_ago: Option<String>,
    pub completed_ago: Option<String>,
    pub paid_ago: Option<String>,
    pub disputed_ago: Option<String>,
}

/// Arrival through payment, rating and disputes for one (job, worker) pair.
///
/// Each step is a single store write on the verification record; flags set by
/// the two parties never clobber each other.
#[derive(Debug, Clone)]
pub struct VerificationService {
    db_client: Arc<dyn Store>,
    job_lifecycle: Arc<JobLifecycleService>,
    trust_service: Arc<TrustService>,
    clock: Arc<dyn Clock>,
}

impl VerificationService {
    pub fn new(
        db_client: Arc<dyn Store>,
        job_lifecycle: Arc<JobLifecycleService>,
        trust_service: Arc<TrustService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db_client,
            job_lifecycle,
            trust_service,
            clock,
        }
    }

    /// Creates the record on first call. Repeat calls overwrite the arrival
    /// details until the poster confirms the arrival.
    pub async fn record_arrival(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        arrival: ArrivalDetails,
    ) -> Result<JobVerification, ServiceError> {
        if let Some(coordinates) = &arrival.coordinates {
            if !coordinates.is_valid() {
                return Err(ServiceError::Validation(
                    "Arrival coordinates are out of range".to_string(),
                ));
            }
        }

        let job = self.job_lifecycle.job(job_id).await?;
        if job.status == JobStatus::Cancelled {
            return Err(ServiceError::InvalidJobStatus(job_id, job.status));
        }

        let accepted = self
            .db_client
            .get_application_for_pair(job_id, worker_id)
            .await?
            .map_or(false, |a| a.status == ApplicationStatus::Accepted);
        if !accepted {
            return Err(ServiceError::WorkerNotAccepted { job_id, worker_id });
        }

        let verification = self
            .db_client
            .record_arrival(job_id, worker_id, arrival, self.clock.now())
            .await?
            .ok_or(ServiceError::ArrivalAlreadyConfirmed(job_id))?;

        tracing::info!(job_id = %job_id, worker_id = %worker_id, "worker arrival recorded");

        if let Err(e) = self.job_lifecycle.start(job_id).await {
            tracing::error!(job_id = %job_id, "could not start job after arrival: {}", e);
        }

        Ok(verification)
    }

    pub async fn confirm_arrival(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        poster_id: Uuid,
    ) -> Result<JobVerification, ServiceError> {
        self.confirm(job_id, worker_id, poster_id, ConfirmationFlag::ArrivalByPoster)
            .await
    }

    pub async fn confirm_handover_by_worker(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        acting_worker_id: Uuid,
    ) -> Result<JobVerification, ServiceError> {
        self.confirm(job_id, worker_id, acting_worker_id, ConfirmationFlag::HandoverByWorker)
            .await
    }

    pub async fn confirm_handover_by_poster(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        poster_id: Uuid,
    ) -> Result<JobVerification, ServiceError> {
        self.confirm(job_id, worker_id, poster_id, ConfirmationFlag::HandoverByPoster)
            .await
    }

    /// Does not complete the job; that waits for payment.
    pub async fn confirm_by_worker(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        acting_worker_id: Uuid,
    ) -> Result<JobVerification, ServiceError> {
        self.confirm(job_id, worker_id, acting_worker_id, ConfirmationFlag::CompletionByWorker)
            .await
    }

    pub async fn confirm_by_poster(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        poster_id: Uuid,
    ) -> Result<JobVerification, ServiceError> {
        self.confirm(job_id, worker_id, poster_id, ConfirmationFlag::CompletionByPoster)
            .await
    }

    /// Records payment once. The job is completed only if both completion
    /// flags are set on the record this write returns. Payment that lands
    /// before mutual completion leaves the job open, and later completion
    /// confirmations do not revisit it.
    pub async fn confirm_payment(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        poster_id: Uuid,
        method: PaymentMethod,
        reference: Option<String>,
    ) -> Result<PaymentOutcome, ServiceError> {
        self.poster_job(job_id, poster_id).await?;
        self.arrived_verification(job_id, worker_id).await?;

        let verification = self
            .db_client
            .confirm_payment(job_id, worker_id, method, reference, self.clock.now())
            .await?
            .ok_or(ServiceError::PaymentAlreadyConfirmed(job_id))?;

        tracing::info!(
            job_id = %job_id,
            worker_id = %worker_id,
            method = method.label(),
            "payment confirmed"
        );

        if !verification.is_mutually_confirmed() {
            tracing::warn!(
                job_id = %job_id,
                worker_id = %worker_id,
                "payment confirmed before mutual completion; job left open"
            );
            return Ok(PaymentOutcome {
                verification,
                job_completed: false,
                awarded_badges: Vec::new(),
            });
        }

        if let Err(e) = self.job_lifecycle.complete(job_id).await {
            tracing::error!(job_id = %job_id, "could not complete job after payment: {}", e);
            return Ok(PaymentOutcome {
                verification,
                job_completed: false,
                awarded_badges: Vec::new(),
            });
        }

        let awarded_badges = self.trust_service.refresh_milestones(worker_id).await;

        Ok(PaymentOutcome {
            verification,
            job_completed: true,
            awarded_badges,
        })
    }

    /// Write-once. The rating is clamped to 1..=5 before it is stored or
    /// folded into the worker's aggregate.
    pub async fn rate_worker(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        poster_id: Uuid,
        rating: i32,
        comment: Option<String>,
    ) -> Result<RatingOutcome, ServiceError> {
        self.poster_job(job_id, poster_id).await?;
        self.arrived_verification(job_id, worker_id).await?;

        let rating = clamp_rating(rating);
        let (verification, reputation) = self
            .trust_service
            .record_job_rating(job_id, worker_id, rating, comment)
            .await?
            .ok_or(ServiceError::AlreadyRated(job_id))?;

        Ok(RatingOutcome {
            verification,
            reputation,
        })
    }

    /// Either party may raise a dispute. Nothing else on the record is blocked.
    pub async fn raise_dispute(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        raised_by: Uuid,
        reason: String,
    ) -> Result<JobVerification, ServiceError> {
        let reason = non_empty(reason, "Dispute reason")?;
        let job = self.job_lifecycle.job(job_id).await?;
        if raised_by != job.poster_id && raised_by != worker_id {
            return Err(ServiceError::UnauthorizedJobAccess(raised_by, job_id));
        }
        self.arrived_verification(job_id, worker_id).await?;

        let verification = self
            .db_client
            .raise_dispute(job_id, worker_id, raised_by, reason, self.clock.now())
            .await?
            .ok_or(ServiceError::DisputeAlreadyRaised(job_id))?;

        tracing::warn!(
            job_id = %job_id,
            worker_id = %worker_id,
            raised_by = %raised_by,
            "dispute raised"
        );

        Ok(verification)
    }

    /// Only the party that raised the dispute can close it. Fills in the
    /// resolution; the dispute flag itself stays set.
    pub async fn resolve_dispute(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        resolved_by: Uuid,
        resolution: String,
    ) -> Result<JobVerification, ServiceError> {
        let resolution = non_empty(resolution, "Dispute resolution")?;

        let open = self
            .db_client
            .get_verification(job_id, worker_id)
            .await?
            .filter(|v| v.disputed && !v.is_dispute_resolved())
            .ok_or(ServiceError::NoOpenDispute(job_id))?;
        if open.dispute_raised_by != Some(resolved_by) {
            return Err(ServiceError::UnauthorizedJobAccess(resolved_by, job_id));
        }

        let verification = self
            .db_client
            .resolve_dispute(job_id, worker_id, resolution, self.clock.now())
            .await?
            .ok_or(ServiceError::NoOpenDispute(job_id))?;

        tracing::info!(
            job_id = %job_id,
            worker_id = %worker_id,
            resolved_by = %resolved_by,
            "dispute resolved"
        );

        Ok(verification)
    }

    pub async fn verification(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
    ) -> Result<JobVerification, ServiceError> {
        self.db_client
            .get_verification(job_id, worker_id)
            .await?
            .ok_or(ServiceError::VerificationNotFound { job_id, worker_id })
    }

    pub async fn summary(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
    ) -> Result<VerificationSummary, ServiceError> {
        let job = self.job_lifecycle.job(job_id).await?;
        let verification = self.verification(job_id, worker_id).await?;
        let effective_amount = self
            .db_client
            .get_application_for_pair(job_id, worker_id)
            .await?
            .filter(|a| a.status == ApplicationStatus::Accepted)
            .and_then(|a| a.proposed_amount)
            .unwrap_or_else(|| job.pay_amount.clone());

        let now = self.clock.now();
        let handover_required = job.category.requires_handover();
        let completed_at = latest(verification.worker_confirmed_at, verification.poster_confirmed_at)
            .filter(|_| verification.is_mutually_confirmed());

        Ok(VerificationSummary {
            job_id,
            worker_id,
            category: job.category,
            job_status: job.status,
            stage: verification.stage(handover_required),
            progress_percentage: verification.progress_percentage(),
            arrived: verification.has_arrived(),
            arrival_confirmed: verification.arrival_confirmed,
            handover_required,
            handover_complete: verification.handover_complete(),
            worker_confirmed: verification.worker_confirmed,
            poster_confirmed: verification.poster_confirmed,
            payment_confirmed: verification.is_payment_confirmed(),
            rated: verification.is_rated(),
            disputed: verification.disputed,
            dispute_resolved: verification.is_dispute_resolved(),
            payment_method: verification.payment_method.map(|m| m.label()),
            effective_amount,
            rating: verification.rating,
            arrived_ago: time_since_opt(verification.arrived_at, now),
            completed_ago: time_since_opt(completed_at, now),
            paid_ago: time_since_opt(verification.payment_confirmed_at, now),
            disputed_ago: time_since_opt(verification.dispute_raised_at, now),
        })
    }

    pub async fn worker_verifications(
        &self,
        worker_id: Uuid,
    ) -> Result<Vec<JobVerification>, ServiceError> {
        Ok(self.db_client.get_worker_verifications(worker_id).await?)
    }

    async fn confirm(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        actor_id: Uuid,
        flag: ConfirmationFlag,
    ) -> Result<JobVerification, ServiceError> {
        // Category is read on every call, never cached
        let job = self.job_lifecycle.job(job_id).await?;

        let expected = match flag.party() {
            Party::Poster => job.poster_id,
            Party::Worker => worker_id,
        };
        if actor_id != expected {
            return Err(ServiceError::UnauthorizedJobAccess(actor_id, job_id));
        }

        if flag.is_handover() && !job.category.requires_handover() {
            return Err(ServiceError::HandoverNotApplicable(job_id, job.category));
        }

        self.arrived_verification(job_id, worker_id).await?;

        let verification = self
            .db_client
            .set_confirmation(job_id, worker_id, flag, self.clock.now())
            .await?
            .ok_or(ServiceError::VerificationNotFound { job_id, worker_id })?;

        tracing::info!(
            job_id = %job_id,
            worker_id = %worker_id,
            flag = ?flag,
            "verification flag confirmed"
        );

        Ok(verification)
    }

    async fn poster_job(&self, job_id: Uuid, poster_id: Uuid) -> Result<Job, ServiceError> {
        let job = self.job_lifecycle.job(job_id).await?;
        if job.poster_id != poster_id {
            return Err(ServiceError::UnauthorizedJobAccess(poster_id, job_id));
        }
        Ok(job)
    }

    async fn arrived_verification(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
    ) -> Result<JobVerification, ServiceError> {
        match self.db_client.get_verification(job_id, worker_id).await? {
            Some(verification) if verification.has_arrived() => Ok(verification),
            _ => Err(ServiceError::ArrivalNotRecorded { job_id, worker_id }),
        }
    }
}

fn non_empty(value: String, field: &str) -> Result<String, ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::Validation(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

fn latest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::badgedb::BadgeExt;
    use crate::db::labourdb::LabourExt;
    use crate::db::memory::{fixtures, MemoryStore};
    use crate::db::verificationdb::VerificationExt;
    use crate::models::badgemodel::BadgeType;
    use crate::service::application_service::{ApplicationDraft, ApplicationService};
    use crate::service::badge_service::BadgeService;
    use crate::utils::clock::ManualClock;
    use crate::utils::geo::Coordinates;
    use chrono::Duration;

    struct World {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        applications: ApplicationService,
        verifications: Arc<VerificationService>,
        job_id: Uuid,
        poster_id: Uuid,
        worker_id: Uuid,
    }

    const JOB_AT: Coordinates = Coordinates { latitude: 6.4550, longitude: 3.3841 };
    const WORKER_AT: Coordinates = Coordinates { latitude: 6.483779, longitude: 3.3841 };

    async fn world(category: JobCategory) -> World {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::at("2024-05-14T08:00:00Z"));
        let poster_id = Uuid::new_v4();

        let job = fixtures::job(category, poster_id, 15_000, Some(JOB_AT));
        let worker = fixtures::worker(Some(WORKER_AT));
        let (job_id, worker_id) = (job.id, worker.id);
        store.insert_job(job).await;
        store.insert_worker(worker).await;

        let lifecycle = Arc::new(JobLifecycleService::new(store.clone(), clock.clone()));
        let badges = Arc::new(BadgeService::new(store.clone(), clock.clone()));
        let trust = Arc::new(TrustService::new(store.clone(), badges, clock.clone()));
        let applications = ApplicationService::new(store.clone(), lifecycle.clone(), clock.clone());
        let verifications = Arc::new(VerificationService::new(
            store.clone(),
            lifecycle,
            trust,
            clock.clone(),
        ));

        World {
            store,
            clock,
            applications,
            verifications,
            job_id,
            poster_id,
            worker_id,
        }
    }

    impl World {
        async fn hire(&self) -> JobApplication {
            let application = self
                .applications
                .apply(self.job_id, self.worker_id, ApplicationDraft::default())
                .await
                .unwrap();
            assert!(self.applications.accept(application.id, self.poster_id).await.unwrap());
            application
        }

        async fn arrive(&self) -> JobVerification {
            self.verifications
                .record_arrival(
                    self.job_id,
                    self.worker_id,
                    ArrivalDetails {
                        photo: Some("arrival.jpg".to_string()),
                        coordinates: Some(JOB_AT),
                    },
                )
                .await
                .unwrap()
        }

        async fn job_status(&self) -> JobStatus {
            self.store.get_job_by_id(self.job_id).await.unwrap().unwrap().status
        }
    }

    #[tokio::test]
    async fn test_apply_to_paid_and_rated() {
        let w = world(JobCategory::Delivery).await;

        let application = w
            .applications
            .apply(w.job_id, w.worker_id, ApplicationDraft::default())
            .await
            .unwrap();
        assert_eq!(application.status, ApplicationStatus::Pending);
        assert!((application.distance_km.unwrap() - 3.2).abs() < 0.01);

        w.clock.advance(Duration::minutes(10));
        assert!(w.applications.accept(application.id, w.poster_id).await.unwrap());
        let accepted = w.applications.application(application.id).await.unwrap();
        assert_eq!(accepted.status, ApplicationStatus::Accepted);
        assert_eq!(accepted.responded_at, Some(w.clock.now()));

        w.clock.advance(Duration::minutes(40));
        let arrived = w.arrive().await;
        assert_eq!(arrived.arrival_coordinates(), Some(JOB_AT));
        assert_eq!(w.job_status().await, JobStatus::InProgress);

        w.clock.advance(Duration::hours(2));
        w.verifications.confirm_by_worker(w.job_id, w.worker_id, w.worker_id).await.unwrap();
        w.verifications
            .confirm_by_poster(w.job_id, w.worker_id, w.poster_id)
            .await
            .unwrap();
        assert_eq!(w.job_status().await, JobStatus::InProgress);

        let paid = w
            .verifications
            .confirm_payment(w.job_id, w.worker_id, w.poster_id, PaymentMethod::Cash, None)
            .await
            .unwrap();
        assert!(paid.job_completed);
        assert_eq!(w.job_status().await, JobStatus::Completed);
        let badges: Vec<BadgeType> = paid.awarded_badges.iter().map(|b| b.badge_type).collect();
        assert_eq!(badges, vec![BadgeType::FirstJob]);

        let rated = w
            .verifications
            .rate_worker(w.job_id, w.worker_id, w.poster_id, 4, Some("On time".to_string()))
            .await
            .unwrap();
        assert_eq!(rated.verification.rating, Some(4));
        assert_eq!(rated.reputation.rating.count, 1);
        assert!((rated.reputation.rating.average - 4.0).abs() < 1e-9);

        let summary = w.verifications.summary(w.job_id, w.worker_id).await.unwrap();
        assert_eq!(summary.progress_percentage, 90);
        assert_eq!(summary.stage, VerificationStage::Completed);
        assert_eq!(summary.payment_method, Some("Cash"));
        assert_eq!(summary.effective_amount, BigDecimal::from(15_000));
        assert_eq!(summary.arrived_ago.as_deref(), Some("2 hours ago"));
        assert_eq!(summary.paid_ago.as_deref(), Some("just now"));
    }

    #[tokio::test]
    async fn test_out_of_range_rating_is_clamped() {
        let w = world(JobCategory::Errand).await;
        w.hire().await;
        w.arrive().await;

        let rated = w
            .verifications
            .rate_worker(w.job_id, w.worker_id, w.poster_id, 6, None)
            .await
            .unwrap();
        assert_eq!(rated.verification.rating, Some(5));
        assert!((rated.reputation.rating.average - 5.0).abs() < 1e-9);

        let err = w
            .verifications
            .rate_worker(w.job_id, w.worker_id, w.poster_id, 1, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyRated(_)));
        let worker = w.store.get_worker_profile(w.worker_id).await.unwrap().unwrap();
        assert_eq!(worker.rating_count, 1);
    }

    #[tokio::test]
    async fn test_dispute_does_not_block_completion() {
        let w = world(JobCategory::Cleaning).await;
        w.hire().await;
        w.arrive().await;

        let disputed = w
            .verifications
            .raise_dispute(w.job_id, w.worker_id, w.poster_id, "Left early".to_string())
            .await
            .unwrap();
        assert!(disputed.disputed);
        assert_eq!(disputed.dispute_raised_by, Some(w.poster_id));

        w.verifications.confirm_by_worker(w.job_id, w.worker_id, w.worker_id).await.unwrap();
        w.verifications
            .confirm_by_poster(w.job_id, w.worker_id, w.poster_id)
            .await
            .unwrap();
        let paid = w
            .verifications
            .confirm_payment(
                w.job_id,
                w.worker_id,
                w.poster_id,
                PaymentMethod::BankTransfer,
                Some("TRX-1".to_string()),
            )
            .await
            .unwrap();
        assert!(paid.job_completed);
        assert!(paid.verification.disputed);

        let resolved = w
            .verifications
            .resolve_dispute(w.job_id, w.worker_id, w.poster_id, "Partial refund agreed".to_string())
            .await
            .unwrap();
        assert!(resolved.disputed);
        assert!(resolved.is_dispute_resolved());

        let err = w
            .verifications
            .resolve_dispute(w.job_id, w.worker_id, w.poster_id, "Again".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NoOpenDispute(_)));
    }

    #[tokio::test]
    async fn test_second_dispute_and_stranger_dispute_rejected() {
        let w = world(JobCategory::Cleaning).await;
        w.hire().await;
        w.arrive().await;

        let err = w
            .verifications
            .raise_dispute(w.job_id, w.worker_id, Uuid::new_v4(), "Not mine".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::UnauthorizedJobAccess(_, _)));

        w.verifications
            .raise_dispute(w.job_id, w.worker_id, w.worker_id, "Unpaid".to_string())
            .await
            .unwrap();
        let err = w
            .verifications
            .raise_dispute(w.job_id, w.worker_id, w.poster_id, "Mine too".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::DisputeAlreadyRaised(_)));
    }

    #[tokio::test]
    async fn test_resolve_without_dispute() {
        let w = world(JobCategory::Cleaning).await;
        w.hire().await;
        w.arrive().await;

        let err = w
            .verifications
            .resolve_dispute(w.job_id, w.worker_id, w.poster_id, "Nothing to resolve".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NoOpenDispute(_)));
    }

    #[tokio::test]
    async fn test_only_the_raiser_resolves_a_dispute() {
        let w = world(JobCategory::Cleaning).await;
        w.hire().await;
        w.arrive().await;

        w.verifications
            .raise_dispute(w.job_id, w.worker_id, w.worker_id, "Unpaid overtime".to_string())
            .await
            .unwrap();

        for outsider in [w.poster_id, Uuid::new_v4()] {
            let err = w
                .verifications
                .resolve_dispute(w.job_id, w.worker_id, outsider, "Closed".to_string())
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::UnauthorizedJobAccess(_, _)));
        }
        let still_open = w.verifications.verification(w.job_id, w.worker_id).await.unwrap();
        assert!(!still_open.is_dispute_resolved());

        let resolved = w
            .verifications
            .resolve_dispute(w.job_id, w.worker_id, w.worker_id, "Paid in cash".to_string())
            .await
            .unwrap();
        assert_eq!(resolved.dispute_resolution.as_deref(), Some("Paid in cash"));
    }

    #[tokio::test]
    async fn test_payment_before_mutual_completion_never_completes_job() {
        let w = world(JobCategory::Moving).await;
        w.hire().await;
        w.arrive().await;
        w.verifications.confirm_by_worker(w.job_id, w.worker_id, w.worker_id).await.unwrap();

        let paid = w
            .verifications
            .confirm_payment(w.job_id, w.worker_id, w.poster_id, PaymentMethod::MobileMoney, None)
            .await
            .unwrap();
        assert!(!paid.job_completed);
        assert_eq!(w.job_status().await, JobStatus::InProgress);

        // The missing confirmation arriving later does not revisit completion
        w.verifications
            .confirm_by_poster(w.job_id, w.worker_id, w.poster_id)
            .await
            .unwrap();
        assert_eq!(w.job_status().await, JobStatus::InProgress);

        let err = w
            .verifications
            .confirm_payment(w.job_id, w.worker_id, w.poster_id, PaymentMethod::Cash, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PaymentAlreadyConfirmed(_)));
        assert_eq!(w.job_status().await, JobStatus::InProgress);
    }

    #[tokio::test]
    async fn test_both_parties_confirming_at_once_both_stick() {
        let w = world(JobCategory::Delivery).await;
        w.hire().await;
        w.arrive().await;

        let (job_id, worker_id, poster_id) = (w.job_id, w.worker_id, w.poster_id);
        let mut handles = Vec::new();
        for _ in 0..10 {
            let worker_side = w.verifications.clone();
            handles.push(tokio::spawn(async move {
                worker_side.confirm_by_worker(job_id, worker_id, worker_id).await.unwrap();
            }));
            let poster_side = w.verifications.clone();
            handles.push(tokio::spawn(async move {
                poster_side.confirm_by_poster(job_id, worker_id, poster_id).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let verification = w.verifications.verification(job_id, worker_id).await.unwrap();
        assert!(verification.is_mutually_confirmed());
        assert_eq!(verification.worker_confirmed_at, Some(w.clock.now()));
    }

    #[tokio::test]
    async fn test_reconfirmation_keeps_first_timestamp() {
        let w = world(JobCategory::Delivery).await;
        w.hire().await;
        w.arrive().await;

        let first = w
            .verifications
            .confirm_arrival(w.job_id, w.worker_id, w.poster_id)
            .await
            .unwrap();
        w.clock.advance(Duration::minutes(15));
        let again = w
            .verifications
            .confirm_arrival(w.job_id, w.worker_id, w.poster_id)
            .await
            .unwrap();

        assert!(again.arrival_confirmed);
        assert_eq!(again.arrival_confirmed_at, first.arrival_confirmed_at);
    }

    #[tokio::test]
    async fn test_handover_only_for_handover_categories() {
        let w = world(JobCategory::Delivery).await;
        w.hire().await;
        w.arrive().await;
        let err = w
            .verifications
            .confirm_handover_by_worker(w.job_id, w.worker_id, w.worker_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::HandoverNotApplicable(_, JobCategory::Delivery)));

        let w = world(JobCategory::QueueStanding).await;
        w.hire().await;
        w.arrive().await;
        let summary = w.verifications.summary(w.job_id, w.worker_id).await.unwrap();
        assert_eq!(summary.stage, VerificationStage::HandoverPending);

        w.verifications
            .confirm_handover_by_worker(w.job_id, w.worker_id, w.worker_id)
            .await
            .unwrap();
        let verification = w
            .verifications
            .confirm_handover_by_poster(w.job_id, w.worker_id, w.poster_id)
            .await
            .unwrap();
        assert!(verification.handover_complete());
        assert_eq!(verification.progress_percentage(), 20);
    }

    #[tokio::test]
    async fn test_arrival_guards() {
        let w = world(JobCategory::Handyman).await;

        // Applied but never accepted
        w.applications
            .apply(w.job_id, w.worker_id, ApplicationDraft::default())
            .await
            .unwrap();
        let err = w
            .verifications
            .record_arrival(w.job_id, w.worker_id, ArrivalDetails::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::WorkerNotAccepted { .. }));

        let err = w
            .verifications
            .confirm_arrival(w.job_id, w.worker_id, w.poster_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ArrivalNotRecorded { .. }));

        let err = w
            .verifications
            .confirm_payment(w.job_id, w.worker_id, w.poster_id, PaymentMethod::Cash, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ArrivalNotRecorded { .. }));
    }

    #[tokio::test]
    async fn test_every_step_waits_for_arrival() {
        // Queue standing so the handover steps get as far as the arrival check
        let w = world(JobCategory::QueueStanding).await;
        w.hire().await;
        let (job, worker, poster) = (w.job_id, w.worker_id, w.poster_id);
        let v = &w.verifications;

        let results: Vec<(&str, Result<(), ServiceError>)> = vec![
            ("confirm_arrival", v.confirm_arrival(job, worker, poster).await.map(|_| ())),
            (
                "confirm_handover_by_worker",
                v.confirm_handover_by_worker(job, worker, worker).await.map(|_| ()),
            ),
            (
                "confirm_handover_by_poster",
                v.confirm_handover_by_poster(job, worker, poster).await.map(|_| ()),
            ),
            ("confirm_by_worker", v.confirm_by_worker(job, worker, worker).await.map(|_| ())),
            ("confirm_by_poster", v.confirm_by_poster(job, worker, poster).await.map(|_| ())),
            (
                "confirm_payment",
                v.confirm_payment(job, worker, poster, PaymentMethod::Cash, None)
                    .await
                    .map(|_| ()),
            ),
            ("rate_worker", v.rate_worker(job, worker, poster, 5, None).await.map(|_| ())),
            (
                "raise_dispute",
                v.raise_dispute(job, worker, worker, "No show".to_string()).await.map(|_| ()),
            ),
        ];

        for (step, result) in results {
            assert!(
                matches!(result, Err(ServiceError::ArrivalNotRecorded { .. })),
                "{} ran before arrival: {:?}",
                step,
                result
            );
        }

        assert!(w.store.get_verification(job, worker).await.unwrap().is_none());
        let profile = w.store.get_worker_profile(worker).await.unwrap().unwrap();
        assert_eq!(profile.rating_count, 0);
        assert_eq!(w.job_status().await, JobStatus::Assigned);
    }

    #[tokio::test]
    async fn test_worker_side_confirmations_require_the_worker() {
        let w = world(JobCategory::QueueStanding).await;
        w.hire().await;
        w.arrive().await;

        for impostor in [w.poster_id, Uuid::new_v4()] {
            assert!(matches!(
                w.verifications.confirm_by_worker(w.job_id, w.worker_id, impostor).await,
                Err(ServiceError::UnauthorizedJobAccess(_, _))
            ));
            assert!(matches!(
                w.verifications
                    .confirm_handover_by_worker(w.job_id, w.worker_id, impostor)
                    .await,
                Err(ServiceError::UnauthorizedJobAccess(_, _))
            ));
        }

        // The poster confirming alone is never mutual completion
        w.verifications
            .confirm_by_poster(w.job_id, w.worker_id, w.poster_id)
            .await
            .unwrap();
        let verification = w.verifications.verification(w.job_id, w.worker_id).await.unwrap();
        assert!(!verification.worker_confirmed);
        assert!(!verification.handover_worker_confirmed);
        assert!(!verification.is_mutually_confirmed());
    }

    #[tokio::test]
    async fn test_arrival_overwrites_until_confirmed() {
        let w = world(JobCategory::EventStaffing).await;
        w.hire().await;
        w.arrive().await;

        w.clock.advance(Duration::minutes(3));
        let retried = w
            .verifications
            .record_arrival(
                w.job_id,
                w.worker_id,
                ArrivalDetails { photo: Some("retake.jpg".to_string()), coordinates: None },
            )
            .await
            .unwrap();
        assert_eq!(retried.arrival_photo.as_deref(), Some("retake.jpg"));
        assert_eq!(retried.arrived_at, Some(w.clock.now()));
        assert_eq!(retried.arrival_coordinates(), None);

        w.verifications
            .confirm_arrival(w.job_id, w.worker_id, w.poster_id)
            .await
            .unwrap();
        let err = w
            .verifications
            .record_arrival(w.job_id, w.worker_id, ArrivalDetails::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ArrivalAlreadyConfirmed(_)));

        let bad = ArrivalDetails {
            photo: None,
            coordinates: Some(Coordinates::new(91.0, 0.0)),
        };
        let err = w
            .verifications
            .record_arrival(w.job_id, w.worker_id, bad)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_poster_actions_require_the_poster() {
        let w = world(JobCategory::Delivery).await;
        w.hire().await;
        w.arrive().await;
        let stranger = Uuid::new_v4();

        assert!(matches!(
            w.verifications.confirm_by_poster(w.job_id, w.worker_id, stranger).await,
            Err(ServiceError::UnauthorizedJobAccess(_, _))
        ));
        assert!(matches!(
            w.verifications
                .confirm_payment(w.job_id, w.worker_id, stranger, PaymentMethod::Cash, None)
                .await,
            Err(ServiceError::UnauthorizedJobAccess(_, _))
        ));
        assert!(matches!(
            w.verifications.rate_worker(w.job_id, w.worker_id, stranger, 5, None).await,
            Err(ServiceError::UnauthorizedJobAccess(_, _))
        ));
    }

    #[tokio::test]
    async fn test_summary_uses_accepted_proposed_amount() {
        let w = world(JobCategory::Delivery).await;
        let application = w
            .applications
            .apply(
                w.job_id,
                w.worker_id,
                ApplicationDraft {
                    proposed_amount: Some(BigDecimal::from(18_000)),
                    ..ApplicationDraft::default()
                },
            )
            .await
            .unwrap();
        w.applications.accept(application.id, w.poster_id).await.unwrap();
        w.arrive().await;

        let summary = w.verifications.summary(w.job_id, w.worker_id).await.unwrap();
        assert_eq!(summary.effective_amount, BigDecimal::from(18_000));
        assert_eq!(summary.stage, VerificationStage::Arrived);
        assert_eq!(summary.progress_percentage, 20);
        assert_eq!(summary.completed_ago, None);
        assert!(!summary.disputed);
    }

    #[tokio::test]
    async fn test_weekly_earner_after_big_payout() {
        let w = world(JobCategory::Moving).await;
        let application = w
            .applications
            .apply(
                w.job_id,
                w.worker_id,
                ApplicationDraft {
                    proposed_amount: Some(BigDecimal::from(60_000)),
                    ..ApplicationDraft::default()
                },
            )
            .await
            .unwrap();
        w.applications.accept(application.id, w.poster_id).await.unwrap();
        w.arrive().await;
        w.verifications.confirm_by_worker(w.job_id, w.worker_id, w.worker_id).await.unwrap();
        w.verifications
            .confirm_by_poster(w.job_id, w.worker_id, w.poster_id)
            .await
            .unwrap();

        let paid = w
            .verifications
            .confirm_payment(w.job_id, w.worker_id, w.poster_id, PaymentMethod::Wallet, None)
            .await
            .unwrap();
        let badges: Vec<BadgeType> = paid.awarded_badges.iter().map(|b| b.badge_type).collect();
        assert_eq!(badges, vec![BadgeType::FirstJob, BadgeType::WeeklyEarner]);
        assert!(w.store.has_badge(w.worker_id, BadgeType::WeeklyEarner).await.unwrap());

        let history = w.verifications.worker_verifications(w.worker_id).await.unwrap();
        assert_eq!(history.len(), 1);
    }
}
