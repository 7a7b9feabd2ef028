// service/application_service.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use num_traits::Zero;
use sqlx::types::BigDecimal;
use uuid::Uuid;

use crate::{
    db::db::Store,
    models::labourmodel::*,
    service::{error::ServiceError, job_lifecycle::JobLifecycleService},
    utils::{clock::Clock, geo::distance_km},
};

/// Optional values supplied with a new application. Anything left out is
/// filled in at creation and never recomputed. Only the poster moves an
/// application out of `pending`, so `status` may only ever be `Pending`.
#[derive(Debug, Clone, Default)]
pub struct ApplicationDraft {
    pub proposed_amount: Option<BigDecimal>,
    pub applied_at: Option<DateTime<Utc>>,
    pub status: Option<ApplicationStatus>,
    pub distance_km: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ApplicationService {
    db_client: Arc<dyn Store>,
    job_lifecycle: Arc<JobLifecycleService>,
    clock: Arc<dyn Clock>,
}

impl ApplicationService {
    pub fn new(
        db_client: Arc<dyn Store>,
        job_lifecycle: Arc<JobLifecycleService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db_client,
            job_lifecycle,
            clock,
        }
    }

    pub async fn apply(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        draft: ApplicationDraft,
    ) -> Result<JobApplication, ServiceError> {
        let job = self.job_lifecycle.job(job_id).await?;
        if job.status != JobStatus::Open {
            return Err(ServiceError::InvalidJobStatus(job_id, job.status));
        }

        let worker = self
            .db_client
            .get_worker_profile(worker_id)
            .await?
            .ok_or(ServiceError::WorkerProfileNotFound(worker_id))?;

        if let Some(status) = draft.status.filter(|s| s.is_terminal()) {
            return Err(ServiceError::Validation(format!(
                "A new application cannot start as {}",
                status.to_str()
            )));
        }

        if let Some(amount) = &draft.proposed_amount {
            if amount <= &BigDecimal::zero() {
                return Err(ServiceError::Validation("Proposed amount must be positive".to_string()));
            }
        }

        let applied_at = draft.applied_at.unwrap_or_else(|| self.clock.now());
        // Unknown location on either side leaves the distance unset, not zero
        let distance_km = draft
            .distance_km
            .or_else(|| distance_km(worker.coordinates(), job.coordinates()));

        let application = self
            .db_client
            .create_job_application(NewJobApplication {
                job_id,
                worker_id,
                proposed_amount: draft.proposed_amount,
                distance_km,
                applied_at,
            })
            .await?
            .ok_or(ServiceError::DuplicateApplication { job_id, worker_id })?;

        tracing::info!(
            job_id = %job_id,
            worker_id = %worker_id,
            distance_km = ?application.distance_km,
            "job application created"
        );

        Ok(application)
    }

    /// `Ok(false)` if the application is no longer pending; nothing changes.
    /// The job must still be open, so a job is only ever assigned once.
    pub async fn accept(&self, application_id: Uuid, poster_id: Uuid) -> Result<bool, ServiceError> {
        let application = self.poster_owned_application(application_id, poster_id).await?;
        self.respond(&application, ApplicationStatus::Accepted).await
    }

    pub async fn reject(&self, application_id: Uuid, poster_id: Uuid) -> Result<bool, ServiceError> {
        let application = self.poster_owned_application(application_id, poster_id).await?;
        self.respond(&application, ApplicationStatus::Rejected).await
    }

    pub async fn withdraw(&self, application_id: Uuid, worker_id: Uuid) -> Result<bool, ServiceError> {
        let application = self.application(application_id).await?;
        if application.worker_id != worker_id {
            return Err(ServiceError::UnauthorizedJobAccess(worker_id, application.job_id));
        }

        self.respond(&application, ApplicationStatus::Withdrawn).await
    }

    pub async fn application(&self, application_id: Uuid) -> Result<JobApplication, ServiceError> {
        self.db_client
            .get_job_application_by_id(application_id)
            .await?
            .ok_or(ServiceError::ApplicationNotFound(application_id))
    }

    async fn poster_owned_application(
        &self,
        application_id: Uuid,
        poster_id: Uuid,
    ) -> Result<JobApplication, ServiceError> {
        let application = self.application(application_id).await?;
        let job = self.job_lifecycle.job(application.job_id).await?;

        if job.poster_id != poster_id {
            return Err(ServiceError::UnauthorizedJobAccess(poster_id, job.id));
        }

        Ok(application)
    }

    async fn respond(
        &self,
        application: &JobApplication,
        to: ApplicationStatus,
    ) -> Result<bool, ServiceError> {
        let outcome = self
            .db_client
            .transition_application(application.id, to, self.clock.now())
            .await?;

        match outcome {
            ApplicationTransition::Moved(_) => {
                tracing::info!(
                    application_id = %application.id,
                    status = to.to_str(),
                    "job application responded"
                );
                Ok(true)
            }
            ApplicationTransition::NotPending(current) => {
                tracing::warn!(
                    application_id = %application.id,
                    current = current.to_str(),
                    wanted = to.to_str(),
                    "application is not pending"
                );
                Ok(false)
            }
            ApplicationTransition::JobNotOpen(status) => {
                tracing::warn!(
                    application_id = %application.id,
                    job_id = %application.job_id,
                    job_status = status.to_str(),
                    "job is no longer open; application left pending"
                );
                Err(ServiceError::InvalidJobStatus(application.job_id, status))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::labourdb::LabourExt;
    use crate::db::memory::{fixtures, MemoryStore};
    use crate::utils::clock::ManualClock;
    use crate::utils::geo::Coordinates;

    struct Fixture {
        service: ApplicationService,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        job_id: Uuid,
        poster_id: Uuid,
        worker_id: Uuid,
    }

    // Roughly 3.2 km apart along a meridian
    const JOB_AT: Coordinates = Coordinates { latitude: 6.4550, longitude: 3.3841 };
    const WORKER_AT: Coordinates = Coordinates { latitude: 6.483779, longitude: 3.3841 };

    async fn fixture(job_at: Option<Coordinates>, worker_at: Option<Coordinates>) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::at("2024-05-13T09:00:00Z"));
        let poster_id = Uuid::new_v4();

        let job = fixtures::job(JobCategory::Delivery, poster_id, 3000, job_at);
        let worker = fixtures::worker(worker_at);
        let (job_id, worker_id) = (job.id, worker.id);
        store.insert_job(job).await;
        store.insert_worker(worker).await;

        let lifecycle = Arc::new(JobLifecycleService::new(store.clone(), clock.clone()));
        let service = ApplicationService::new(store.clone(), lifecycle, clock.clone());

        Fixture { service, store, clock, job_id, poster_id, worker_id }
    }

    #[tokio::test]
    async fn test_apply_fills_defaults_and_distance() {
        let f = fixture(Some(JOB_AT), Some(WORKER_AT)).await;

        let application = f
            .service
            .apply(f.job_id, f.worker_id, ApplicationDraft::default())
            .await
            .unwrap();

        assert_eq!(application.status, ApplicationStatus::Pending);
        assert_eq!(application.applied_at, f.clock.now());
        assert_eq!(application.responded_at, None);
        let distance = application.distance_km.unwrap();
        assert!((distance - 3.2).abs() < 0.01, "got {}", distance);

        let job = f.store.get_job_by_id(f.job_id).await.unwrap().unwrap();
        assert_eq!(job.applications_count, 1);
    }

    #[tokio::test]
    async fn test_missing_location_leaves_distance_unknown() {
        let f = fixture(Some(JOB_AT), None).await;
        let application = f
            .service
            .apply(f.job_id, f.worker_id, ApplicationDraft::default())
            .await
            .unwrap();
        assert_eq!(application.distance_km, None);
    }

    #[tokio::test]
    async fn test_supplied_values_are_kept() {
        let f = fixture(Some(JOB_AT), Some(WORKER_AT)).await;
        let applied_at = f.clock.now() - chrono::Duration::hours(1);

        let application = f
            .service
            .apply(
                f.job_id,
                f.worker_id,
                ApplicationDraft {
                    proposed_amount: Some(BigDecimal::from(3500)),
                    applied_at: Some(applied_at),
                    status: None,
                    distance_km: Some(7.5),
                },
            )
            .await
            .unwrap();

        assert_eq!(application.applied_at, applied_at);
        assert_eq!(application.distance_km, Some(7.5));
        assert_eq!(application.proposed_amount, Some(BigDecimal::from(3500)));
    }

    #[tokio::test]
    async fn test_draft_cannot_start_past_pending() {
        for status in [
            ApplicationStatus::Accepted,
            ApplicationStatus::Rejected,
            ApplicationStatus::Withdrawn,
        ] {
            let f = fixture(None, None).await;
            let draft = ApplicationDraft {
                status: Some(status),
                ..ApplicationDraft::default()
            };

            let err = f.service.apply(f.job_id, f.worker_id, draft).await.unwrap_err();
            assert!(matches!(err, ServiceError::Validation(_)), "{:?} was let through", status);

            let stored = f.store.get_application_for_pair(f.job_id, f.worker_id).await.unwrap();
            assert!(stored.is_none());
            let job = f.store.get_job_by_id(f.job_id).await.unwrap().unwrap();
            assert_eq!(job.applications_count, 0);
            assert_eq!(job.status, JobStatus::Open);
        }

        let f = fixture(None, None).await;
        let draft = ApplicationDraft {
            status: Some(ApplicationStatus::Pending),
            ..ApplicationDraft::default()
        };
        let application = f.service.apply(f.job_id, f.worker_id, draft).await.unwrap();
        assert_eq!(application.status, ApplicationStatus::Pending);
        assert_eq!(application.responded_at, None);
    }

    #[tokio::test]
    async fn test_duplicate_application_rejected() {
        let f = fixture(None, None).await;
        f.service.apply(f.job_id, f.worker_id, ApplicationDraft::default()).await.unwrap();

        let err = f
            .service
            .apply(f.job_id, f.worker_id, ApplicationDraft::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateApplication { .. }));

        let job = f.store.get_job_by_id(f.job_id).await.unwrap().unwrap();
        assert_eq!(job.applications_count, 1);
    }

    #[tokio::test]
    async fn test_non_positive_amount_rejected() {
        let f = fixture(None, None).await;
        let draft = ApplicationDraft {
            proposed_amount: Some(BigDecimal::from(0)),
            ..ApplicationDraft::default()
        };
        let err = f.service.apply(f.job_id, f.worker_id, draft).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_accept_sets_responded_at_and_assigns_job() {
        let f = fixture(None, None).await;
        let application = f
            .service
            .apply(f.job_id, f.worker_id, ApplicationDraft::default())
            .await
            .unwrap();

        f.clock.advance(chrono::Duration::minutes(30));
        assert!(f.service.accept(application.id, f.poster_id).await.unwrap());

        let stored = f.service.application(application.id).await.unwrap();
        assert_eq!(stored.status, ApplicationStatus::Accepted);
        assert_eq!(stored.responded_at, Some(f.clock.now()));

        let job = f.store.get_job_by_id(f.job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Assigned);
    }

    #[tokio::test]
    async fn test_job_is_assigned_to_one_worker_only() {
        let f = fixture(None, None).await;
        let rival = fixtures::worker(None);
        let rival_id = rival.id;
        f.store.insert_worker(rival).await;

        let first = f
            .service
            .apply(f.job_id, f.worker_id, ApplicationDraft::default())
            .await
            .unwrap();
        let second = f
            .service
            .apply(f.job_id, rival_id, ApplicationDraft::default())
            .await
            .unwrap();

        assert!(f.service.accept(first.id, f.poster_id).await.unwrap());

        let err = f.service.accept(second.id, f.poster_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidJobStatus(_, JobStatus::Assigned)));

        let second = f.service.application(second.id).await.unwrap();
        assert_eq!(second.status, ApplicationStatus::Pending);
        assert_eq!(second.responded_at, None);

        // Still free to turn the other applicant down
        assert!(f.service.reject(second.id, f.poster_id).await.unwrap());

        let job = f.store.get_job_by_id(f.job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Assigned);
        assert_eq!(job.applications_count, 2);
    }

    #[tokio::test]
    async fn test_terminal_applications_refuse_every_transition() {
        for terminal in [
            ApplicationStatus::Accepted,
            ApplicationStatus::Rejected,
            ApplicationStatus::Withdrawn,
        ] {
            let f = fixture(None, None).await;
            let application = f
                .service
                .apply(f.job_id, f.worker_id, ApplicationDraft::default())
                .await
                .unwrap();

            let moved = match terminal {
                ApplicationStatus::Accepted => f.service.accept(application.id, f.poster_id).await,
                ApplicationStatus::Rejected => f.service.reject(application.id, f.poster_id).await,
                _ => f.service.withdraw(application.id, f.worker_id).await,
            };
            assert!(moved.unwrap());
            let before = f.service.application(application.id).await.unwrap();

            f.clock.advance(chrono::Duration::minutes(5));
            assert!(!f.service.accept(application.id, f.poster_id).await.unwrap());
            assert!(!f.service.reject(application.id, f.poster_id).await.unwrap());
            assert!(!f.service.withdraw(application.id, f.worker_id).await.unwrap());

            let after = f.service.application(application.id).await.unwrap();
            assert_eq!(after.status, terminal);
            assert_eq!(after.responded_at, before.responded_at);
        }
    }

    #[tokio::test]
    async fn test_withdraw_decrements_counter() {
        let f = fixture(None, None).await;
        let application = f
            .service
            .apply(f.job_id, f.worker_id, ApplicationDraft::default())
            .await
            .unwrap();

        assert!(f.service.withdraw(application.id, f.worker_id).await.unwrap());

        let job = f.store.get_job_by_id(f.job_id).await.unwrap().unwrap();
        assert_eq!(job.applications_count, 0);
    }

    #[tokio::test]
    async fn test_only_poster_can_accept_and_only_applicant_can_withdraw() {
        let f = fixture(None, None).await;
        let application = f
            .service
            .apply(f.job_id, f.worker_id, ApplicationDraft::default())
            .await
            .unwrap();

        let stranger = Uuid::new_v4();
        assert!(matches!(
            f.service.accept(application.id, stranger).await,
            Err(ServiceError::UnauthorizedJobAccess(_, _))
        ));
        assert!(matches!(
            f.service.withdraw(application.id, stranger).await,
            Err(ServiceError::UnauthorizedJobAccess(_, _))
        ));

        let stored = f.service.application(application.id).await.unwrap();
        assert_eq!(stored.status, ApplicationStatus::Pending);
    }

    #[tokio::test]
    async fn test_closed_job_takes_no_applications() {
        let f = fixture(None, None).await;
        f.store
            .update_job_status(f.job_id, &[JobStatus::Open], JobStatus::Cancelled, f.clock.now())
            .await
            .unwrap();

        let err = f
            .service
            .apply(f.job_id, f.worker_id, ApplicationDraft::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidJobStatus(_, JobStatus::Cancelled)));
    }
}
