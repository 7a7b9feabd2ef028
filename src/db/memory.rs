// db/memory.rs
use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{types::BigDecimal, Error};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{badgedb::BadgeExt, labourdb::LabourExt, verificationdb::VerificationExt};
use crate::models::{badgemodel::*, labourmodel::*, verificationmodels::*};
use crate::service::rating::update as fold_rating;

#[derive(Debug, Default)]
struct MemoryState {
    jobs: HashMap<Uuid, Job>,
    workers: HashMap<Uuid, WorkerProfile>,
    applications: HashMap<Uuid, JobApplication>,
    verifications: HashMap<(Uuid, Uuid), JobVerification>,
    badges: Vec<WorkerBadge>,
}

/// In-process store with the same write guarantees as the Postgres one.
///
/// One mutex guards all tables, so every trait call is atomic with respect to
/// every other call.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

/// Jobs and workers to preload when running without a database.
#[derive(Debug, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub jobs: Vec<Job>,
    #[serde(default)]
    pub workers: Vec<WorkerProfile>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: SeedData) -> Self {
        let state = MemoryState {
            jobs: seed.jobs.into_iter().map(|j| (j.id, j)).collect(),
            workers: seed.workers.into_iter().map(|w| (w.id, w)).collect(),
            ..MemoryState::default()
        };
        Self { state: Mutex::new(state) }
    }

    pub fn from_seed_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let seed: SeedData = serde_json::from_str(&raw)?;
        Ok(Self::from_seed(seed))
    }

    #[cfg(test)]
    pub async fn insert_job(&self, job: Job) {
        self.state.lock().await.jobs.insert(job.id, job);
    }

    #[cfg(test)]
    pub async fn insert_worker(&self, worker: WorkerProfile) {
        self.state.lock().await.workers.insert(worker.id, worker);
    }
}

impl MemoryState {
    fn effective_amount(&self, job: &Job, worker_id: Uuid) -> BigDecimal {
        self.applications
            .values()
            .find(|a| {
                a.job_id == job.id
                    && a.worker_id == worker_id
                    && a.status == ApplicationStatus::Accepted
            })
            .and_then(|a| a.proposed_amount.clone())
            .unwrap_or_else(|| job.pay_amount.clone())
    }
}

#[async_trait]
impl LabourExt for MemoryStore {
    async fn get_job_by_id(&self, job_id: Uuid) -> Result<Option<Job>, Error> {
        Ok(self.state.lock().await.jobs.get(&job_id).cloned())
    }

    async fn update_job_status(
        &self,
        job_id: Uuid,
        from: &[JobStatus],
        to: JobStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Job>, Error> {
        let mut state = self.state.lock().await;
        match state.jobs.get_mut(&job_id) {
            Some(job) if from.contains(&job.status) => {
                job.status = to;
                job.updated_at = at;
                Ok(Some(job.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn get_worker_profile(&self, worker_id: Uuid) -> Result<Option<WorkerProfile>, Error> {
        Ok(self.state.lock().await.workers.get(&worker_id).cloned())
    }

    async fn get_worker_stats(
        &self,
        worker_id: Uuid,
        week_start: DateTime<Utc>,
    ) -> Result<WorkerStats, Error> {
        let state = self.state.lock().await;
        let worker = state.workers.get(&worker_id).ok_or(Error::RowNotFound)?;

        let mut completed_jobs = 0;
        let mut weekly_earnings = BigDecimal::from(0);

        for verification in state.verifications.values().filter(|v| v.worker_id == worker_id) {
            let Some(job) = state.jobs.get(&verification.job_id) else {
                continue;
            };
            if job.status != JobStatus::Completed {
                continue;
            }

            completed_jobs += 1;
            if verification.payment_confirmed_at.map_or(false, |at| at >= week_start) {
                weekly_earnings += state.effective_amount(job, worker_id);
            }
        }

        Ok(WorkerStats {
            worker_id,
            completed_jobs,
            weekly_earnings,
            week_start,
            rating: worker.rating,
            rating_count: worker.rating_count,
        })
    }

    async fn create_job_application(
        &self,
        application: NewJobApplication,
    ) -> Result<Option<JobApplication>, Error> {
        let mut state = self.state.lock().await;

        let duplicate = state
            .applications
            .values()
            .any(|a| a.job_id == application.job_id && a.worker_id == application.worker_id);
        if duplicate {
            return Ok(None);
        }

        let job = state.jobs.get_mut(&application.job_id).ok_or(Error::RowNotFound)?;
        job.applications_count += 1;
        job.updated_at = application.applied_at;

        let record = JobApplication {
            id: Uuid::new_v4(),
            job_id: application.job_id,
            worker_id: application.worker_id,
            status: ApplicationStatus::Pending,
            proposed_amount: application.proposed_amount,
            distance_km: application.distance_km,
            applied_at: application.applied_at,
            responded_at: None,
        };
        state.applications.insert(record.id, record.clone());

        Ok(Some(record))
    }

    async fn get_job_application_by_id(
        &self,
        application_id: Uuid,
    ) -> Result<Option<JobApplication>, Error> {
        Ok(self.state.lock().await.applications.get(&application_id).cloned())
    }

    async fn get_application_for_pair(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
    ) -> Result<Option<JobApplication>, Error> {
        Ok(self
            .state
            .lock()
            .await
            .applications
            .values()
            .find(|a| a.job_id == job_id && a.worker_id == worker_id)
            .cloned())
    }

    async fn transition_application(
        &self,
        application_id: Uuid,
        to: ApplicationStatus,
        at: DateTime<Utc>,
    ) -> Result<ApplicationTransition, Error> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let application = state
            .applications
            .get_mut(&application_id)
            .ok_or(Error::RowNotFound)?;
        if application.status != ApplicationStatus::Pending {
            return Ok(ApplicationTransition::NotPending(application.status));
        }

        let job = state.jobs.get_mut(&application.job_id).ok_or(Error::RowNotFound)?;
        match to {
            ApplicationStatus::Accepted if job.status != JobStatus::Open => {
                return Ok(ApplicationTransition::JobNotOpen(job.status));
            }
            ApplicationStatus::Accepted => {
                job.status = JobStatus::Assigned;
                job.updated_at = at;
            }
            ApplicationStatus::Withdrawn => {
                job.applications_count = (job.applications_count - 1).max(0);
                job.updated_at = at;
            }
            ApplicationStatus::Pending | ApplicationStatus::Rejected => {}
        }

        application.status = to;
        application.responded_at = Some(at);

        Ok(ApplicationTransition::Moved(application.clone()))
    }
}

#[async_trait]
impl VerificationExt for MemoryStore {
    async fn get_verification(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
    ) -> Result<Option<JobVerification>, Error> {
        Ok(self.state.lock().await.verifications.get(&(job_id, worker_id)).cloned())
    }

    async fn get_worker_verifications(
        &self,
        worker_id: Uuid,
    ) -> Result<Vec<JobVerification>, Error> {
        let state = self.state.lock().await;
        let mut records: Vec<JobVerification> = state
            .verifications
            .values()
            .filter(|v| v.worker_id == worker_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn record_arrival(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        arrival: ArrivalDetails,
        at: DateTime<Utc>,
    ) -> Result<Option<JobVerification>, Error> {
        let mut state = self.state.lock().await;
        let record = state
            .verifications
            .entry((job_id, worker_id))
            .or_insert_with(|| JobVerification::new(job_id, worker_id, at));

        if record.arrival_confirmed {
            return Ok(None);
        }

        record.arrival_photo = arrival.photo;
        record.arrived_at = Some(at);
        record.arrival_latitude = arrival.coordinates.map(|c| c.latitude);
        record.arrival_longitude = arrival.coordinates.map(|c| c.longitude);
        record.updated_at = at;

        Ok(Some(record.clone()))
    }

    async fn set_confirmation(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        flag: ConfirmationFlag,
        at: DateTime<Utc>,
    ) -> Result<Option<JobVerification>, Error> {
        let mut state = self.state.lock().await;
        Ok(state.verifications.get_mut(&(job_id, worker_id)).map(|record| {
            record.set_flag(flag, at);
            record.clone()
        }))
    }

    async fn confirm_payment(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        method: PaymentMethod,
        reference: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<JobVerification>, Error> {
        let mut state = self.state.lock().await;
        match state.verifications.get_mut(&(job_id, worker_id)) {
            Some(record) if record.payment_confirmed_at.is_none() => {
                record.payment_method = Some(method);
                record.payment_reference = reference;
                record.payment_confirmed_at = Some(at);
                record.updated_at = at;
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn record_rating(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        rating: i32,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<(JobVerification, WorkerProfile)>, Error> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let Some(record) = state.verifications.get_mut(&(job_id, worker_id)) else {
            return Ok(None);
        };
        if record.rating.is_some() {
            return Ok(None);
        }
        // Checked before anything is written so a failure leaves both untouched
        let worker = state.workers.get_mut(&worker_id).ok_or(Error::RowNotFound)?;

        record.rating = Some(rating);
        record.rating_comment = comment;
        record.rated_at = Some(at);
        record.updated_at = at;

        let (average, count) = fold_rating(worker.rating, worker.rating_count, rating);
        worker.rating = average;
        worker.rating_count = count;
        worker.updated_at = at;

        Ok(Some((record.clone(), worker.clone())))
    }

    async fn raise_dispute(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        raised_by: Uuid,
        reason: String,
        at: DateTime<Utc>,
    ) -> Result<Option<JobVerification>, Error> {
        let mut state = self.state.lock().await;
        match state.verifications.get_mut(&(job_id, worker_id)) {
            Some(record) if !record.disputed => {
                record.disputed = true;
                record.dispute_raised_by = Some(raised_by);
                record.dispute_reason = Some(reason);
                record.dispute_raised_at = Some(at);
                record.updated_at = at;
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn resolve_dispute(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        resolution: String,
        at: DateTime<Utc>,
    ) -> Result<Option<JobVerification>, Error> {
        let mut state = self.state.lock().await;
        match state.verifications.get_mut(&(job_id, worker_id)) {
            Some(record) if record.disputed && record.dispute_resolved_at.is_none() => {
                record.dispute_resolution = Some(resolution);
                record.dispute_resolved_at = Some(at);
                record.updated_at = at;
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl BadgeExt for MemoryStore {
    async fn get_worker_badges(&self, worker_id: Uuid) -> Result<Vec<WorkerBadge>, Error> {
        let state = self.state.lock().await;
        Ok(state.badges.iter().filter(|b| b.worker_id == worker_id).cloned().collect())
    }

    async fn has_badge(&self, worker_id: Uuid, badge_type: BadgeType) -> Result<bool, Error> {
        let state = self.state.lock().await;
        Ok(state
            .badges
            .iter()
            .any(|b| b.worker_id == worker_id && b.badge_type == badge_type))
    }

    async fn award_badge(
        &self,
        award: AwardedBadge,
        at: DateTime<Utc>,
    ) -> Result<Option<WorkerBadge>, Error> {
        let mut state = self.state.lock().await;
        let held = state
            .badges
            .iter()
            .any(|b| b.worker_id == award.worker_id && b.badge_type == award.badge_type);
        if held {
            return Ok(None);
        }

        let badge = WorkerBadge {
            id: Uuid::new_v4(),
            worker_id: award.worker_id,
            badge_type: award.badge_type,
            snapshot: award.snapshot,
            awarded_at: at,
        };
        state.badges.push(badge.clone());

        Ok(Some(badge))
    }
}
