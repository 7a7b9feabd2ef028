use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use sqlx::types::BigDecimal;

use crate::utils::geo::Coordinates;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "job_category", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobCategory {
    // Someone holds a place or stands in for the poster and hands it over
    QueueStanding,

    Delivery,
    Errand,
    Cleaning,
    Moving,
    EventStaffing,
    Handyman,
    Other,
}

/// Categories whose jobs need the extra mutual handover step.
const HANDOVER_CATEGORIES: &[JobCategory] = &[JobCategory::QueueStanding];

impl JobCategory {
    pub fn to_str(&self) -> &str {
        match self {
            JobCategory::QueueStanding => "queue_standing",
            JobCategory::Delivery => "delivery",
            JobCategory::Errand => "errand",
            JobCategory::Cleaning => "cleaning",
            JobCategory::Moving => "moving",
            JobCategory::EventStaffing => "event_staffing",
            JobCategory::Handyman => "handyman",
            JobCategory::Other => "other",
        }
    }

    pub fn requires_handover(&self) -> bool {
        HANDOVER_CATEGORIES.contains(self)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Open,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub fn to_str(&self) -> &str {
        match self {
            JobStatus::Open => "open",
            JobStatus::Assigned => "assigned",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "application_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Accepted,
    Rejected,
    Withdrawn,
}

impl ApplicationStatus {
    pub fn to_str(&self) -> &str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Withdrawn => "withdrawn",
        }
    }

    /// Pending is the only state an application can leave.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApplicationStatus::Pending)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub poster_id: Uuid,
    pub category: JobCategory,
    pub title: String,
    pub pay_amount: BigDecimal,
    pub status: JobStatus,
    pub applications_count: i32,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn coordinates(&self) -> Option<Coordinates> {
        Coordinates::from_parts(self.latitude, self.longitude)
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct WorkerProfile {
    pub id: Uuid,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub rating: f64,
    pub rating_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkerProfile {
    pub fn coordinates(&self) -> Option<Coordinates> {
        Coordinates::from_parts(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobApplication {
    pub id: Uuid,
    pub job_id: Uuid,
    pub worker_id: Uuid,
    pub status: ApplicationStatus,
    pub proposed_amount: Option<BigDecimal>,
    pub distance_km: Option<f64>,
    pub applied_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

/// Fully resolved values for a new application row. Rows always start `pending`.
#[derive(Debug, Clone)]
pub struct NewJobApplication {
    pub job_id: Uuid,
    pub worker_id: Uuid,
    pub proposed_amount: Option<BigDecimal>,
    pub distance_km: Option<f64>,
    pub applied_at: DateTime<Utc>,
}

/// Outcome of moving an application out of `pending`.
#[derive(Debug, Clone)]
pub enum ApplicationTransition {
    Moved(JobApplication),
    NotPending(ApplicationStatus),
    /// Accepting needs the job to still be open.
    JobNotOpen(JobStatus),
}
