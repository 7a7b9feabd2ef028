use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::BigDecimal;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "badge_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BadgeType {
    FirstJob,
    FiveJobs,
    TenJobs,
    TwentyFiveJobs,
    FiftyJobs,
    WeeklyEarner,
    RisingStar,
    TopRated,
}

/// What a worker has to reach to earn a badge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BadgeRequirement {
    CompletedJobs(i64),
    /// Earnings since Monday 00:00 UTC of the current week
    WeeklyEarnings(i64),
    RatingStreak { min_average: f64, min_count: i32 },
}

/// Canonical order in which milestone badges are checked and reported.
pub const MILESTONE_BADGES: &[BadgeType] = &[
    BadgeType::FirstJob,
    BadgeType::FiveJobs,
    BadgeType::TenJobs,
    BadgeType::TwentyFiveJobs,
    BadgeType::FiftyJobs,
    BadgeType::WeeklyEarner,
    BadgeType::RisingStar,
    BadgeType::TopRated,
];

impl BadgeType {
    pub fn to_str(&self) -> &str {
        match self {
            BadgeType::FirstJob => "first_job",
            BadgeType::FiveJobs => "five_jobs",
            BadgeType::TenJobs => "ten_jobs",
            BadgeType::TwentyFiveJobs => "twenty_five_jobs",
            BadgeType::FiftyJobs => "fifty_jobs",
            BadgeType::WeeklyEarner => "weekly_earner",
            BadgeType::RisingStar => "rising_star",
            BadgeType::TopRated => "top_rated",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BadgeType::FirstJob => "First Job",
            BadgeType::FiveJobs => "5 Jobs Done",
            BadgeType::TenJobs => "10 Jobs Done",
            BadgeType::TwentyFiveJobs => "25 Jobs Done",
            BadgeType::FiftyJobs => "50 Jobs Done",
            BadgeType::WeeklyEarner => "Weekly Earner",
            BadgeType::RisingStar => "Rising Star",
            BadgeType::TopRated => "Top Rated",
        }
    }

    pub fn requirement(&self) -> BadgeRequirement {
        match self {
            BadgeType::FirstJob => BadgeRequirement::CompletedJobs(1),
            BadgeType::FiveJobs => BadgeRequirement::CompletedJobs(5),
            BadgeType::TenJobs => BadgeRequirement::CompletedJobs(10),
            BadgeType::TwentyFiveJobs => BadgeRequirement::CompletedJobs(25),
            BadgeType::FiftyJobs => BadgeRequirement::CompletedJobs(50),
            BadgeType::WeeklyEarner => BadgeRequirement::WeeklyEarnings(50_000),
            BadgeType::RisingStar => BadgeRequirement::RatingStreak { min_average: 4.0, min_count: 5 },
            BadgeType::TopRated => BadgeRequirement::RatingStreak { min_average: 4.5, min_count: 10 },
        }
    }
}

/// Aggregates the badge rules are evaluated against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerStats {
    pub worker_id: Uuid,
    pub completed_jobs: i64,
    pub weekly_earnings: BigDecimal,
    pub week_start: DateTime<Utc>,
    pub rating: f64,
    pub rating_count: i32,
}

/// A badge that qualified and still has to be persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AwardedBadge {
    pub worker_id: Uuid,
    pub badge_type: BadgeType,
    pub snapshot: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkerBadge {
    pub id: Uuid,
    pub worker_id: Uuid,
    pub badge_type: BadgeType,
    pub snapshot: Value,
    pub awarded_at: DateTime<Utc>,
}
