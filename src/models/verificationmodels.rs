// models/verificationmodels.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::geo::Coordinates;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    MobileMoney,
    Wallet,
    Other,
}

impl PaymentMethod {
    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "Cash",
            PaymentMethod::BankTransfer => "Bank transfer",
            PaymentMethod::MobileMoney => "Mobile money",
            PaymentMethod::Wallet => "In-app wallet",
            PaymentMethod::Other => "Other",
        }
    }
}

/// The two sides of a job. Each mutual step needs both.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Worker,
    Poster,
}

/// Every monotonic boolean on the verification record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationFlag {
    ArrivalByPoster,
    HandoverByWorker,
    HandoverByPoster,
    CompletionByWorker,
    CompletionByPoster,
}

impl ConfirmationFlag {
    /// (flag column, timestamp column)
    pub fn columns(&self) -> (&'static str, &'static str) {
        match self {
            ConfirmationFlag::ArrivalByPoster => ("arrival_confirmed", "arrival_confirmed_at"),
            ConfirmationFlag::HandoverByWorker => ("handover_worker_confirmed", "handover_worker_confirmed_at"),
            ConfirmationFlag::HandoverByPoster => ("handover_poster_confirmed", "handover_poster_confirmed_at"),
            ConfirmationFlag::CompletionByWorker => ("worker_confirmed", "worker_confirmed_at"),
            ConfirmationFlag::CompletionByPoster => ("poster_confirmed", "poster_confirmed_at"),
        }
    }

    pub fn party(&self) -> Party {
        match self {
            ConfirmationFlag::HandoverByWorker | ConfirmationFlag::CompletionByWorker => Party::Worker,
            _ => Party::Poster,
        }
    }

    pub fn is_handover(&self) -> bool {
        matches!(self, ConfirmationFlag::HandoverByWorker | ConfirmationFlag::HandoverByPoster)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArrivalDetails {
    pub photo: Option<String>,
    pub coordinates: Option<Coordinates>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobVerification {
    pub id: Uuid,
    pub job_id: Uuid,
    pub worker_id: Uuid,

    pub arrival_photo: Option<String>,
    pub arrived_at: Option<DateTime<Utc>>,
    pub arrival_latitude: Option<f64>,
    pub arrival_longitude: Option<f64>,
    pub arrival_confirmed: bool,
    pub arrival_confirmed_at: Option<DateTime<Utc>>,

    pub handover_worker_confirmed: bool,
    pub handover_worker_confirmed_at: Option<DateTime<Utc>>,
    pub handover_poster_confirmed: bool,
    pub handover_poster_confirmed_at: Option<DateTime<Utc>>,

    pub worker_confirmed: bool,
    pub worker_confirmed_at: Option<DateTime<Utc>>,
    pub poster_confirmed: bool,
    pub poster_confirmed_at: Option<DateTime<Utc>>,

    pub payment_method: Option<PaymentMethod>,
    pub payment_confirmed_at: Option<DateTime<Utc>>,
    pub payment_reference: Option<String>,

    pub rating: Option<i32>,
    pub rating_comment: Option<String>,
    pub rated_at: Option<DateTime<Utc>>,

    pub disputed: bool,
    pub dispute_raised_by: Option<Uuid>,
    pub dispute_reason: Option<String>,
    pub dispute_raised_at: Option<DateTime<Utc>>,
    pub dispute_resolution: Option<String>,
    pub dispute_resolved_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Where a verification sits in the arrival → payment sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStage {
    Created,
    HandoverPending,
    Arrived,
    AwaitingMutualCompletion,
    PaymentPending,
    /// Payment recorded before both sides confirmed completion.
    PaidAwaitingCompletion,
    Completed,
}

impl JobVerification {
    /// Blank record for a (job, worker) pair; nothing has happened yet.
    pub fn new(job_id: Uuid, worker_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            worker_id,
            arrival_photo: None,
            arrived_at: None,
            arrival_latitude: None,
            arrival_longitude: None,
            arrival_confirmed: false,
            arrival_confirmed_at: None,
            handover_worker_confirmed: false,
            handover_worker_confirmed_at: None,
            handover_poster_confirmed: false,
            handover_poster_confirmed_at: None,
            worker_confirmed: false,
            worker_confirmed_at: None,
            poster_confirmed: false,
            poster_confirmed_at: None,
            payment_method: None,
            payment_confirmed_at: None,
            payment_reference: None,
            rating: None,
            rating_comment: None,
            rated_at: None,
            disputed: false,
            dispute_raised_by: None,
            dispute_reason: None,
            dispute_raised_at: None,
            dispute_resolution: None,
            dispute_resolved_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_arrived(&self) -> bool {
        self.arrived_at.is_some()
    }

    pub fn arrival_coordinates(&self) -> Option<Coordinates> {
        Coordinates::from_parts(self.arrival_latitude, self.arrival_longitude)
    }

    pub fn flag(&self, flag: ConfirmationFlag) -> bool {
        match flag {
            ConfirmationFlag::ArrivalByPoster => self.arrival_confirmed,
            ConfirmationFlag::HandoverByWorker => self.handover_worker_confirmed,
            ConfirmationFlag::HandoverByPoster => self.handover_poster_confirmed,
            ConfirmationFlag::CompletionByWorker => self.worker_confirmed,
            ConfirmationFlag::CompletionByPoster => self.poster_confirmed,
        }
    }

    /// Sets a flag and, only the first time, its timestamp.
    pub fn set_flag(&mut self, flag: ConfirmationFlag, at: DateTime<Utc>) {
        let (value, stamp) = match flag {
            ConfirmationFlag::ArrivalByPoster => (&mut self.arrival_confirmed, &mut self.arrival_confirmed_at),
            ConfirmationFlag::HandoverByWorker => (&mut self.handover_worker_confirmed, &mut self.handover_worker_confirmed_at),
            ConfirmationFlag::HandoverByPoster => (&mut self.handover_poster_confirmed, &mut self.handover_poster_confirmed_at),
            ConfirmationFlag::CompletionByWorker => (&mut self.worker_confirmed, &mut self.worker_confirmed_at),
            ConfirmationFlag::CompletionByPoster => (&mut self.poster_confirmed, &mut self.poster_confirmed_at),
        };
        *value = true;
        if stamp.is_none() {
            *stamp = Some(at);
        }
        self.updated_at = at;
    }

    pub fn handover_complete(&self) -> bool {
        self.handover_worker_confirmed && self.handover_poster_confirmed
    }

    pub fn is_mutually_confirmed(&self) -> bool {
        self.worker_confirmed && self.poster_confirmed
    }

    pub fn is_payment_confirmed(&self) -> bool {
        self.payment_confirmed_at.is_some()
    }

    pub fn is_rated(&self) -> bool {
        self.rating.is_some()
    }

    pub fn is_dispute_resolved(&self) -> bool {
        self.dispute_resolved_at.is_some()
    }

    /// Informational 0-100 score; never used to gate a transition.
    pub fn progress_percentage(&self) -> u8 {
        let milestones: [(bool, u8); 6] = [
            (self.has_arrived(), 20),
            (self.arrival_confirmed, 10),
            (self.worker_confirmed, 20),
            (self.poster_confirmed, 20),
            (self.is_payment_confirmed(), 20),
            (self.is_rated(), 10),
        ];

        milestones
            .iter()
            .filter(|(reached, _)| *reached)
            .map(|(_, weight)| weight)
            .sum()
    }

    /// Handover flags are ignored entirely unless the job's category needs them.
    pub fn stage(&self, requires_handover: bool) -> VerificationStage {
        if !self.has_arrived() {
            return VerificationStage::Created;
        }

        match (self.is_mutually_confirmed(), self.is_payment_confirmed()) {
            (true, true) => VerificationStage::Completed,
            (true, false) => VerificationStage::PaymentPending,
            (false, true) => VerificationStage::PaidAwaitingCompletion,
            (false, false) => {
                if requires_handover && !self.handover_complete() {
                    VerificationStage::HandoverPending
                } else if self.worker_confirmed || self.poster_confirmed {
                    VerificationStage::AwaitingMutualCompletion
                } else {
                    VerificationStage::Arrived
                }
            }
        }
    }
}
