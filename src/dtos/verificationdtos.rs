use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use uuid::Uuid;
use validator::Validate;

use crate::{
    models::{badgemodel::{BadgeType, WorkerBadge}, verificationmodels::*},
    service::application_service::ApplicationDraft,
    utils::geo::Coordinates,
};

// Application DTOs
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ApplyToJobDto {
    pub worker_id: Uuid,

    pub proposed_amount: Option<BigDecimal>,

    #[validate(range(min = 0.0, message = "Distance cannot be negative"))]
    pub distance_km: Option<f64>,
}

impl From<ApplyToJobDto> for ApplicationDraft {
    fn from(dto: ApplyToJobDto) -> Self {
        ApplicationDraft {
            proposed_amount: dto.proposed_amount,
            applied_at: None,
            status: None,
            distance_km: dto.distance_km,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct PosterActionDto {
    pub poster_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct WorkerActionDto {
    pub worker_id: Uuid,
}

// Verification DTOs
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RecordArrivalDto {
    #[validate(length(max = 2048, message = "Photo reference is too long"))]
    pub photo: Option<String>,

    pub latitude: Option<f64>,

    pub longitude: Option<f64>,
}

impl RecordArrivalDto {
    /// Coordinates come as a pair or not at all.
    pub fn into_details(self) -> Result<ArrivalDetails, String> {
        if self.latitude.is_some() != self.longitude.is_some() {
            return Err("Latitude and longitude must be sent together".to_string());
        }

        let coordinates = Coordinates::from_parts(self.latitude, self.longitude);
        if coordinates.map_or(false, |c| !c.is_valid()) {
            return Err(
                "Latitude must be between -90 and 90 and longitude between -180 and 180".to_string(),
            );
        }

        Ok(ArrivalDetails {
            photo: self.photo,
            coordinates,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ConfirmPaymentDto {
    pub poster_id: Uuid,

    pub payment_method: PaymentMethod,

    #[validate(length(min = 1, max = 128, message = "Payment reference must be between 1 and 128 characters"))]
    pub payment_reference: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RateWorkerDto {
    pub poster_id: Uuid,

    // Out-of-range values are clamped by the service, not rejected here
    pub rating: i32,

    #[validate(length(max = 1000, message = "Comment cannot exceed 1000 characters"))]
    pub comment: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RaiseDisputeDto {
    pub raised_by: Uuid,

    #[validate(length(min = 1, max = 2000, message = "Reason must be between 1 and 2000 characters"))]
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ResolveDisputeDto {
    pub resolved_by: Uuid,

    #[validate(length(min = 1, max = 2000, message = "Resolution must be between 1 and 2000 characters"))]
    pub resolution: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransitionResponseDto {
    pub application_id: Uuid,
    pub updated: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkerBadgeDto {
    pub badge_type: BadgeType,
    pub label: String,
    pub snapshot: serde_json::Value,
    pub awarded_at: chrono::DateTime<chrono::Utc>,
}

impl From<WorkerBadge> for WorkerBadgeDto {
    fn from(badge: WorkerBadge) -> Self {
        WorkerBadgeDto {
            badge_type: badge.badge_type,
            label: badge.badge_type.label().to_string(),
            snapshot: badge.snapshot,
            awarded_at: badge.awarded_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: &str, data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: message.to_string(),
            data: Some(data),
        }
    }
}
