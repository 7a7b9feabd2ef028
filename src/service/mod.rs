pub mod application_service;
pub mod badge_service;
pub mod error;
pub mod job_lifecycle;
pub mod rating;
pub mod trust_service;
pub mod verification_service;
