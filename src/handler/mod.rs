pub mod applications;
pub mod verification;
