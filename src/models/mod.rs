pub mod badgemodel;
pub mod labourmodel;
pub mod verificationmodels;
