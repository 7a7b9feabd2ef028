pub mod badgedb;
pub mod db;
pub mod labourdb;
pub mod memory;
pub mod verificationdb;
