pub mod verificationdtos;
