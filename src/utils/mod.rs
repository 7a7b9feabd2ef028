pub mod clock;
pub mod geo;
pub mod time_ago;
