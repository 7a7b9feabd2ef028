use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

/// Source of "now" for every timestamp the workflow writes.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Monday 00:00 UTC of the calendar week containing `at`.
pub fn start_of_week(at: DateTime<Utc>) -> DateTime<Utc> {
    let days_since_monday = at.weekday().num_days_from_monday() as i64;
    let monday = at.date_naive() - Duration::days(days_since_monday);
    let midnight = monday.and_hms_opt(0, 0, 0).unwrap_or_default();
    Utc.from_utc_datetime(&midnight)
}

#[cfg(test)]
pub use manual::ManualClock;
