//! Relative time strings for summary views ("5 minutes ago").

use chrono::{DateTime, Utc};

pub fn time_since(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - then).num_seconds();

    if seconds < 60 {
        // Includes small negative skews between writer and reader clocks
        return "just now".to_string();
    }

    let (amount, unit) = if seconds < 3_600 {
        (seconds / 60, "minute")
    } else if seconds < 86_400 {
        (seconds / 3_600, "hour")
    } else if seconds < 30 * 86_400 {
        (seconds / 86_400, "day")
    } else if seconds < 365 * 86_400 {
        (seconds / (30 * 86_400), "month")
    } else {
        (seconds / (365 * 86_400), "year")
    };

    if amount == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", amount, unit)
    }
}

pub fn time_since_opt(then: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<String> {
    then.map(|then| time_since(then, now))
}
