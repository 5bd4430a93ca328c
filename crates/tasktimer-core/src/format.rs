//! Presentation helpers for remaining time

use serde::{Deserialize, Serialize};

use crate::models::TimerRecord;

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

/// Render a remaining time using its two most significant units.
///
/// `90061` becomes `"1d 1h"`, `11520` becomes `"3h 12m"`, `309` becomes
/// `"5m 9s"` and `42` stays `"42s"`. Negative input renders as `"Expired"`.
pub fn format_time(seconds: i64) -> String {
    if seconds < 0 {
        return "Expired".to_string();
    }

    let days = seconds / DAY;
    let hours = (seconds % DAY) / HOUR;
    let minutes = (seconds % HOUR) / MINUTE;
    let secs = seconds % MINUTE;

    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl UrgencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrgencyLevel::Low => "low",
            UrgencyLevel::Medium => "medium",
            UrgencyLevel::High => "high",
            UrgencyLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Band the fraction of time left: above 75% is low, above 25% medium,
/// above 10% high, anything else critical. A zero total is critical.
///
/// Low starts above 75% rather than at half the total, so a timer with 60%
/// left already reads as medium (`urgency_level(60, 100) == Medium`).
pub fn urgency_level(remaining: u64, total: u64) -> UrgencyLevel {
    if total == 0 {
        return UrgencyLevel::Critical;
    }

    // Percent of the total still left, compared in integer space.
    let left = u128::from(remaining) * 100;
    let total = u128::from(total);

    if left > total * 75 {
        UrgencyLevel::Low
    } else if left > total * 25 {
        UrgencyLevel::Medium
    } else if left > total * 10 {
        UrgencyLevel::High
    } else {
        UrgencyLevel::Critical
    }
}

/// Display text for a timer's remaining time; expired timers read `"Expired"`.
pub fn format_remaining(timer: &TimerRecord) -> String {
    if timer.is_expired() {
        return format_time(-1);
    }
    format_time(i64::try_from(timer.remaining_time).unwrap_or(i64::MAX))
}

/// Urgency of a timer relative to its original duration.
pub fn timer_urgency(timer: &TimerRecord) -> UrgencyLevel {
    urgency_level(timer.remaining_time, timer.duration)
}
