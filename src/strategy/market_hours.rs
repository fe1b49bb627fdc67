//! Retail FX trading week: Sunday 21:00 UTC to Friday 22:00 UTC

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};

const SUNDAY_OPEN_HOUR: u32 = 21;
const FRIDAY_CLOSE_HOUR: u32 = 22;

/// Whether the FX market is open at `now`
pub fn is_market_open(now: DateTime<Utc>) -> bool {
    let hour = now.hour();
    match now.weekday() {
        Weekday::Sat => false,
        Weekday::Sun => hour >= SUNDAY_OPEN_HOUR,
        Weekday::Fri => hour < FRIDAY_CLOSE_HOUR,
        _ => true,
    }
}
