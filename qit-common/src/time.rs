//! Timestamp and calendar-date utilities

use chrono::{DateTime, NaiveDate, Utc};

/// Days between the spreadsheet epoch (serial day 0 = 1899-12-30) and the Unix epoch
pub const SPREADSHEET_UNIX_OFFSET_DAYS: f64 = 25569.0;

const SECONDS_PER_DAY: f64 = 86400.0;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert a spreadsheet serial day count to a UTC calendar date.
///
/// Returns `None` when the serial is not finite or lands outside the range
/// chrono can represent.
pub fn date_from_spreadsheet_serial(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() {
        return None;
    }
    let seconds = ((serial - SPREADSHEET_UNIX_OFFSET_DAYS) * SECONDS_PER_DAY).round();
    if seconds.abs() >= i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp(seconds as i64, 0).map(|dt| dt.date_naive())
}
