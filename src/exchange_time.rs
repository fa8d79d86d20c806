//! Exchange-local time helpers.
//!
//! The core compares wall-clock instants (`Utc::now()`, a trade's
//! `entry_filled_at`, an alert's `received_at`) against configuration
//! expressed in exchange-local hour:minute (`force_exit_hour`, the morning
//! and afternoon trading windows). Every one of those comparisons must run
//! through [`to_exchange_time`] rather than calling `.time()` on a UTC
//! instant directly, or the ladder/admission checks silently shift by the
//! UTC/Eastern offset depending on the season and where the process runs.
//!
//! Bar timestamps from the broker/backtest path are a separate convention:
//! they are minted already expressed in exchange-local wall clock (tests
//! construct them with `Utc.with_ymd_and_hms` at the exchange hour), so the
//! signal engine reads `.time()`/`.date_naive()` off them directly. That
//! series is internal to the backtest/signal walk and never compared against
//! a real `Utc::now()`, so the two conventions never meet.

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::America::New_York;

/// Converts a UTC instant to the wall-clock time of day at the exchange.
pub fn to_exchange_time(at: DateTime<Utc>) -> NaiveTime {
    at.with_timezone(&New_York).time()
}

/// The exchange-local hour, for coarse once-a-day gating (session cleanup).
pub fn exchange_hour(at: DateTime<Utc>) -> u32 {
    use chrono::Timelike;
    at.with_timezone(&New_York).hour()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn converts_utc_afternoon_to_eastern_morning() {
        // 2026-03-02 is EST (UTC-5); 14:30 UTC is 09:30 America/New_York.
        let utc = Utc.with_ymd_and_hms(2026, 3, 2, 14, 30, 0).unwrap();
        assert_eq!(to_exchange_time(utc), NaiveTime::from_hms_opt(9, 30, 0).unwrap());
    }
}
