//! Timestamps, calendar days and the clock abstraction.
//!
//! Timestamps are Unix epoch seconds (UTC). Daily rules (the forfeit sweep)
//! work on calendar days evaluated under a single fixed UTC offset, so every
//! component agrees on what "today" means regardless of the host time zone.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::DuelError;

/// A Unix timestamp in seconds since epoch (UTC).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The epoch (time zero).
    pub const EPOCH: Self = Self(0);

    pub fn new(secs: u64) -> Self {
        Self(secs)
    }

    /// Get the current system time as a `Timestamp`.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Seconds elapsed since this timestamp (relative to `now`).
    pub fn elapsed_since(&self, now: Timestamp) -> u64 {
        now.0.saturating_sub(self.0)
    }

    /// Whether this timestamp + duration has passed relative to `now`.
    pub fn has_expired(&self, duration_secs: u64, now: Timestamp) -> bool {
        now.0 >= self.0.saturating_add(duration_secs)
    }

    pub fn plus_secs(&self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    /// The calendar day this instant falls on under `offset`.
    pub fn calendar_day(&self, offset: FixedOffset) -> CalendarDay {
        let secs = i64::try_from(self.0).unwrap_or(i64::MAX);
        let utc = DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or(DateTime::<Utc>::MAX_UTC);
        CalendarDay(utc.with_timezone(&offset).date_naive())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// A calendar date, already resolved under the configured UTC offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CalendarDay(NaiveDate);

impl CalendarDay {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    pub fn pred(&self) -> Self {
        Self(self.0.pred_opt().unwrap_or(self.0))
    }

    /// Whole days from `earlier` to `self` (negative if `earlier` is later).
    pub fn days_since(&self, earlier: CalendarDay) -> i64 {
        (self.0 - earlier.0).num_days()
    }
}

impl fmt::Display for CalendarDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.0.year(), self.0.month(), self.0.day())
    }
}

/// Build a fixed offset from minutes east of UTC.
pub fn utc_offset(minutes: i32) -> Result<FixedOffset, DuelError> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or(DuelError::InvalidUtcOffset(minutes))
}

/// The next instant strictly after `now` whose wall-clock time under
/// `offset` is `hour:00:00`.
pub fn next_daily_run(now: Timestamp, hour: u32, offset: FixedOffset) -> Timestamp {
    let hour = hour.min(23);
    let today = now.calendar_day(offset).date();
    for day in [today, today + Duration::days(1)] {
        let Some(local) = day.and_hms_opt(hour, 0, 0) else {
            continue;
        };
        if let Some(at) = offset.from_local_datetime(&local).single() {
            let secs = at.timestamp();
            if secs > 0 && secs as u64 > now.as_secs() {
                return Timestamp::new(secs as u64);
            }
        }
    }
    now.plus_secs(24 * 3600)
}

/// Source of the current time.
///
/// Production code uses [`SystemClock`]; tests swap in a controllable clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time from the operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-03-10T23:30:00Z
    const LATE_EVENING_UTC: u64 = 1_710_113_400;

    #[test]
    fn calendar_day_respects_offset() {
        let ts = Timestamp::new(LATE_EVENING_UTC);
        let utc = ts.calendar_day(utc_offset(0).unwrap());
        let plus_one = ts.calendar_day(utc_offset(60).unwrap());
        assert_eq!(utc.to_string(), "2024-03-10");
        assert_eq!(plus_one.to_string(), "2024-03-11");
        assert_eq!(plus_one.days_since(utc), 1);
    }

    #[test]
    fn next_daily_run_is_later_today_or_tomorrow() {
        let offset = utc_offset(0).unwrap();
        let ts = Timestamp::new(LATE_EVENING_UTC);
        let next = next_daily_run(ts, 0, offset);
        // midnight of 2024-03-11
        assert_eq!(next.as_secs(), 1_710_115_200);

        let next_23 = next_daily_run(Timestamp::new(1_710_115_200 - 7200), 23, offset);
        assert_eq!(next_23.as_secs(), 1_710_111_600);
    }

    #[test]
    fn next_daily_run_exactly_at_boundary_moves_a_day() {
        let offset = utc_offset(0).unwrap();
        let midnight = Timestamp::new(1_710_115_200);
        assert_eq!(next_daily_run(midnight, 0, offset).as_secs(), 1_710_115_200 + 86_400);
    }

    #[test]
    fn utc_offset_out_of_range() {
        assert!(utc_offset(24 * 60).is_err());
        assert!(utc_offset(-5 * 60).is_ok());
    }
}
