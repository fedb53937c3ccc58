//! Time utilities for musterd
//!
//! All configured times are the club's local wall-clock time. Components
//! read "now" through the [`Clock`] trait so tests can pin it.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `MUSTER_MOCK_TIME` environment variable can be set
//! to override the system time for all time-sensitive operations. This is
//! handy for trying check-in windows without waiting for club day.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2026-01-09 15:21:00`)
//!
//! ```bash
//! MUSTER_MOCK_TIME="2026-01-09 15:21:00" musterd
//! ```

use chrono::{DateTime, Datelike, Local, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, OnceLock};

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "MUSTER_MOCK_TIME";

/// Format accepted by `MUSTER_MOCK_TIME`
pub const MOCK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Offset between mock time and real time, fixed at first use so that
/// mock time keeps advancing.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            let mock_time_str = std::env::var(MOCK_TIME_ENV_VAR).ok()?;
            let Ok(naive_dt) = NaiveDateTime::parse_from_str(&mock_time_str, MOCK_TIME_FORMAT)
            else {
                tracing::warn!(
                    mock_time = %mock_time_str,
                    expected_format = MOCK_TIME_FORMAT,
                    "Invalid mock time format"
                );
                return None;
            };
            let Some(mock_dt) = Local.from_local_datetime(&naive_dt).single() else {
                tracing::warn!(
                    mock_time = %mock_time_str,
                    "Failed to convert mock time to local timezone"
                );
                return None;
            };
            let offset = mock_dt.signed_duration_since(chrono::Local::now());
            tracing::info!(
                mock_time = %mock_time_str,
                offset_secs = offset.num_seconds(),
                "Mock time enabled"
            );
            Some(offset)
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current local time, respecting mock time settings in debug builds.
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Format a DateTime with full date and time, as used in exports.
pub fn format_datetime_full(dt: &DateTime<Local>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Weekday index with 0 = Sunday through 6 = Saturday.
pub fn weekday_index(dt: &DateTime<Local>) -> u8 {
    dt.weekday().num_days_from_sunday() as u8
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Clock backed by the system time (and `MUSTER_MOCK_TIME` in debug builds).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    current: Mutex<DateTime<Local>>,
}

impl FixedClock {
    pub fn new(at: DateTime<Local>) -> Self {
        Self {
            current: Mutex::new(at),
        }
    }

    pub fn set(&self, at: DateTime<Local>) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Hour and minute of the local wall clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WallClock {
    pub hour: u8,
    pub minute: u8,
}

impl WallClock {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    pub fn from_naive_time(time: NaiveTime) -> Self {
        Self {
            hour: time.hour() as u8,
            minute: time.minute() as u8,
        }
    }

    pub fn minutes_from_midnight(&self) -> u32 {
        (self.hour as u32) * 60 + self.minute as u32
    }

    pub fn as_seconds_from_midnight(&self) -> u32 {
        self.minutes_from_midnight() * 60
    }
}

impl fmt::Display for WallClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl PartialOrd for WallClock {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WallClock {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.minutes_from_midnight()
            .cmp(&other.minutes_from_midnight())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wall_clock_ordering() {
        let lunch = WallClock::new(12, 0).unwrap();
        let club = WallClock::new(15, 20).unwrap();
        assert!(lunch < club);
        assert_eq!(club.minutes_from_midnight(), 920);
        assert_eq!(club.to_string(), "15:20");
    }

    #[test]
    fn test_wall_clock_rejects_out_of_range() {
        assert!(WallClock::new(24, 0).is_none());
        assert!(WallClock::new(10, 60).is_none());
    }

    #[test]
    fn test_weekday_index_starts_on_sunday() {
        // 2026-01-04 is a Sunday, 2026-01-09 a Friday
        let sunday = Local.with_ymd_and_hms(2026, 1, 4, 12, 0, 0).unwrap();
        let friday = Local.with_ymd_and_hms(2026, 1, 9, 12, 0, 0).unwrap();
        assert_eq!(weekday_index(&sunday), 0);
        assert_eq!(weekday_index(&friday), 5);
    }

    #[test]
    fn test_fixed_clock_moves_only_when_told() {
        let start = Local.with_ymd_and_hms(2026, 1, 9, 15, 20, 0).unwrap();
        let clock = FixedClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(chrono::Duration::minutes(5));
        assert_eq!(clock.now(), start + chrono::Duration::minutes(5));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn test_format_datetime_full() {
        let dt = Local.with_ymd_and_hms(2026, 1, 9, 15, 21, 7).unwrap();
        assert_eq!(format_datetime_full(&dt), "2026-01-09 15:21:07");
    }

    #[test]
    fn test_parse_mock_time_format() {
        assert!(NaiveDateTime::parse_from_str("2026-01-09 15:21:00", MOCK_TIME_FORMAT).is_ok());
        assert!(NaiveDateTime::parse_from_str("2026-01-09T15:21:00", MOCK_TIME_FORMAT).is_err());
        assert!(NaiveDateTime::parse_from_str("15:21:00", MOCK_TIME_FORMAT).is_err());
    }

    #[test]
    fn test_system_clock_returns_plausible_time() {
        let t = SystemClock.now();
        assert!(t.year() >= 2020 && t.year() <= 2100);
    }
}
