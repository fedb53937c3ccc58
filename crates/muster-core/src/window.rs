//! Attendance window calculator
//!
//! Pure functions from a weekly schedule and a timestamp to a check-in
//! verdict. No I/O; never fails.

use chrono::{DateTime, Local, Timelike};
use muster_api::{AttendanceConfig, Eligibility, IneligibilityReason, SessionSlot};
use muster_util::weekday_index;

/// Decide whether check-in is allowed at `now`, and for which week and session.
///
/// In debug mode the day and window checks are skipped. Both sessions share
/// one `day_of_week`, so the session is picked by whose window contains
/// `now`'s time of day, falling back to session 1.
pub fn compute_eligibility(config: &AttendanceConfig, now: &DateTime<Local>) -> Eligibility {
    let days_since_start = days_since_start(config, now);
    let week_number = week_number_for(days_since_start);

    if config.debug_mode {
        let session = session_at(config, now).unwrap_or(SessionSlot::First);
        return Eligibility::allowed(week_number.max(1), session);
    }

    if days_since_start < 0 {
        return Eligibility::denied(week_number, IneligibilityReason::BeforeTermStart);
    }

    if weekday_index(now) != config.day_of_week {
        return Eligibility::denied(week_number, IneligibilityReason::WrongDay);
    }

    match session_at(config, now) {
        Some(session) => Eligibility::allowed(week_number, session),
        None => Eligibility::denied(week_number, IneligibilityReason::OutsideWindow),
    }
}

/// Whole calendar days between `week_start_date` and `now`'s date
pub fn days_since_start(config: &AttendanceConfig, now: &DateTime<Local>) -> i64 {
    (now.date_naive() - config.week_start_date).num_days()
}

/// Week 1 is the seven days starting at `week_start_date`
pub fn week_number_for(days_since_start: i64) -> i64 {
    days_since_start.div_euclid(7) + 1
}

/// The session whose `[start, start + duration)` window contains `now`'s
/// time of day. Session 1 wins if both do.
pub fn session_at(config: &AttendanceConfig, now: &DateTime<Local>) -> Option<SessionSlot> {
    let seconds = now.num_seconds_from_midnight();

    SessionSlot::ALL.into_iter().find(|slot| {
        let (start, end) = config.session(*slot).minute_range();
        (start * 60..end.saturating_mul(60)).contains(&seconds)
    })
}
