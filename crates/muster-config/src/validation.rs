//! Configuration validation

use crate::schema::{RawAttendance, RawConfig, RawDay, RawSession};
use chrono::NaiveDate;
use muster_api::{AttendanceConfig, SessionSlot, SessionSpec};
use muster_util::WallClock;
use thiserror::Error;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid time format '{value}': {message}")]
    InvalidTimeFormat { value: String, message: String },

    #[error("Invalid day of week: {0}")]
    InvalidDay(String),

    #[error("Invalid date '{value}': {message}")]
    InvalidDate { value: String, message: String },

    #[error("Session {session}: {message}")]
    SessionError { session: SessionSlot, message: String },

    #[error("Session 1 and session 2 windows overlap")]
    SessionsOverlap,
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    match &config.attendance {
        Some(raw) => attendance_from_raw(raw).err().unwrap_or_default(),
        None => Vec::new(),
    }
}

/// Convert the raw attendance section, collecting every problem found
pub fn attendance_from_raw(raw: &RawAttendance) -> Result<AttendanceConfig, Vec<ValidationError>> {
    let mut errors = Vec::new();

    let day = parse_day(&raw.day_of_week)
        .map_err(|e| errors.push(ValidationError::InvalidDay(e)))
        .ok();
    let week_start_date = parse_date(&raw.week_start_date)
        .map_err(|message| {
            errors.push(ValidationError::InvalidDate {
                value: raw.week_start_date.clone(),
                message,
            })
        })
        .ok();
    let session1 = convert_session(&raw.session1, &mut errors);
    let session2 = convert_session(&raw.session2, &mut errors);

    match (day, week_start_date, session1, session2) {
        (Some(day_of_week), Some(week_start_date), Some(session1), Some(session2))
            if errors.is_empty() =>
        {
            let config = AttendanceConfig {
                day_of_week,
                session1,
                session2,
                week_start_date,
                debug_mode: raw.debug_mode,
            };
            let errors = validate_attendance(&config);
            if errors.is_empty() {
                Ok(config)
            } else {
                Err(errors)
            }
        }
        _ => Err(errors),
    }
}

fn convert_session(raw: &RawSession, errors: &mut Vec<ValidationError>) -> Option<SessionSpec> {
    match parse_time(&raw.start) {
        Ok((hour, minute)) => Some(SessionSpec {
            start: WallClock { hour, minute },
            duration_minutes: raw.duration_minutes,
        }),
        Err(message) => {
            errors.push(ValidationError::InvalidTimeFormat {
                value: raw.start.clone(),
                message,
            });
            None
        }
    }
}

/// Semantic checks on a typed schedule.
///
/// Minutes past the hour roll over into the next hour, but a session may
/// not run past midnight and the two sessions may not overlap.
pub fn validate_attendance(config: &AttendanceConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.day_of_week > 6 {
        errors.push(ValidationError::InvalidDay(format!(
            "{} is outside 0-6",
            config.day_of_week
        )));
    }

    for slot in SessionSlot::ALL {
        let spec = config.session(slot);
        if WallClock::new(spec.start.hour, spec.start.minute).is_none() {
            errors.push(ValidationError::SessionError {
                session: slot,
                message: format!(
                    "start {}:{} is not a valid time",
                    spec.start.hour, spec.start.minute
                ),
            });
            continue;
        }
        if spec.duration_minutes == 0 {
            errors.push(ValidationError::SessionError {
                session: slot,
                message: "duration must be at least one minute".into(),
            });
        }
        if spec.duration_minutes > MINUTES_PER_DAY {
            errors.push(ValidationError::SessionError {
                session: slot,
                message: format!("duration {} exceeds one day", spec.duration_minutes),
            });
            continue;
        }
        let (_, end) = spec.minute_range();
        if end > MINUTES_PER_DAY {
            errors.push(ValidationError::SessionError {
                session: slot,
                message: format!("window starting {} runs past midnight", spec.start),
            });
        }
    }

    if errors.is_empty() {
        let (a_start, a_end) = config.session1.minute_range();
        let (b_start, b_end) = config.session2.minute_range();
        if a_start < b_end && b_start < a_end {
            errors.push(ValidationError::SessionsOverlap);
        }
    }

    errors
}

/// Parse HH:MM time format
pub fn parse_time(s: &str) -> Result<(u8, u8), String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 2 {
        return Err("Expected HH:MM format".into());
    }

    let hour: u8 = parts[0]
        .parse()
        .map_err(|_| "Invalid hour".to_string())?;
    let minute: u8 = parts[1]
        .parse()
        .map_err(|_| "Invalid minute".to_string())?;

    if hour >= 24 {
        return Err("Hour must be 0-23".into());
    }
    if minute >= 60 {
        return Err("Minute must be 0-59".into());
    }

    Ok((hour, minute))
}

/// Parse a day of week into 0 (Sunday) .. 6 (Saturday)
pub fn parse_day(day: &RawDay) -> Result<u8, String> {
    match day {
        RawDay::Index(index) if *index <= 6 => Ok(*index),
        RawDay::Index(index) => Err(format!("{} is outside 0-6", index)),
        RawDay::Name(name) => match name.to_lowercase().as_str() {
            "sun" | "sunday" => Ok(0),
            "mon" | "monday" => Ok(1),
            "tue" | "tuesday" => Ok(2),
            "wed" | "wednesday" => Ok(3),
            "thu" | "thursday" => Ok(4),
            "fri" | "friday" => Ok(5),
            "sat" | "saturday" => Ok(6),
            other => Err(format!("Unknown day: {}", other)),
        },
    }
}

/// Parse YYYY-MM-DD
pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(s1: (u8, u8, u32), s2: (u8, u8, u32)) -> AttendanceConfig {
        AttendanceConfig {
            day_of_week: 5,
            session1: SessionSpec {
                start: WallClock {
                    hour: s1.0,
                    minute: s1.1,
                },
                duration_minutes: s1.2,
            },
            session2: SessionSpec {
                start: WallClock {
                    hour: s2.0,
                    minute: s2.1,
                },
                duration_minutes: s2.2,
            },
            week_start_date: NaiveDate::from_ymd_opt(2026, 1, 9).unwrap(),
            debug_mode: false,
        }
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("15:20").unwrap(), (15, 20));
        assert_eq!(parse_time("00:00").unwrap(), (0, 0));
        assert_eq!(parse_time("23:59").unwrap(), (23, 59));

        assert!(parse_time("24:00").is_err());
        assert!(parse_time("12:60").is_err());
        assert!(parse_time("invalid").is_err());
    }

    #[test]
    fn test_parse_day() {
        assert_eq!(parse_day(&RawDay::Name("Fri".into())).unwrap(), 5);
        assert_eq!(parse_day(&RawDay::Name("sunday".into())).unwrap(), 0);
        assert_eq!(parse_day(&RawDay::Index(6)).unwrap(), 6);
        assert!(parse_day(&RawDay::Index(7)).is_err());
        assert!(parse_day(&RawDay::Name("funday".into())).is_err());
    }

    #[test]
    fn test_minutes_roll_into_next_hour() {
        // 15:50 + 20 minutes ends at 16:10 and is fine
        assert!(validate_attendance(&schedule((15, 50, 20), (16, 30, 10))).is_empty());
    }

    #[test]
    fn test_adjacent_sessions_do_not_overlap() {
        assert!(validate_attendance(&schedule((15, 20, 5), (15, 25, 5))).is_empty());
    }

    #[test]
    fn test_overlapping_sessions_are_rejected() {
        let errors = validate_attendance(&schedule((15, 20, 10), (15, 25, 5)));
        assert_eq!(errors, vec![ValidationError::SessionsOverlap]);
    }

    #[test]
    fn test_zero_duration_and_midnight_crossing_are_rejected() {
        let errors = validate_attendance(&schedule((15, 20, 0), (23, 50, 20)));
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| matches!(e, ValidationError::SessionError { .. })));
    }

    #[test]
    fn test_huge_duration_is_rejected() {
        let errors = validate_attendance(&schedule((15, 20, u32::MAX), (16, 50, 5)));
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0],
            ValidationError::SessionError {
                session: SessionSlot::First,
                ..
            }
        ));

        // Just past a day is still refused, exactly a day from midnight is not
        assert!(!validate_attendance(&schedule((0, 0, 24 * 60 + 1), (16, 50, 5))).is_empty());
        assert_eq!(
            validate_attendance(&schedule((0, 0, 24 * 60), (16, 50, 5))),
            vec![ValidationError::SessionsOverlap]
        );
    }

    #[test]
    fn test_raw_errors_are_collected_together() {
        let raw = RawAttendance {
            day_of_week: RawDay::Name("someday".into()),
            session1: RawSession {
                start: "25:00".into(),
                duration_minutes: 5,
            },
            session2: RawSession {
                start: "16:50".into(),
                duration_minutes: 5,
            },
            week_start_date: "2026-13-01".into(),
            debug_mode: false,
        };
        let errors = attendance_from_raw(&raw).unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
