//! Attendance types: weekly schedule, eligibility verdicts, records

use chrono::{DateTime, Local, NaiveDate};
use muster_util::{StudentId, WallClock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the two fixed weekly check-in slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SessionSlot {
    First,
    Second,
}

impl SessionSlot {
    pub const ALL: [SessionSlot; 2] = [SessionSlot::First, SessionSlot::Second];

    pub fn number(&self) -> u8 {
        match self {
            SessionSlot::First => 1,
            SessionSlot::Second => 2,
        }
    }
}

impl TryFrom<u8> for SessionSlot {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SessionSlot::First),
            2 => Ok(SessionSlot::Second),
            other => Err(format!("session id must be 1 or 2, got {}", other)),
        }
    }
}

impl From<SessionSlot> for u8 {
    fn from(slot: SessionSlot) -> Self {
        slot.number()
    }
}

impl fmt::Display for SessionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Start and length of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSpec {
    pub start: WallClock,
    pub duration_minutes: u32,
}

impl SessionSpec {
    /// Half-open `[start, end)` in minutes since midnight. `end` saturates
    /// instead of wrapping.
    pub fn minute_range(&self) -> (u32, u32) {
        let start = self.start.minutes_from_midnight();
        (start, start.saturating_add(self.duration_minutes))
    }
}

/// The club's weekly check-in schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceConfig {
    /// 0 = Sunday .. 6 = Saturday
    pub day_of_week: u8,
    pub session1: SessionSpec,
    pub session2: SessionSpec,
    /// Calendar date of week 1
    pub week_start_date: NaiveDate,
    /// Bypasses all temporal gating
    pub debug_mode: bool,
}

impl AttendanceConfig {
    pub fn session(&self, slot: SessionSlot) -> &SessionSpec {
        match slot {
            SessionSlot::First => &self.session1,
            SessionSlot::Second => &self.session2,
        }
    }
}

/// Why check-in is not allowed right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IneligibilityReason {
    BeforeTermStart,
    WrongDay,
    OutsideWindow,
}

impl fmt::Display for IneligibilityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            IneligibilityReason::BeforeTermStart => "term has not started yet",
            IneligibilityReason::WrongDay => "today is not club day",
            IneligibilityReason::OutsideWindow => "outside the check-in window",
        };
        f.write_str(text)
    }
}

/// Verdict of the attendance window calculator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    pub eligible: bool,
    /// Week 1 starts on `week_start_date`; zero or negative before that
    pub week_number: i64,
    pub session: Option<SessionSlot>,
    pub reason: Option<IneligibilityReason>,
}

impl Eligibility {
    pub fn allowed(week_number: i64, session: SessionSlot) -> Self {
        Self {
            eligible: true,
            week_number,
            session: Some(session),
            reason: None,
        }
    }

    pub fn denied(week_number: i64, reason: IneligibilityReason) -> Self {
        Self {
            eligible: false,
            week_number,
            session: None,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Pending,
    Present,
    Late,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Pending => "pending",
            AttendanceStatus::Present => "present",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Absent => "absent",
        }
    }

    /// Present and late both mean the member showed up
    pub fn carries_check_in_time(&self) -> bool {
        matches!(self, AttendanceStatus::Present | AttendanceStatus::Late)
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AttendanceStatus::Pending),
            "present" => Ok(AttendanceStatus::Present),
            "late" => Ok(AttendanceStatus::Late),
            "absent" => Ok(AttendanceStatus::Absent),
            other => Err(format!("unknown attendance status: {}", other)),
        }
    }
}

/// Composite key of an attendance record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttendanceKey {
    pub student_id: StudentId,
    pub week_number: u32,
    pub session: SessionSlot,
}

impl AttendanceKey {
    pub fn new(student_id: impl Into<StudentId>, week_number: u32, session: SessionSlot) -> Self {
        Self {
            student_id: student_id.into(),
            week_number,
            session,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    #[serde(flatten)]
    pub key: AttendanceKey,
    pub status: AttendanceStatus,
    pub check_in_time: Option<DateTime<Local>>,
}

impl AttendanceRecord {
    /// A record nobody has decided on yet
    pub fn pending(key: AttendanceKey) -> Self {
        Self {
            key,
            status: AttendanceStatus::Pending,
            check_in_time: None,
        }
    }
}

/// Per-status counts, always recomputed from records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceStats {
    pub present: usize,
    pub late: usize,
    pub absent: usize,
    pub pending: usize,
}

impl AttendanceStats {
    pub fn total(&self) -> usize {
        self.present + self.late + self.absent + self.pending
    }
}

/// A member expected at club sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterMember {
    pub student_id: StudentId,
    pub name: String,
    #[serde(default)]
    pub class_name: String,
    pub grade: Option<String>,
}

/// Roster of one session joined with its attendance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionAttendance {
    pub week_number: u32,
    pub session: SessionSlot,
    pub rows: Vec<AttendanceRow>,
    pub stats: AttendanceStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRow {
    pub member: RosterMember,
    pub record: AttendanceRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_slot_serializes_as_number() {
        assert_eq!(serde_json::to_string(&SessionSlot::Second).unwrap(), "2");
        let parsed: SessionSlot = serde_json::from_str("1").unwrap();
        assert_eq!(parsed, SessionSlot::First);
        assert!(serde_json::from_str::<SessionSlot>("3").is_err());
    }

    #[test]
    fn minute_range_rolls_over_hours() {
        let spec = SessionSpec {
            start: WallClock::new(15, 50).unwrap(),
            duration_minutes: 20,
        };
        assert_eq!(spec.minute_range(), (950, 970));
    }

    #[test]
    fn test_minute_range_saturates_on_huge_duration() {
        let spec = SessionSpec {
            start: WallClock::new(15, 20).unwrap(),
            duration_minutes: u32::MAX,
        };
        assert_eq!(spec.minute_range(), (920, u32::MAX));
    }

    #[test]
    fn attendance_record_flattens_key() {
        let record = AttendanceRecord::pending(AttendanceKey::new("s1", 3, SessionSlot::Second));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["student_id"], "s1");
        assert_eq!(value["week_number"], 3);
        assert_eq!(value["session"], 2);
        assert_eq!(value["status"], "pending");
        assert!(value["check_in_time"].is_null());
    }
}
