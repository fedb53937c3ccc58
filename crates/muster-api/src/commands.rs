//! Command types for the musterd protocol

use chrono::{DateTime, Local};
use muster_util::{ActivityId, ClientId, SignupId, StudentId};
use serde::{Deserialize, Serialize};

use crate::{
    Activity, ActivityView, AttendanceConfig, AttendanceRecord, AttendanceStats,
    AttendanceStatus, Candidate, Eligibility, HealthStatus, RejectionReason, RosterMember,
    SessionAttendance, SessionSlot, Signup, SignupExportRow, SignupStatus, API_VERSION,
};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    pub api_version: u32,
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub request_id: u64,
    pub api_version: u32,
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    ValidationFailed,
    NotFound,
    AlreadySignedUp,
    CapacityFull,
    InvalidTransition,
    Conflict,
    NotConfigured,
    InternalError,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    // Activities

    GetActivity { activity_id: ActivityId },

    ListActivities,

    /// Create or edit an activity; the participant counter is never taken from here
    PutActivity { activity: Activity },

    DeleteActivity { activity_id: ActivityId },

    // Signups

    CreateSignup {
        activity_id: ActivityId,
        candidate: Candidate,
    },

    SetSignupStatus {
        signup_id: SignupId,
        status: SignupStatus,
    },

    DeleteSignup { signup_id: SignupId },

    ListSignups { activity_id: Option<ActivityId> },

    ExportSignups { activity_id: Option<ActivityId> },

    // Attendance configuration

    /// Config plus the eligibility verdict at the current time
    GetAttendanceStatus,

    UpdateAttendanceConfig { config: AttendanceConfig },

    ToggleDebug,

    // Attendance marking

    CheckIn { student_id: StudentId },

    SetAttendance {
        student_id: StudentId,
        week_number: u32,
        session: SessionSlot,
        status: AttendanceStatus,
        /// Admin correction of the recorded time
        #[serde(default)]
        check_in_time: Option<DateTime<Local>>,
    },

    MarkAllPresent {
        week_number: u32,
        session: SessionSlot,
    },

    MarkPendingAbsent {
        week_number: u32,
        session: SessionSlot,
    },

    GetSessionAttendance {
        week_number: u32,
        session: SessionSlot,
    },

    GetWeekSummary { week_number: u32 },

    ReplaceRoster { members: Vec<RosterMember> },

    // Service

    SubscribeEvents,

    UnsubscribeEvents,

    GetHealth,

    Ping,
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    Activity(ActivityView),
    Activities { activities: Vec<ActivityView> },
    ActivityDeleted,
    SignupCreated(Signup),
    SignupRejected { reason: RejectionReason },
    Signup(Signup),
    SignupDeleted,
    Signups { signups: Vec<Signup> },
    Export { rows: Vec<SignupExportRow> },
    AttendanceStatus {
        config: AttendanceConfig,
        eligibility: Eligibility,
        now: DateTime<Local>,
    },
    AttendanceConfig(AttendanceConfig),
    DebugMode { enabled: bool },
    CheckedIn(AttendanceRecord),
    CheckInRefused { eligibility: Eligibility },
    Attendance(AttendanceRecord),
    BulkUpdated { updated: usize },
    SessionAttendance(SessionAttendance),
    WeekSummary {
        week_number: u32,
        stats: AttendanceStats,
    },
    RosterReplaced { members: usize },
    Subscribed { client_id: ClientId },
    Unsubscribed,
    Health(HealthStatus),
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialization() {
        let req = Request::new(
            7,
            Command::MarkPendingAbsent {
                week_number: 2,
                session: SessionSlot::First,
            },
        );
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""type":"mark_pending_absent""#));

        let parsed: Request = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.request_id, 7);
        assert!(matches!(
            parsed.command,
            Command::MarkPendingAbsent { week_number: 2, session: SessionSlot::First }
        ));
    }

    #[test]
    fn set_attendance_time_is_optional() {
        let json = r#"{"type":"set_attendance","student_id":"s1","week_number":1,"session":2,"status":"late"}"#;
        let command: Command = serde_json::from_str(json).unwrap();
        match command {
            Command::SetAttendance { status, check_in_time, session, .. } => {
                assert_eq!(status, AttendanceStatus::Late);
                assert_eq!(session, SessionSlot::Second);
                assert!(check_in_time.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn rejection_response_carries_reason_code() {
        let resp = Response::success(
            1,
            ResponsePayload::SignupRejected {
                reason: RejectionReason::CapacityFull,
            },
        );
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("capacity_full"));
    }
}
