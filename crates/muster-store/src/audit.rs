//! Audit event types

use chrono::{DateTime, Local};
use muster_api::{AttendanceStatus, RejectionReason, SessionSlot, SignupStatus};
use muster_util::{ActivityId, SignupId, StudentId};
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    ServiceStarted,

    ServiceStopped,

    ActivitySaved { activity_id: ActivityId },

    ActivityDeleted { activity_id: ActivityId },

    SignupCreated {
        signup_id: SignupId,
        activity_id: ActivityId,
        student_email: String,
    },

    SignupRejected {
        activity_id: ActivityId,
        student_email: String,
        reason: RejectionReason,
    },

    SignupStatusChanged {
        signup_id: SignupId,
        from: SignupStatus,
        to: SignupStatus,
    },

    SignupDeleted {
        signup_id: SignupId,
        status: SignupStatus,
    },

    /// Delivery failed; the transition itself stood
    NotificationFailed { signup_id: SignupId, error: String },

    AttendanceMarked {
        student_id: StudentId,
        week_number: u32,
        session: SessionSlot,
        status: AttendanceStatus,
    },

    BulkAttendance {
        week_number: u32,
        session: SessionSlot,
        marked: AttendanceStatus,
        updated: usize,
    },

    AttendanceConfigUpdated,

    DebugModeToggled { enabled: bool },

    RosterReplaced { members: usize },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Set by the store
    pub id: i64,

    pub timestamp: DateTime<Local>,

    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0,
            timestamp: muster_util::now(),
            event,
        }
    }
}
