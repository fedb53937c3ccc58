//! Activity and signup types

use chrono::{DateTime, Local};
use muster_util::{ActivityId, SignupId, StudentId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A club event that accepts signups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub title: String,
    /// None means the activity never stops taking signups
    pub signup_deadline: Option<DateTime<Local>>,
    /// 0 means unlimited
    pub max_participants: u32,
    /// Seats taken by confirmed signups
    pub current_participants: u32,
    /// Empty means any grade may sign up
    #[serde(default)]
    pub allowed_grades: BTreeSet<String>,
}

impl Activity {
    pub fn new(id: impl Into<ActivityId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            signup_deadline: None,
            max_participants: 0,
            current_participants: 0,
            allowed_grades: BTreeSet::new(),
        }
    }

    /// Derived at read time, never stored.
    pub fn admission_status(&self, now: &DateTime<Local>) -> AdmissionStatus {
        match self.signup_deadline {
            Some(deadline) if *now > deadline => AdmissionStatus::Closed,
            _ => AdmissionStatus::Open,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionStatus {
    Open,
    Closed,
}

/// Activity as returned to clients: stored fields verbatim plus the derived status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityView {
    #[serde(flatten)]
    pub activity: Activity,
    pub admission_status: AdmissionStatus,
}

/// The person asking to sign up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub student_email: String,
    pub student_name: String,
    pub student_id: StudentId,
    pub grade: Option<String>,
    #[serde(default)]
    pub class_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignupStatus {
    Pending,
    Confirmed,
    Attended,
    Cancelled,
}

impl SignupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignupStatus::Pending => "pending",
            SignupStatus::Confirmed => "confirmed",
            SignupStatus::Attended => "attended",
            SignupStatus::Cancelled => "cancelled",
        }
    }

    /// Only these may be deleted outright
    pub fn is_deletable(&self) -> bool {
        matches!(self, SignupStatus::Pending | SignupStatus::Cancelled)
    }
}

impl fmt::Display for SignupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignupStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SignupStatus::Pending),
            "confirmed" => Ok(SignupStatus::Confirmed),
            "attended" => Ok(SignupStatus::Attended),
            "cancelled" => Ok(SignupStatus::Cancelled),
            other => Err(format!("unknown signup status: {}", other)),
        }
    }
}

/// One candidate's enrollment in one activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signup {
    pub id: SignupId,
    pub activity_id: ActivityId,
    pub student_email: String,
    pub student_name: String,
    pub student_id: StudentId,
    pub grade: Option<String>,
    pub class_name: String,
    pub status: SignupStatus,
    /// Whether this signup currently occupies one of the activity's seats
    pub seat_held: bool,
    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
}

/// Why a signup was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RejectionReason {
    AlreadySignedUp,
    DeadlinePassed,
    CapacityFull,
    GradeNotAllowed,
}

impl RejectionReason {
    /// Short label suitable for a status badge
    pub fn label(&self) -> &'static str {
        match self {
            RejectionReason::AlreadySignedUp => "已报名",
            RejectionReason::DeadlinePassed => "已截止",
            RejectionReason::CapacityFull => "已满员",
            RejectionReason::GradeNotAllowed => "年级不符",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RejectionReason::AlreadySignedUp => "already signed up for this activity",
            RejectionReason::DeadlinePassed => "signup deadline has passed",
            RejectionReason::CapacityFull => "activity is full",
            RejectionReason::GradeNotAllowed => "grade is not allowed for this activity",
        };
        f.write_str(text)
    }
}

/// Flat row for spreadsheet export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupExportRow {
    pub student_name: String,
    pub student_email: String,
    pub activity_title: String,
    pub signed_up_at: String,
    pub status: SignupStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    SignupConfirmed,
}

/// Message handed to the notification sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub related_id: String,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub store_ok: bool,
    pub attendance_configured: bool,
}
