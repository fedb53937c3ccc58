//! Store trait definitions

use chrono::{DateTime, Local};
use muster_api::{
    Activity, AttendanceConfig, AttendanceKey, AttendanceRecord, Notification, RosterMember,
    SessionSlot, Signup, SignupStatus,
};
use muster_util::{ActivityId, SignupId};

use crate::{AuditEvent, StoreResult};

/// Main store trait
///
/// Every method is atomic on its own. Methods that touch more than one row
/// (`apply_signup_transition`) commit all of their writes or none.
pub trait Store: Send + Sync {
    // Audit log

    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Activities

    fn get_activity(&self, id: &ActivityId) -> StoreResult<Option<Activity>>;

    fn list_activities(&self) -> StoreResult<Vec<Activity>>;

    /// Insert or edit an activity without touching `current_participants`.
    ///
    /// Returns false when the new capacity would sit below the seats
    /// already taken.
    fn upsert_activity(&self, activity: &Activity) -> StoreResult<bool>;

    /// Refused while any of the activity's signups still hold a seat
    fn delete_activity(&self, id: &ActivityId) -> StoreResult<ActivityDeleteOutcome>;

    // Signups

    /// Returns false if a non-cancelled signup for the same
    /// `(activity_id, student_email)` already exists.
    fn insert_signup_if_absent(&self, signup: &Signup) -> StoreResult<bool>;

    fn get_signup(&self, id: &SignupId) -> StoreResult<Option<Signup>>;

    fn find_active_signup(
        &self,
        activity_id: &ActivityId,
        student_email: &str,
    ) -> StoreResult<Option<Signup>>;

    /// Oldest first
    fn list_signups(&self, activity_id: Option<&ActivityId>) -> StoreResult<Vec<Signup>>;

    /// Compare-and-set the signup's status together with the activity counter
    fn apply_signup_transition(
        &self,
        transition: &SignupTransition,
    ) -> StoreResult<TransitionOutcome>;

    /// Delete only from `pending` or `cancelled`
    fn delete_signup_if_deletable(&self, id: &SignupId) -> StoreResult<DeleteOutcome>;

    // Attendance

    fn get_attendance(&self, key: &AttendanceKey) -> StoreResult<Option<AttendanceRecord>>;

    /// Return the record, creating it as `pending` on first touch
    fn ensure_attendance(&self, key: &AttendanceKey) -> StoreResult<AttendanceRecord>;

    fn put_attendance(&self, record: &AttendanceRecord) -> StoreResult<()>;

    /// Set `present`, keeping an existing check-in time and using `at` otherwise
    fn mark_present_preserving_time(
        &self,
        key: &AttendanceKey,
        at: DateTime<Local>,
    ) -> StoreResult<AttendanceRecord>;

    /// Set `absent` if the record is missing or `pending`; returns whether it changed
    fn mark_absent_if_pending(&self, key: &AttendanceKey) -> StoreResult<bool>;

    fn list_attendance(
        &self,
        week_number: u32,
        session: Option<SessionSlot>,
    ) -> StoreResult<Vec<AttendanceRecord>>;

    // Attendance schedule (single well-known row)

    fn load_attendance_config(&self) -> StoreResult<Option<AttendanceConfig>>;

    fn save_attendance_config(&self, config: &AttendanceConfig) -> StoreResult<()>;

    /// Flip `debug_mode` in one statement; `None` when no schedule is stored
    fn toggle_attendance_debug(&self) -> StoreResult<Option<bool>>;

    // Roster

    fn list_roster(&self) -> StoreResult<Vec<RosterMember>>;

    fn replace_roster(&self, members: &[RosterMember]) -> StoreResult<()>;

    // Notifications

    fn append_notification(&self, notification: &Notification) -> StoreResult<()>;

    fn list_notifications(&self, user_id: &str) -> StoreResult<Vec<Notification>>;

    // Health

    fn is_healthy(&self) -> bool;
}

/// How a transition moves the activity's participant counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterChange {
    Unchanged,
    /// +1, refused when the activity is full
    Increment,
    /// -1, never below zero
    Decrement,
}

/// A status write guarded by the state it was planned from
#[derive(Debug, Clone)]
pub struct SignupTransition {
    pub signup_id: SignupId,
    pub expected_status: SignupStatus,
    pub expected_seat_held: bool,
    pub new_status: SignupStatus,
    pub new_seat_held: bool,
    pub counter: CounterChange,
    pub at: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied(Signup),
    NotFound,
    /// Someone else moved the signup first
    Stale { current: SignupStatus },
    CapacityFull,
    /// The referenced activity no longer exists
    ActivityMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityDeleteOutcome {
    Deleted,
    NotFound,
    /// Number of signups still holding a seat
    SeatsHeld(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    NotDeletable(SignupStatus),
}
