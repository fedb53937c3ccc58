//! SQLite-based store implementation

use chrono::{DateTime, Local};
use muster_api::{
    Activity, AttendanceConfig, AttendanceKey, AttendanceRecord, AttendanceStatus, Notification,
    RosterMember, SessionSlot, Signup, SignupStatus,
};
use muster_util::{ActivityId, SignupId, StudentId};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{
    ActivityDeleteOutcome, AuditEvent, CounterChange, DeleteOutcome, SignupTransition, Store,
    StoreError, StoreResult, TransitionOutcome,
};

const SIGNUP_COLUMNS: &str = "id, activity_id, student_email, student_name, student_id, grade, \
                              class_name, status, seat_held, created_at, updated_at";

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS activities (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                signup_deadline TEXT,
                max_participants INTEGER NOT NULL DEFAULT 0,
                current_participants INTEGER NOT NULL DEFAULT 0
                    CHECK (current_participants >= 0),
                allowed_grades TEXT NOT NULL DEFAULT '[]'
            );

            CREATE TABLE IF NOT EXISTS signups (
                id TEXT PRIMARY KEY,
                activity_id TEXT NOT NULL,
                student_email TEXT NOT NULL,
                student_name TEXT NOT NULL,
                student_id TEXT NOT NULL,
                grade TEXT,
                class_name TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                seat_held INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- At most one live signup per (activity, email)
            CREATE UNIQUE INDEX IF NOT EXISTS idx_signups_active
                ON signups(activity_id, student_email) WHERE status != 'cancelled';

            CREATE TABLE IF NOT EXISTS attendance (
                student_id TEXT NOT NULL,
                week_number INTEGER NOT NULL,
                session_id INTEGER NOT NULL CHECK (session_id IN (1, 2)),
                status TEXT NOT NULL,
                check_in_time TEXT,
                PRIMARY KEY (student_id, week_number, session_id)
            );

            -- Attendance schedule (single row)
            CREATE TABLE IF NOT EXISTS attendance_config (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                config_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS roster (
                student_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                class_name TEXT NOT NULL DEFAULT '',
                grade TEXT
            );

            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                notification_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_signups_activity ON signups(activity_id);
            CREATE INDEX IF NOT EXISTS idx_attendance_week ON attendance(week_number, session_id);
            CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

fn parse_timestamp(s: &str) -> StoreResult<DateTime<Local>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|e| StoreError::Serialization(format!("bad timestamp '{}': {}", s, e)))
}

fn parse_optional_timestamp(s: Option<String>) -> StoreResult<Option<DateTime<Local>>> {
    s.as_deref().map(parse_timestamp).transpose()
}

/// Signup columns as read, before conversion
struct SignupRow {
    id: String,
    activity_id: String,
    student_email: String,
    student_name: String,
    student_id: String,
    grade: Option<String>,
    class_name: String,
    status: String,
    seat_held: bool,
    created_at: String,
    updated_at: String,
}

impl SignupRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            activity_id: row.get(1)?,
            student_email: row.get(2)?,
            student_name: row.get(3)?,
            student_id: row.get(4)?,
            grade: row.get(5)?,
            class_name: row.get(6)?,
            status: row.get(7)?,
            seat_held: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_signup(self) -> StoreResult<Signup> {
        let id = SignupId::parse(&self.id)
            .ok_or_else(|| StoreError::Serialization(format!("bad signup id '{}'", self.id)))?;
        let status = self
            .status
            .parse::<SignupStatus>()
            .map_err(StoreError::Serialization)?;

        Ok(Signup {
            id,
            activity_id: ActivityId::new(self.activity_id),
            student_email: self.student_email,
            student_name: self.student_name,
            student_id: StudentId::new(self.student_id),
            grade: self.grade,
            class_name: self.class_name,
            status,
            seat_held: self.seat_held,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

/// Activity columns as read, before conversion
struct ActivityRow {
    id: String,
    title: String,
    signup_deadline: Option<String>,
    max_participants: u32,
    current_participants: u32,
    allowed_grades: String,
}

impl ActivityRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            signup_deadline: row.get(2)?,
            max_participants: row.get(3)?,
            current_participants: row.get(4)?,
            allowed_grades: row.get(5)?,
        })
    }

    fn into_activity(self) -> StoreResult<Activity> {
        let allowed_grades: BTreeSet<String> = serde_json::from_str(&self.allowed_grades)?;
        Ok(Activity {
            id: ActivityId::new(self.id),
            title: self.title,
            signup_deadline: parse_optional_timestamp(self.signup_deadline)?,
            max_participants: self.max_participants,
            current_participants: self.current_participants,
            allowed_grades,
        })
    }
}

const ACTIVITY_COLUMNS: &str =
    "id, title, signup_deadline, max_participants, current_participants, allowed_grades";

fn read_attendance(row: &Row<'_>) -> rusqlite::Result<(String, u32, u8, String, Option<String>)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_attendance(
    (student_id, week_number, session_id, status, check_in_time): (
        String,
        u32,
        u8,
        String,
        Option<String>,
    ),
) -> StoreResult<AttendanceRecord> {
    let session = SessionSlot::try_from(session_id).map_err(StoreError::Serialization)?;
    let status = status
        .parse::<AttendanceStatus>()
        .map_err(StoreError::Serialization)?;

    Ok(AttendanceRecord {
        key: AttendanceKey::new(student_id, week_number, session),
        status,
        check_in_time: parse_optional_timestamp(check_in_time)?,
    })
}

fn select_attendance(conn: &Connection, key: &AttendanceKey) -> StoreResult<Option<AttendanceRecord>> {
    let raw = conn
        .query_row(
            "SELECT student_id, week_number, session_id, status, check_in_time
             FROM attendance WHERE student_id = ? AND week_number = ? AND session_id = ?",
            params![key.student_id.as_str(), key.week_number, key.session.number()],
            read_attendance,
        )
        .optional()?;

    raw.map(into_attendance).transpose()
}

fn select_signup(conn: &Connection, id: &SignupId) -> StoreResult<Option<Signup>> {
    let raw = conn
        .query_row(
            &format!("SELECT {} FROM signups WHERE id = ?", SIGNUP_COLUMNS),
            [id.to_string()],
            SignupRow::read,
        )
        .optional()?;

    raw.map(SignupRow::into_signup).transpose()
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl Store for SqliteStore {
    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            events.push(AuditEvent {
                id,
                timestamp: parse_timestamp(&timestamp_str)?,
                event: serde_json::from_str(&event_json)?,
            });
        }

        Ok(events)
    }

    fn get_activity(&self, id: &ActivityId) -> StoreResult<Option<Activity>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!("SELECT {} FROM activities WHERE id = ?", ACTIVITY_COLUMNS),
                [id.as_str()],
                ActivityRow::read,
            )
            .optional()?;

        raw.map(ActivityRow::into_activity).transpose()
    }

    fn list_activities(&self) -> StoreResult<Vec<Activity>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM activities ORDER BY id",
            ACTIVITY_COLUMNS
        ))?;
        let rows = stmt.query_map([], ActivityRow::read)?;

        let mut activities = Vec::new();
        for row in rows {
            activities.push(row?.into_activity()?);
        }
        Ok(activities)
    }

    fn upsert_activity(&self, activity: &Activity) -> StoreResult<bool> {
        let conn = self.conn()?;
        let grades = serde_json::to_string(&activity.allowed_grades)?;

        let changed = conn.execute(
            r#"
            INSERT INTO activities (id, title, signup_deadline, max_participants, allowed_grades)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id)
            DO UPDATE SET
                title = excluded.title,
                signup_deadline = excluded.signup_deadline,
                max_participants = excluded.max_participants,
                allowed_grades = excluded.allowed_grades
            WHERE excluded.max_participants = 0
               OR excluded.max_participants >= activities.current_participants
            "#,
            params![
                activity.id.as_str(),
                activity.title,
                activity.signup_deadline.map(|d| d.to_rfc3339()),
                activity.max_participants,
                grades,
            ],
        )?;

        debug!(activity_id = %activity.id, changed, "Activity upserted");
        Ok(changed > 0)
    }

    fn delete_activity(&self, id: &ActivityId) -> StoreResult<ActivityDeleteOutcome> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            r#"
            DELETE FROM activities
            WHERE id = ?1
              AND NOT EXISTS (
                SELECT 1 FROM signups WHERE activity_id = ?1 AND seat_held = 1
              )
            "#,
            [id.as_str()],
        )?;
        if deleted > 0 {
            return Ok(ActivityDeleteOutcome::Deleted);
        }

        let exists: bool = conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM activities WHERE id = ?)",
            [id.as_str()],
            |row| row.get(0),
        )?;
        if !exists {
            return Ok(ActivityDeleteOutcome::NotFound);
        }

        let held: u32 = conn.query_row(
            "SELECT COUNT(*) FROM signups WHERE activity_id = ? AND seat_held = 1",
            [id.as_str()],
            |row| row.get(0),
        )?;
        Ok(ActivityDeleteOutcome::SeatsHeld(held))
    }

    fn insert_signup_if_absent(&self, signup: &Signup) -> StoreResult<bool> {
        let conn = self.conn()?;

        let result = conn.execute(
            &format!(
                "INSERT INTO signups ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                SIGNUP_COLUMNS
            ),
            params![
                signup.id.to_string(),
                signup.activity_id.as_str(),
                signup.student_email,
                signup.student_name,
                signup.student_id.as_str(),
                signup.grade,
                signup.class_name,
                signup.status.as_str(),
                signup.seat_held,
                signup.created_at.to_rfc3339(),
                signup.updated_at.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => {
                debug!(signup_id = %signup.id, "Signup inserted");
                Ok(true)
            }
            Err(e) if is_constraint_violation(&e) => {
                debug!(
                    activity_id = %signup.activity_id,
                    email = %signup.student_email,
                    "Signup insert lost to an existing signup"
                );
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get_signup(&self, id: &SignupId) -> StoreResult<Option<Signup>> {
        let conn = self.conn()?;
        select_signup(&conn, id)
    }

    fn find_active_signup(
        &self,
        activity_id: &ActivityId,
        student_email: &str,
    ) -> StoreResult<Option<Signup>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {} FROM signups
                     WHERE activity_id = ? AND student_email = ? AND status != 'cancelled'",
                    SIGNUP_COLUMNS
                ),
                params![activity_id.as_str(), student_email],
                SignupRow::read,
            )
            .optional()?;

        raw.map(SignupRow::into_signup).transpose()
    }

    fn list_signups(&self, activity_id: Option<&ActivityId>) -> StoreResult<Vec<Signup>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM signups
             WHERE (?1 IS NULL OR activity_id = ?1)
             ORDER BY created_at, id",
            SIGNUP_COLUMNS
        ))?;
        let rows = stmt.query_map([activity_id.map(|a| a.as_str())], SignupRow::read)?;

        let mut signups = Vec::new();
        for row in rows {
            signups.push(row?.into_signup()?);
        }
        Ok(signups)
    }

    fn apply_signup_transition(
        &self,
        transition: &SignupTransition,
    ) -> StoreResult<TransitionOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let Some(signup) = select_signup(&tx, &transition.signup_id)? else {
            return Ok(TransitionOutcome::NotFound);
        };

        if signup.status != transition.expected_status
            || signup.seat_held != transition.expected_seat_held
        {
            return Ok(TransitionOutcome::Stale {
                current: signup.status,
            });
        }

        match transition.counter {
            CounterChange::Unchanged => {}
            CounterChange::Increment => {
                let changed = tx.execute(
                    "UPDATE activities
                     SET current_participants = current_participants + 1
                     WHERE id = ?
                       AND (max_participants = 0 OR current_participants < max_participants)",
                    [signup.activity_id.as_str()],
                )?;
                if changed == 0 {
                    let exists: Option<i64> = tx
                        .query_row(
                            "SELECT 1 FROM activities WHERE id = ?",
                            [signup.activity_id.as_str()],
                            |row| row.get(0),
                        )
                        .optional()?;
                    // Dropping the transaction rolls back
                    return Ok(match exists {
                        Some(_) => TransitionOutcome::CapacityFull,
                        None => TransitionOutcome::ActivityMissing,
                    });
                }
            }
            CounterChange::Decrement => {
                let changed = tx.execute(
                    "UPDATE activities
                     SET current_participants = current_participants - 1
                     WHERE id = ? AND current_participants > 0",
                    [signup.activity_id.as_str()],
                )?;
                if changed == 0 {
                    warn!(
                        activity_id = %signup.activity_id,
                        signup_id = %signup.id,
                        "Released a seat on a missing or empty activity"
                    );
                }
            }
        }

        tx.execute(
            "UPDATE signups SET status = ?, seat_held = ?, updated_at = ? WHERE id = ?",
            params![
                transition.new_status.as_str(),
                transition.new_seat_held,
                transition.at.to_rfc3339(),
                signup.id.to_string(),
            ],
        )?;
        tx.commit()?;

        debug!(
            signup_id = %signup.id,
            from = %signup.status,
            to = %transition.new_status,
            counter = ?transition.counter,
            "Signup transition committed"
        );

        Ok(TransitionOutcome::Applied(Signup {
            status: transition.new_status,
            seat_held: transition.new_seat_held,
            updated_at: transition.at,
            ..signup
        }))
    }

    fn delete_signup_if_deletable(&self, id: &SignupId) -> StoreResult<DeleteOutcome> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM signups WHERE id = ? AND status IN ('pending', 'cancelled')",
            [id.to_string()],
        )?;
        if deleted > 0 {
            return Ok(DeleteOutcome::Deleted);
        }

        Ok(match select_signup(&conn, id)? {
            Some(signup) => DeleteOutcome::NotDeletable(signup.status),
            None => DeleteOutcome::NotFound,
        })
    }

    fn get_attendance(&self, key: &AttendanceKey) -> StoreResult<Option<AttendanceRecord>> {
        let conn = self.conn()?;
        select_attendance(&conn, key)
    }

    fn ensure_attendance(&self, key: &AttendanceKey) -> StoreResult<AttendanceRecord> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO attendance (student_id, week_number, session_id, status)
             VALUES (?, ?, ?, 'pending')",
            params![key.student_id.as_str(), key.week_number, key.session.number()],
        )?;

        select_attendance(&conn, key)?
            .ok_or_else(|| StoreError::NotFound(format!("attendance for {}", key.student_id)))
    }

    fn put_attendance(&self, record: &AttendanceRecord) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO attendance (student_id, week_number, session_id, status, check_in_time)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(student_id, week_number, session_id)
            DO UPDATE SET status = excluded.status, check_in_time = excluded.check_in_time
            "#,
            params![
                record.key.student_id.as_str(),
                record.key.week_number,
                record.key.session.number(),
                record.status.as_str(),
                record.check_in_time.map(|t| t.to_rfc3339()),
            ],
        )?;

        debug!(
            student_id = %record.key.student_id,
            week = record.key.week_number,
            session = %record.key.session,
            status = %record.status,
            "Attendance written"
        );
        Ok(())
    }

    fn mark_present_preserving_time(
        &self,
        key: &AttendanceKey,
        at: DateTime<Local>,
    ) -> StoreResult<AttendanceRecord> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO attendance (student_id, week_number, session_id, status, check_in_time)
            VALUES (?, ?, ?, 'present', ?)
            ON CONFLICT(student_id, week_number, session_id)
            DO UPDATE SET
                status = 'present',
                check_in_time = COALESCE(attendance.check_in_time, excluded.check_in_time)
            "#,
            params![
                key.student_id.as_str(),
                key.week_number,
                key.session.number(),
                at.to_rfc3339(),
            ],
        )?;

        select_attendance(&conn, key)?
            .ok_or_else(|| StoreError::NotFound(format!("attendance for {}", key.student_id)))
    }

    fn mark_absent_if_pending(&self, key: &AttendanceKey) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            INSERT INTO attendance (student_id, week_number, session_id, status, check_in_time)
            VALUES (?, ?, ?, 'absent', NULL)
            ON CONFLICT(student_id, week_number, session_id)
            DO UPDATE SET status = 'absent', check_in_time = NULL
            WHERE attendance.status = 'pending'
            "#,
            params![key.student_id.as_str(), key.week_number, key.session.number()],
        )?;
        Ok(changed > 0)
    }

    fn list_attendance(
        &self,
        week_number: u32,
        session: Option<SessionSlot>,
    ) -> StoreResult<Vec<AttendanceRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT student_id, week_number, session_id, status, check_in_time
             FROM attendance
             WHERE week_number = ?1 AND (?2 IS NULL OR session_id = ?2)
             ORDER BY session_id, student_id",
        )?;
        let rows = stmt.query_map(
            params![week_number, session.map(|s| s.number())],
            read_attendance,
        )?;

        let mut records = Vec::new();
        for row in rows {
            records.push(into_attendance(row?)?);
        }
        Ok(records)
    }

    fn load_attendance_config(&self) -> StoreResult<Option<AttendanceConfig>> {
        let conn = self.conn()?;

        let json: Option<String> = conn
            .query_row(
                "SELECT config_json FROM attendance_config WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    fn save_attendance_config(&self, config: &AttendanceConfig) -> StoreResult<()> {
        let conn = self.conn()?;
        let json = serde_json::to_string(config)?;

        conn.execute(
            r#"
            INSERT INTO attendance_config (id, config_json)
            VALUES (1, ?)
            ON CONFLICT(id)
            DO UPDATE SET config_json = excluded.config_json
            "#,
            [json],
        )?;

        debug!("Attendance config saved");
        Ok(())
    }

    fn toggle_attendance_debug(&self) -> StoreResult<Option<bool>> {
        let conn = self.conn()?;

        let enabled: Option<bool> = conn
            .query_row(
                r#"
                UPDATE attendance_config
                SET config_json = json_set(
                    config_json,
                    '$.debug_mode',
                    json(CASE json_extract(config_json, '$.debug_mode')
                        WHEN 1 THEN 'false' ELSE 'true' END)
                )
                WHERE id = 1
                RETURNING json_extract(config_json, '$.debug_mode')
                "#,
                [],
                |row| row.get(0),
            )
            .optional()?;

        debug!(?enabled, "Attendance debug mode flipped");
        Ok(enabled)
    }

    fn list_roster(&self) -> StoreResult<Vec<RosterMember>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT student_id, name, class_name, grade FROM roster ORDER BY class_name, student_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RosterMember {
                student_id: StudentId::new(row.get::<_, String>(0)?),
                name: row.get(1)?,
                class_name: row.get(2)?,
                grade: row.get(3)?,
            })
        })?;

        let mut members = Vec::new();
        for row in rows {
            members.push(row?);
        }
        Ok(members)
    }

    fn replace_roster(&self, members: &[RosterMember]) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM roster", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO roster (student_id, name, class_name, grade)
                 VALUES (?, ?, ?, ?)",
            )?;
            for member in members {
                stmt.execute(params![
                    member.student_id.as_str(),
                    member.name,
                    member.class_name,
                    member.grade,
                ])?;
            }
        }
        tx.commit()?;

        debug!(members = members.len(), "Roster replaced");
        Ok(())
    }

    fn append_notification(&self, notification: &Notification) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO notifications (user_id, notification_json, created_at) VALUES (?, ?, ?)",
            params![
                notification.user_id,
                serde_json::to_string(notification)?,
                muster_util::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn list_notifications(&self, user_id: &str) -> StoreResult<Vec<Notification>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT notification_json FROM notifications WHERE user_id = ? ORDER BY id",
        )?;
        let rows = stmt.query_map([user_id], |row| row.get::<_, String>(0))?;

        let mut notifications = Vec::new();
        for row in rows {
            notifications.push(serde_json::from_str(&row?)?);
        }
        Ok(notifications)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
