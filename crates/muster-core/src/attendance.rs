//! Attendance marking service

use chrono::{DateTime, Local};
use muster_api::{
    AttendanceConfig, AttendanceKey, AttendanceRecord, AttendanceRow, AttendanceStats,
    AttendanceStatus, Eligibility, RosterMember, SessionAttendance, SessionSlot,
};
use muster_config::validate_attendance;
use muster_store::{AuditEvent, AuditEventType, Store};
use muster_util::{Clock, MusterError, Result, StudentId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::compute_eligibility;

/// Result of a self check-in attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckInOutcome {
    CheckedIn(AttendanceRecord),
    Refused(Eligibility),
}

/// Schedule plus the verdict it gives right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugStatus {
    pub config: AttendanceConfig,
    pub eligibility: Eligibility,
    pub now: DateTime<Local>,
}

/// Manual and bulk attendance transitions, schedule management and stats
pub struct AttendanceService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl AttendanceService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Set one record's status.
    ///
    /// Present and late get `check_in_time`, or the current time when the
    /// caller gives none. Absent and pending clear it.
    pub fn set_status(
        &self,
        key: AttendanceKey,
        status: AttendanceStatus,
        check_in_time: Option<DateTime<Local>>,
    ) -> Result<AttendanceRecord> {
        validate_key(&key)?;

        let check_in_time = if status.carries_check_in_time() {
            Some(check_in_time.unwrap_or_else(|| self.clock.now()))
        } else {
            None
        };

        let record = AttendanceRecord {
            key,
            status,
            check_in_time,
        };
        self.store.put_attendance(&record)?;

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::AttendanceMarked {
            student_id: record.key.student_id.clone(),
            week_number: record.key.week_number,
            session: record.key.session,
            status,
        }));

        info!(
            student_id = %record.key.student_id,
            week = record.key.week_number,
            session = %record.key.session,
            status = %status,
            "Attendance set"
        );

        Ok(record)
    }

    /// Record for `key`, created as pending on first touch
    pub fn get_or_create(&self, key: &AttendanceKey) -> Result<AttendanceRecord> {
        validate_key(key)?;
        Ok(self.store.ensure_attendance(key)?)
    }

    /// Check a member in for whichever session is open right now
    pub fn check_in(&self, student_id: &StudentId) -> Result<CheckInOutcome> {
        if student_id.as_str().trim().is_empty() {
            return Err(MusterError::validation("student id is required"));
        }

        let config = self.get_config()?;
        let now = self.clock.now();
        let eligibility = compute_eligibility(&config, &now);

        let (true, Some(session)) = (eligibility.eligible, eligibility.session) else {
            debug!(
                student_id = %student_id,
                reason = ?eligibility.reason,
                "Check-in refused"
            );
            return Ok(CheckInOutcome::Refused(eligibility));
        };

        let week_number = u32::try_from(eligibility.week_number)
            .map_err(|_| MusterError::internal("eligible check-in with negative week"))?;
        let key = AttendanceKey::new(student_id.clone(), week_number, session);
        let record = self.store.mark_present_preserving_time(&key, now)?;

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::AttendanceMarked {
            student_id: student_id.clone(),
            week_number,
            session,
            status: record.status,
        }));

        info!(
            student_id = %student_id,
            week = week_number,
            session = %session,
            "Checked in"
        );

        Ok(CheckInOutcome::CheckedIn(record))
    }

    /// Mark every roster member present for one session. Existing check-in
    /// times are kept.
    pub fn bulk_mark_all_present(&self, week_number: u32, session: SessionSlot) -> Result<usize> {
        validate_week(week_number)?;

        let roster = self.store.list_roster()?;
        let now = self.clock.now();

        for member in &roster {
            let key = AttendanceKey::new(member.student_id.clone(), week_number, session);
            self.store.mark_present_preserving_time(&key, now)?;
        }

        self.audit_bulk(week_number, session, AttendanceStatus::Present, roster.len());
        Ok(roster.len())
    }

    /// Mark roster members absent where their record is still pending (or
    /// missing). Decided records are left alone.
    pub fn bulk_mark_pending_as_absent(
        &self,
        week_number: u32,
        session: SessionSlot,
    ) -> Result<usize> {
        validate_week(week_number)?;

        let roster = self.store.list_roster()?;
        let mut updated = 0;

        for member in &roster {
            let key = AttendanceKey::new(member.student_id.clone(), week_number, session);
            if self.store.mark_absent_if_pending(&key)? {
                updated += 1;
            }
        }

        self.audit_bulk(week_number, session, AttendanceStatus::Absent, updated);
        Ok(updated)
    }

    fn audit_bulk(
        &self,
        week_number: u32,
        session: SessionSlot,
        marked: AttendanceStatus,
        updated: usize,
    ) {
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::BulkAttendance {
            week_number,
            session,
            marked,
            updated,
        }));

        info!(
            week = week_number,
            session = %session,
            marked = %marked,
            updated,
            "Bulk attendance applied"
        );
    }

    /// One row per roster member; members without a record show as pending
    pub fn session_view(&self, week_number: u32, session: SessionSlot) -> Result<SessionAttendance> {
        validate_week(week_number)?;

        let mut records: HashMap<StudentId, AttendanceRecord> = self
            .store
            .list_attendance(week_number, Some(session))?
            .into_iter()
            .map(|r| (r.key.student_id.clone(), r))
            .collect();

        let rows: Vec<AttendanceRow> = self
            .store
            .list_roster()?
            .into_iter()
            .map(|member| {
                let record = records.remove(&member.student_id).unwrap_or_else(|| {
                    AttendanceRecord::pending(AttendanceKey::new(
                        member.student_id.clone(),
                        week_number,
                        session,
                    ))
                });
                AttendanceRow { member, record }
            })
            .collect();

        let stats = stats(rows.iter().map(|row| &row.record));

        Ok(SessionAttendance {
            week_number,
            session,
            rows,
            stats,
        })
    }

    /// Counts over every stored record of a week, both sessions
    pub fn week_summary(&self, week_number: u32) -> Result<AttendanceStats> {
        validate_week(week_number)?;
        let records = self.store.list_attendance(week_number, None)?;
        Ok(stats(&records))
    }

    // Schedule

    pub fn get_config(&self) -> Result<AttendanceConfig> {
        self.store
            .load_attendance_config()?
            .ok_or_else(|| MusterError::config("attendance schedule is not configured"))
    }

    pub fn update_config(&self, config: AttendanceConfig) -> Result<AttendanceConfig> {
        let errors = validate_attendance(&config);
        if !errors.is_empty() {
            let message = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(MusterError::validation(message));
        }

        self.store.save_attendance_config(&config)?;
        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::AttendanceConfigUpdated));

        info!(
            day_of_week = config.day_of_week,
            session1 = %config.session1.start,
            session2 = %config.session2.start,
            week_start = %config.week_start_date,
            debug_mode = config.debug_mode,
            "Attendance schedule updated"
        );

        Ok(config)
    }

    /// Flip debug mode and return the new value
    pub fn toggle_debug(&self) -> Result<bool> {
        let enabled = self
            .store
            .toggle_attendance_debug()?
            .ok_or_else(|| MusterError::config("attendance schedule is not configured"))?;

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::DebugModeToggled { enabled }));
        info!(enabled, "Attendance debug mode toggled");

        Ok(enabled)
    }

    pub fn debug_status(&self) -> Result<DebugStatus> {
        let config = self.get_config()?;
        let now = self.clock.now();
        let eligibility = compute_eligibility(&config, &now);
        Ok(DebugStatus {
            config,
            eligibility,
            now,
        })
    }

    // Roster

    pub fn roster(&self) -> Result<Vec<RosterMember>> {
        Ok(self.store.list_roster()?)
    }

    /// Replace the whole roster
    pub fn replace_roster(&self, members: Vec<RosterMember>) -> Result<usize> {
        let mut seen = HashSet::new();
        for member in &members {
            if member.student_id.as_str().trim().is_empty() {
                return Err(MusterError::validation("roster member without student id"));
            }
            if !seen.insert(&member.student_id) {
                return Err(MusterError::validation(format!(
                    "student {} listed twice",
                    member.student_id
                )));
            }
        }

        self.store.replace_roster(&members)?;
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::RosterReplaced {
            members: members.len(),
        }));
        info!(members = members.len(), "Roster replaced");

        Ok(members.len())
    }
}

/// Count records by status
pub fn stats<'a>(records: impl IntoIterator<Item = &'a AttendanceRecord>) -> AttendanceStats {
    records
        .into_iter()
        .fold(AttendanceStats::default(), |mut acc, record| {
            match record.status {
                AttendanceStatus::Present => acc.present += 1,
                AttendanceStatus::Late => acc.late += 1,
                AttendanceStatus::Absent => acc.absent += 1,
                AttendanceStatus::Pending => acc.pending += 1,
            }
            acc
        })
}

fn validate_week(week_number: u32) -> Result<()> {
    if week_number == 0 {
        return Err(MusterError::validation("week numbers start at 1"));
    }
    Ok(())
}

fn validate_key(key: &AttendanceKey) -> Result<()> {
    if key.student_id.as_str().trim().is_empty() {
        return Err(MusterError::validation("student id is required"));
    }
    validate_week(key.week_number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use muster_api::{IneligibilityReason, SessionSpec};
    use muster_store::SqliteStore;
    use muster_util::{FixedClock, WallClock};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn schedule() -> AttendanceConfig {
        AttendanceConfig {
            day_of_week: 5,
            session1: SessionSpec {
                start: WallClock::new(15, 20).unwrap(),
                duration_minutes: 5,
            },
            session2: SessionSpec {
                start: WallClock::new(16, 50).unwrap(),
                duration_minutes: 5,
            },
            week_start_date: NaiveDate::from_ymd_opt(2026, 1, 9).unwrap(),
            debug_mode: false,
        }
    }

    fn member(id: &str) -> RosterMember {
        RosterMember {
            student_id: id.into(),
            name: format!("Member {}", id),
            class_name: "10-2".into(),
            grade: Some("10".into()),
        }
    }

    fn service_at(now: DateTime<Local>) -> (AttendanceService, Arc<FixedClock>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let clock = Arc::new(FixedClock::new(now));
        let service = AttendanceService::new(store, clock.clone());
        service.update_config(schedule()).unwrap();
        service
            .replace_roster(vec![member("s1"), member("s2"), member("s3")])
            .unwrap();
        (service, clock)
    }

    fn key(id: &str) -> AttendanceKey {
        AttendanceKey::new(id, 1, SessionSlot::First)
    }

    #[test]
    fn test_present_stamps_now_unless_given() {
        let (service, _) = service_at(at(2026, 1, 9, 15, 22));

        let record = service
            .set_status(key("s1"), AttendanceStatus::Present, None)
            .unwrap();
        assert_eq!(record.check_in_time, Some(at(2026, 1, 9, 15, 22)));

        let corrected = service
            .set_status(key("s2"), AttendanceStatus::Late, Some(at(2026, 1, 9, 15, 40)))
            .unwrap();
        assert_eq!(corrected.check_in_time, Some(at(2026, 1, 9, 15, 40)));
    }

    #[test]
    fn test_absent_then_pending_clears_time() {
        let (service, _) = service_at(at(2026, 1, 9, 15, 22));

        service
            .set_status(key("s1"), AttendanceStatus::Present, None)
            .unwrap();
        let absent = service
            .set_status(key("s1"), AttendanceStatus::Absent, None)
            .unwrap();
        assert!(absent.check_in_time.is_none());

        let pending = service
            .set_status(key("s1"), AttendanceStatus::Pending, None)
            .unwrap();
        assert_eq!(pending.status, AttendanceStatus::Pending);
        assert!(pending.check_in_time.is_none());
        assert_eq!(service.get_or_create(&key("s1")).unwrap(), pending);
    }

    #[test]
    fn test_week_zero_is_rejected() {
        let (service, _) = service_at(at(2026, 1, 9, 15, 22));
        let err = service
            .set_status(
                AttendanceKey::new("s1", 0, SessionSlot::First),
                AttendanceStatus::Present,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, MusterError::ValidationError(_)));
    }

    #[test]
    fn test_check_in_inside_window() {
        let (service, clock) = service_at(at(2026, 1, 16, 15, 21));

        let outcome = service.check_in(&"s1".into()).unwrap();
        let CheckInOutcome::CheckedIn(record) = outcome else {
            panic!("expected check-in, got {:?}", outcome);
        };
        assert_eq!(record.key, AttendanceKey::new("s1", 2, SessionSlot::First));
        assert_eq!(record.status, AttendanceStatus::Present);

        // Checking in again keeps the first time
        clock.set(at(2026, 1, 16, 15, 24));
        let CheckInOutcome::CheckedIn(again) = service.check_in(&"s1".into()).unwrap() else {
            panic!("expected check-in");
        };
        assert_eq!(again.check_in_time, Some(at(2026, 1, 16, 15, 21)));
    }

    #[test]
    fn test_check_in_refused_outside_window() {
        let (service, _) = service_at(at(2026, 1, 16, 15, 25));

        let outcome = service.check_in(&"s1".into()).unwrap();
        let CheckInOutcome::Refused(eligibility) = outcome else {
            panic!("expected refusal, got {:?}", outcome);
        };
        assert_eq!(eligibility.reason, Some(IneligibilityReason::OutsideWindow));
        assert!(service.session_view(2, SessionSlot::First).unwrap().rows[0]
            .record
            .check_in_time
            .is_none());
    }

    #[test]
    fn test_check_in_without_schedule() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let service = AttendanceService::new(store, Arc::new(FixedClock::new(at(2026, 1, 9, 15, 21))));

        assert!(matches!(
            service.check_in(&"s1".into()),
            Err(MusterError::ConfigError(_))
        ));
    }

    #[test]
    fn test_bulk_present_preserves_self_check_in() {
        let (service, clock) = service_at(at(2026, 1, 9, 15, 21));
        service.check_in(&"s1".into()).unwrap();

        clock.set(at(2026, 1, 9, 15, 45));
        assert_eq!(service.bulk_mark_all_present(1, SessionSlot::First).unwrap(), 3);

        let view = service.session_view(1, SessionSlot::First).unwrap();
        let times: Vec<_> = view.rows.iter().map(|r| r.record.check_in_time).collect();
        assert_eq!(
            times,
            vec![
                Some(at(2026, 1, 9, 15, 21)),
                Some(at(2026, 1, 9, 15, 45)),
                Some(at(2026, 1, 9, 15, 45)),
            ]
        );
        assert_eq!(view.stats.present, 3);
    }

    #[test]
    fn test_bulk_absent_only_touches_pending_and_is_idempotent() {
        let (service, _) = service_at(at(2026, 1, 9, 15, 21));
        service
            .set_status(key("s1"), AttendanceStatus::Late, None)
            .unwrap();
        service.get_or_create(&key("s2")).unwrap();

        // s2 pending, s3 missing
        assert_eq!(service.bulk_mark_pending_as_absent(1, SessionSlot::First).unwrap(), 2);
        let first = service.session_view(1, SessionSlot::First).unwrap();

        assert_eq!(service.bulk_mark_pending_as_absent(1, SessionSlot::First).unwrap(), 0);
        let second = service.session_view(1, SessionSlot::First).unwrap();

        let statuses = |view: &SessionAttendance| {
            view.rows
                .iter()
                .map(|r| (r.record.status, r.record.check_in_time))
                .collect::<Vec<_>>()
        };
        assert_eq!(statuses(&first), statuses(&second));
        assert_eq!(first.stats.late, 1);
        assert_eq!(first.stats.absent, 2);
    }

    #[test]
    fn test_session_view_materializes_pending_rows() {
        let (service, _) = service_at(at(2026, 1, 9, 15, 21));
        service
            .set_status(key("s2"), AttendanceStatus::Present, None)
            .unwrap();

        let view = service.session_view(1, SessionSlot::First).unwrap();
        assert_eq!(view.rows.len(), 3);
        assert_eq!(
            view.stats,
            AttendanceStats {
                present: 1,
                late: 0,
                absent: 0,
                pending: 2,
            }
        );
        // Not persisted
        assert_eq!(service.week_summary(1).unwrap().total(), 1);
    }

    #[test]
    fn test_week_summary_spans_both_sessions() {
        let (service, _) = service_at(at(2026, 1, 9, 15, 21));
        service
            .set_status(key("s1"), AttendanceStatus::Present, None)
            .unwrap();
        service
            .set_status(
                AttendanceKey::new("s1", 1, SessionSlot::Second),
                AttendanceStatus::Absent,
                None,
            )
            .unwrap();
        service
            .set_status(
                AttendanceKey::new("s1", 2, SessionSlot::First),
                AttendanceStatus::Late,
                None,
            )
            .unwrap();

        let summary = service.week_summary(1).unwrap();
        assert_eq!(summary.present, 1);
        assert_eq!(summary.absent, 1);
        assert_eq!(summary.late, 0);
    }

    #[test]
    fn test_update_config_rejects_overlap() {
        let (service, _) = service_at(at(2026, 1, 9, 15, 21));
        let mut bad = schedule();
        bad.session2.start = WallClock::new(15, 22).unwrap();

        let err = service.update_config(bad).unwrap_err();
        assert!(matches!(err, MusterError::ValidationError(_)));
        assert_eq!(service.get_config().unwrap(), schedule());
    }

    #[test]
    fn test_update_config_rejects_huge_duration() {
        let (service, _) = service_at(at(2026, 1, 9, 15, 21));
        let mut bad = schedule();
        bad.session1.duration_minutes = u32::MAX;

        let err = service.update_config(bad).unwrap_err();
        assert!(matches!(err, MusterError::ValidationError(_)));
        assert_eq!(service.get_config().unwrap(), schedule());
    }

    #[test]
    fn test_concurrent_toggles_are_not_lost() {
        let (service, _) = service_at(at(2026, 1, 9, 15, 21));
        let barrier = std::sync::Barrier::new(8);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    barrier.wait();
                    service.toggle_debug().unwrap();
                });
            }
        });

        // An even number of flips lands back where it started
        assert!(!service.get_config().unwrap().debug_mode);
        service.toggle_debug().unwrap();
        assert!(service.get_config().unwrap().debug_mode);
    }

    #[test]
    fn test_toggle_debug_without_schedule() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let clock = Arc::new(FixedClock::new(at(2026, 1, 9, 15, 21)));
        let service = AttendanceService::new(store, clock);
        assert!(matches!(
            service.toggle_debug().unwrap_err(),
            MusterError::ConfigError(_)
        ));
    }

    #[test]
    fn test_toggle_debug_opens_check_in() {
        // Tuesday 3 AM
        let (service, _) = service_at(at(2026, 3, 3, 3, 0));
        assert!(!service.debug_status().unwrap().eligibility.eligible);

        assert!(service.toggle_debug().unwrap());
        let status = service.debug_status().unwrap();
        assert!(status.config.debug_mode);
        assert!(status.eligibility.eligible);
        assert!(matches!(
            service.check_in(&"s1".into()).unwrap(),
            CheckInOutcome::CheckedIn(_)
        ));

        assert!(!service.toggle_debug().unwrap());
    }

    #[test]
    fn test_schedule_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("muster.db");
        let clock = Arc::new(FixedClock::new(at(2026, 1, 9, 15, 21)));

        {
            let store = Arc::new(SqliteStore::open(&path).unwrap());
            let service = AttendanceService::new(store, clock.clone());
            service.update_config(schedule()).unwrap();
            service.toggle_debug().unwrap();
        }

        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let service = AttendanceService::new(store, clock);
        assert!(service.get_config().unwrap().debug_mode);
    }

    #[test]
    fn test_replace_roster_rejects_duplicates() {
        let (service, _) = service_at(at(2026, 1, 9, 15, 21));
        let err = service
            .replace_roster(vec![member("s1"), member("s1")])
            .unwrap_err();
        assert!(matches!(err, MusterError::ValidationError(_)));
        assert_eq!(service.roster().unwrap().len(), 3);
    }

    #[test]
    fn test_stats_fold() {
        let records = [
            AttendanceStatus::Present,
            AttendanceStatus::Present,
            AttendanceStatus::Late,
            AttendanceStatus::Pending,
        ]
        .into_iter()
        .enumerate()
        .map(|(i, status)| AttendanceRecord {
            key: AttendanceKey::new(format!("s{}", i), 1, SessionSlot::First),
            status,
            check_in_time: None,
        })
        .collect::<Vec<_>>();

        let s = stats(&records);
        assert_eq!((s.present, s.late, s.absent, s.pending), (2, 1, 0, 1));
        assert_eq!(s.total(), 4);
    }
}
