//! Activity admission gate

use chrono::{DateTime, Local};
use muster_api::{Activity, RejectionReason};

/// Verdict of the admission gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    Admitted,
    Rejected(RejectionReason),
}

impl AdmissionDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, AdmissionDecision::Admitted)
    }
}

/// Decide whether a candidate may sign up for `activity` at `now`.
///
/// Checks run in priority order: deadline, then capacity, then grade.
/// A closed activity is rejected as `DeadlinePassed` even when it is also
/// full. Read-only.
pub fn check_admission(
    activity: &Activity,
    now: &DateTime<Local>,
    candidate_grade: Option<&str>,
) -> AdmissionDecision {
    if deadline_passed(activity, now) {
        return AdmissionDecision::Rejected(RejectionReason::DeadlinePassed);
    }

    if capacity_full(activity) {
        return AdmissionDecision::Rejected(RejectionReason::CapacityFull);
    }

    if !grade_allowed(activity, candidate_grade) {
        return AdmissionDecision::Rejected(RejectionReason::GradeNotAllowed);
    }

    AdmissionDecision::Admitted
}

fn deadline_passed(activity: &Activity, now: &DateTime<Local>) -> bool {
    match activity.signup_deadline {
        Some(deadline) => *now > deadline,
        // No deadline: never closes
        None => false,
    }
}

/// 0 means unlimited
fn capacity_full(activity: &Activity) -> bool {
    activity.max_participants > 0 && activity.current_participants >= activity.max_participants
}

fn grade_allowed(activity: &Activity, candidate_grade: Option<&str>) -> bool {
    if activity.allowed_grades.is_empty() {
        return true;
    }
    candidate_grade.is_some_and(|grade| activity.allowed_grades.contains(grade))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 1, 9, 12, 0, 0).unwrap()
    }

    fn activity() -> Activity {
        Activity::new("chess", "Chess Club")
    }

    #[test]
    fn test_open_activity_admits() {
        assert_eq!(
            check_admission(&activity(), &now(), None),
            AdmissionDecision::Admitted
        );
    }

    #[test]
    fn test_unlimited_capacity_never_full() {
        let mut a = activity();
        a.max_participants = 0;
        for current in [0, 1, 500, u32::MAX] {
            a.current_participants = current;
            assert!(check_admission(&a, &now(), None).is_admitted());
        }
    }

    #[test]
    fn test_deadline_wins_over_capacity_and_grade() {
        let mut a = activity();
        a.signup_deadline = Some(now() - chrono::Duration::minutes(1));
        a.max_participants = 1;
        a.current_participants = 1;
        a.allowed_grades.insert("12".into());

        assert_eq!(
            check_admission(&a, &now(), Some("9")),
            AdmissionDecision::Rejected(RejectionReason::DeadlinePassed)
        );
    }

    #[test]
    fn test_deadline_is_inclusive() {
        let mut a = activity();
        a.signup_deadline = Some(now());
        assert!(check_admission(&a, &now(), None).is_admitted());

        let later = now() + chrono::Duration::seconds(1);
        assert_eq!(
            check_admission(&a, &later, None),
            AdmissionDecision::Rejected(RejectionReason::DeadlinePassed)
        );
    }

    #[test]
    fn test_capacity_before_grade() {
        let mut a = activity();
        a.max_participants = 2;
        a.current_participants = 2;
        a.allowed_grades.insert("12".into());

        assert_eq!(
            check_admission(&a, &now(), Some("9")),
            AdmissionDecision::Rejected(RejectionReason::CapacityFull)
        );
    }

    #[test]
    fn test_grade_restriction() {
        let mut a = activity();
        a.allowed_grades.insert("10".into());
        a.allowed_grades.insert("11".into());

        assert!(check_admission(&a, &now(), Some("10")).is_admitted());
        assert_eq!(
            check_admission(&a, &now(), Some("9")),
            AdmissionDecision::Rejected(RejectionReason::GradeNotAllowed)
        );
        // Unknown grade cannot satisfy a restriction
        assert_eq!(
            check_admission(&a, &now(), None),
            AdmissionDecision::Rejected(RejectionReason::GradeNotAllowed)
        );
    }
}
