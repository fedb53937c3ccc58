//! Signup lifecycle manager

use muster_api::{
    Activity, ActivityView, Candidate, Notification, NotificationKind, RejectionReason, Signup,
    SignupExportRow, SignupStatus,
};
use muster_store::{
    ActivityDeleteOutcome, AuditEvent, AuditEventType, CounterChange, DeleteOutcome,
    SignupTransition, Store, TransitionOutcome,
};
use muster_util::{ActivityId, Clock, MusterError, Result, SignupId, format_datetime_full};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{AdmissionDecision, NotificationSink, check_admission};

/// Outcome of a signup attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignupDecision {
    Created(Signup),
    Rejected { reason: RejectionReason },
}

/// Owns every write to signups and to the activity participant counter
pub struct SignupManager {
    store: Arc<dyn Store>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
}

impl SignupManager {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
        }
    }

    // Activities

    pub fn get_activity(&self, id: &ActivityId) -> Result<ActivityView> {
        let activity = self
            .store
            .get_activity(id)?
            .ok_or_else(|| MusterError::not_found(format!("activity {}", id)))?;
        Ok(self.view(activity))
    }

    pub fn list_activities(&self) -> Result<Vec<ActivityView>> {
        Ok(self
            .store
            .list_activities()?
            .into_iter()
            .map(|a| self.view(a))
            .collect())
    }

    /// Create or edit an activity. The participant counter is never taken
    /// from the caller.
    pub fn upsert_activity(&self, activity: Activity) -> Result<ActivityView> {
        if activity.id.as_str().trim().is_empty() {
            return Err(MusterError::validation("activity id must not be empty"));
        }
        if activity.title.trim().is_empty() {
            return Err(MusterError::validation("activity title must not be empty"));
        }

        if !self.store.upsert_activity(&activity)? {
            return Err(MusterError::conflict(format!(
                "max_participants {} is below the seats already taken",
                activity.max_participants
            )));
        }

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::ActivitySaved {
            activity_id: activity.id.clone(),
        }));
        info!(activity_id = %activity.id, "Activity saved");

        self.get_activity(&activity.id)
    }

    /// Delete an activity. Refused while any signup still holds a seat.
    pub fn delete_activity(&self, id: &ActivityId) -> Result<()> {
        match self.store.delete_activity(id)? {
            ActivityDeleteOutcome::Deleted => {}
            ActivityDeleteOutcome::NotFound => {
                return Err(MusterError::not_found(format!("activity {}", id)));
            }
            ActivityDeleteOutcome::SeatsHeld(held) => {
                return Err(MusterError::conflict(format!(
                    "activity {} still has {} confirmed participant(s)",
                    id, held
                )));
            }
        }

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::ActivityDeleted {
            activity_id: id.clone(),
        }));
        info!(activity_id = %id, "Activity deleted");
        Ok(())
    }

    fn view(&self, activity: Activity) -> ActivityView {
        let admission_status = activity.admission_status(&self.clock.now());
        ActivityView {
            activity,
            admission_status,
        }
    }

    // Signups

    /// Sign a candidate up for an activity.
    ///
    /// Order: duplicate check, admission gate, conditional insert. A lost
    /// insert race is reported as `AlreadySignedUp`.
    pub fn create_signup(
        &self,
        activity_id: &ActivityId,
        candidate: Candidate,
    ) -> Result<SignupDecision> {
        let candidate = normalize_candidate(candidate)?;
        let activity = self
            .store
            .get_activity(activity_id)?
            .ok_or_else(|| MusterError::not_found(format!("activity {}", activity_id)))?;

        if self
            .store
            .find_active_signup(activity_id, &candidate.student_email)?
            .is_some()
        {
            return Ok(self.reject(activity_id, &candidate, RejectionReason::AlreadySignedUp));
        }

        let now = self.clock.now();
        if let AdmissionDecision::Rejected(reason) =
            check_admission(&activity, &now, candidate.grade.as_deref())
        {
            return Ok(self.reject(activity_id, &candidate, reason));
        }

        let signup = Signup {
            id: SignupId::new(),
            activity_id: activity_id.clone(),
            student_email: candidate.student_email,
            student_name: candidate.student_name,
            student_id: candidate.student_id,
            grade: candidate.grade,
            class_name: candidate.class_name,
            status: SignupStatus::Pending,
            seat_held: false,
            created_at: now,
            updated_at: now,
        };

        if !self.store.insert_signup_if_absent(&signup)? {
            // Someone else got there between the check and the insert
            return match self
                .store
                .find_active_signup(activity_id, &signup.student_email)?
            {
                Some(_) => Ok(SignupDecision::Rejected {
                    reason: RejectionReason::AlreadySignedUp,
                }),
                None => Err(MusterError::conflict(
                    "signup changed concurrently; please retry",
                )),
            };
        }

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::SignupCreated {
            signup_id: signup.id,
            activity_id: signup.activity_id.clone(),
            student_email: signup.student_email.clone(),
        }));

        info!(
            signup_id = %signup.id,
            activity_id = %signup.activity_id,
            "Signup created"
        );

        Ok(SignupDecision::Created(signup))
    }

    fn reject(
        &self,
        activity_id: &ActivityId,
        candidate: &Candidate,
        reason: RejectionReason,
    ) -> SignupDecision {
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::SignupRejected {
            activity_id: activity_id.clone(),
            student_email: candidate.student_email.clone(),
            reason,
        }));

        debug!(
            activity_id = %activity_id,
            email = %candidate.student_email,
            reason = %reason,
            "Signup rejected"
        );

        SignupDecision::Rejected { reason }
    }

    pub fn get_signup(&self, id: &SignupId) -> Result<Signup> {
        self.store
            .get_signup(id)?
            .ok_or_else(|| MusterError::not_found(format!("signup {}", id)))
    }

    /// Oldest first; all activities when `activity_id` is None
    pub fn list_signups(&self, activity_id: Option<&ActivityId>) -> Result<Vec<Signup>> {
        Ok(self.store.list_signups(activity_id)?)
    }

    /// Move a signup to `target`.
    ///
    /// Setting the current status again is a no-op. The status write and
    /// the counter adjustment commit together or not at all.
    pub fn set_status(&self, id: &SignupId, target: SignupStatus) -> Result<Signup> {
        let current = self.get_signup(id)?;

        let Some(transition) = plan_transition(&current, target, self.clock.now())? else {
            debug!(signup_id = %id, status = %target, "Signup already in requested status");
            return Ok(current);
        };

        let updated = match self.store.apply_signup_transition(&transition)? {
            TransitionOutcome::Applied(signup) => signup,
            TransitionOutcome::NotFound => {
                return Err(MusterError::not_found(format!("signup {}", id)));
            }
            TransitionOutcome::Stale { current } => {
                return Err(MusterError::conflict(format!(
                    "signup was changed to {} concurrently",
                    current
                )));
            }
            TransitionOutcome::CapacityFull => return Err(MusterError::CapacityFull),
            TransitionOutcome::ActivityMissing => {
                return Err(MusterError::not_found(format!(
                    "activity {}",
                    current.activity_id
                )));
            }
        };

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::SignupStatusChanged {
                signup_id: updated.id,
                from: current.status,
                to: updated.status,
            }));

        info!(
            signup_id = %updated.id,
            from = %current.status,
            to = %updated.status,
            "Signup status changed"
        );

        if updated.status == SignupStatus::Confirmed {
            self.notify_confirmed(&updated);
        }

        Ok(updated)
    }

    pub fn confirm(&self, id: &SignupId) -> Result<Signup> {
        self.set_status(id, SignupStatus::Confirmed)
    }

    /// Back to pending from confirmed or attended, releasing any held seat
    pub fn revoke(&self, id: &SignupId) -> Result<Signup> {
        self.set_status(id, SignupStatus::Pending)
    }

    pub fn mark_attended(&self, id: &SignupId) -> Result<Signup> {
        self.set_status(id, SignupStatus::Attended)
    }

    pub fn cancel(&self, id: &SignupId) -> Result<Signup> {
        self.set_status(id, SignupStatus::Cancelled)
    }

    /// Delete a pending or cancelled signup. Confirmed and attended signups
    /// must be revoked first.
    pub fn delete_signup(&self, id: &SignupId) -> Result<()> {
        let signup = self.get_signup(id)?;

        match self.store.delete_signup_if_deletable(id)? {
            DeleteOutcome::Deleted => {
                let _ = self.store.append_audit(AuditEvent::new(AuditEventType::SignupDeleted {
                    signup_id: *id,
                    status: signup.status,
                }));
                info!(signup_id = %id, status = %signup.status, "Signup deleted");
                Ok(())
            }
            DeleteOutcome::NotFound => Err(MusterError::not_found(format!("signup {}", id))),
            DeleteOutcome::NotDeletable(status) => {
                Err(MusterError::invalid_transition(status, "deleted"))
            }
        }
    }

    /// Flat projection for spreadsheet export
    pub fn export_signups(&self, activity_id: Option<&ActivityId>) -> Result<Vec<SignupExportRow>> {
        let titles: HashMap<ActivityId, String> = self
            .store
            .list_activities()?
            .into_iter()
            .map(|a| (a.id, a.title))
            .collect();

        Ok(self
            .store
            .list_signups(activity_id)?
            .into_iter()
            .map(|s| SignupExportRow {
                activity_title: titles
                    .get(&s.activity_id)
                    .cloned()
                    .unwrap_or_else(|| s.activity_id.to_string()),
                signed_up_at: format_datetime_full(&s.created_at),
                student_name: s.student_name,
                student_email: s.student_email,
                status: s.status,
            })
            .collect())
    }

    fn notify_confirmed(&self, signup: &Signup) {
        let title = match self.store.get_activity(&signup.activity_id) {
            Ok(Some(activity)) => activity.title,
            _ => signup.activity_id.to_string(),
        };

        let notification = Notification {
            user_id: signup.student_id.to_string(),
            message: format!("Your signup for {} has been confirmed", title),
            title,
            kind: NotificationKind::SignupConfirmed,
            related_id: signup.id.to_string(),
        };

        if let Err(e) = self.notifier.notify(&notification) {
            warn!(signup_id = %signup.id, error = %e, "Failed to deliver notification");
            let _ = self
                .store
                .append_audit(AuditEvent::new(AuditEventType::NotificationFailed {
                    signup_id: signup.id,
                    error: e.to_string(),
                }));
        }
    }
}

/// Work out the guarded store write for `current -> target`.
///
/// Returns `Ok(None)` when `target` is the current status. Cancelled is
/// terminal; attended can only go back to pending or be cancelled.
pub fn plan_transition(
    current: &Signup,
    target: SignupStatus,
    at: chrono::DateTime<chrono::Local>,
) -> Result<Option<SignupTransition>> {
    use SignupStatus::*;

    if current.status == target {
        return Ok(None);
    }

    let allowed = matches!(
        (current.status, target),
        (Pending, Confirmed | Attended | Cancelled)
            | (Confirmed, Pending | Attended | Cancelled)
            | (Attended, Pending | Cancelled)
    );
    if !allowed {
        return Err(MusterError::invalid_transition(current.status, target));
    }

    let new_seat_held = match target {
        Confirmed => true,
        Attended => current.seat_held,
        Pending | Cancelled => false,
    };

    let counter = match (current.seat_held, new_seat_held) {
        (false, true) => CounterChange::Increment,
        (true, false) => CounterChange::Decrement,
        _ => CounterChange::Unchanged,
    };

    Ok(Some(SignupTransition {
        signup_id: current.id,
        expected_status: current.status,
        expected_seat_held: current.seat_held,
        new_status: target,
        new_seat_held,
        counter,
        at,
    }))
}

/// Trim fields, lowercase the email and reject obviously bad input
fn normalize_candidate(candidate: Candidate) -> Result<Candidate> {
    let student_email = candidate.student_email.trim().to_lowercase();
    let student_name = candidate.student_name.trim().to_string();
    let student_id = candidate.student_id.as_str().trim().to_string();

    if student_name.is_empty() {
        return Err(MusterError::validation("student name is required"));
    }
    if student_id.is_empty() {
        return Err(MusterError::validation("student id is required"));
    }
    if !is_plausible_email(&student_email) {
        return Err(MusterError::validation(format!(
            "invalid email address: {}",
            candidate.student_email
        )));
    }

    Ok(Candidate {
        student_email,
        student_name,
        student_id: student_id.into(),
        grade: candidate
            .grade
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty()),
        class_name: candidate.class_name.trim().to_string(),
    })
}

fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.contains(char::is_whitespace)
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}
