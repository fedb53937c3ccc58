//! Event types for musterd -> client streaming

use chrono::{DateTime, Local};
use muster_util::{ActivityId, SignupId};
use serde::{Deserialize, Serialize};

use crate::{AttendanceConfig, AttendanceRecord, SessionSlot, SignupStatus, API_VERSION};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: muster_util::now(),
            payload,
        }
    }
}

/// All possible events from the service to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    SignupCreated {
        signup_id: SignupId,
        activity_id: ActivityId,
    },

    SignupStatusChanged {
        signup_id: SignupId,
        activity_id: ActivityId,
        status: SignupStatus,
    },

    SignupDeleted { signup_id: SignupId },

    /// Activity counters moved or the activity was edited
    ActivityChanged { activity_id: ActivityId },

    AttendanceChanged(AttendanceRecord),

    /// A bulk operation touched a whole session
    SessionAttendanceChanged {
        week_number: u32,
        session: SessionSlot,
        updated: usize,
    },

    AttendanceConfigChanged(AttendanceConfig),

    /// Service is shutting down
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization() {
        let event = Event::new(EventPayload::SignupStatusChanged {
            signup_id: SignupId::new(),
            activity_id: ActivityId::new("chess"),
            status: SignupStatus::Confirmed,
        });

        let json = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.api_version, API_VERSION);
        assert!(matches!(
            parsed.payload,
            EventPayload::SignupStatusChanged { status: SignupStatus::Confirmed, .. }
        ));
    }
}
