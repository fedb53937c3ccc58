//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    #[serde(default)]
    pub daemon: RawDaemonConfig,

    /// Seeds the stored schedule the first time the service starts
    #[serde(default)]
    pub attendance: Option<RawAttendance>,
}

/// Daemon-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDaemonConfig {
    pub socket_path: Option<PathBuf>,

    pub log_dir: Option<PathBuf>,

    /// Data directory for the store
    pub data_dir: Option<PathBuf>,
}

/// Weekly attendance schedule
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawAttendance {
    /// 0-6 (Sunday first) or a day name like "fri"
    pub day_of_week: RawDay,

    pub session1: RawSession,

    pub session2: RawSession,

    /// YYYY-MM-DD
    pub week_start_date: String,

    #[serde(default)]
    pub debug_mode: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawDay {
    Index(u8),
    Name(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawSession {
    /// HH:MM
    pub start: String,

    pub duration_minutes: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_day_as_number_or_name() {
        let by_index: RawAttendance = toml::from_str(
            r#"
            day_of_week = 2
            week_start_date = "2026-01-06"
            session1 = { start = "15:20", duration_minutes = 5 }
            session2 = { start = "16:50", duration_minutes = 5 }
            "#,
        )
        .unwrap();
        assert!(matches!(by_index.day_of_week, RawDay::Index(2)));

        let by_name: RawAttendance = toml::from_str(
            r#"
            day_of_week = "tuesday"
            week_start_date = "2026-01-06"
            session1 = { start = "15:20", duration_minutes = 5 }
            session2 = { start = "16:50", duration_minutes = 5 }
            debug_mode = true
            "#,
        )
        .unwrap();
        assert!(matches!(by_name.day_of_week, RawDay::Name(ref n) if n == "tuesday"));
        assert!(by_name.debug_mode);
    }
}
