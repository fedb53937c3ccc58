//! Validated settings

use crate::schema::{RawConfig, RawDaemonConfig};
use crate::validation::{attendance_from_raw, ValidationError};
use muster_api::AttendanceConfig;
use muster_util::{data_dir_without_env, default_log_dir, socket_path_without_env};
use std::path::PathBuf;

/// Validated settings ready for use by the service
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub daemon: DaemonConfig,

    /// Only used when the store holds no schedule yet
    pub attendance: Option<AttendanceConfig>,
}

impl Settings {
    /// Convert from raw config
    pub fn from_raw(raw: RawConfig) -> Result<Self, Vec<ValidationError>> {
        let attendance = raw.attendance.as_ref().map(attendance_from_raw).transpose()?;

        Ok(Self {
            daemon: DaemonConfig::from_raw(raw.daemon),
            attendance,
        })
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub socket_path: PathBuf,
    pub log_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl DaemonConfig {
    fn from_raw(raw: RawDaemonConfig) -> Self {
        Self {
            socket_path: raw.socket_path.unwrap_or_else(socket_path_without_env),
            log_dir: raw.log_dir.unwrap_or_else(default_log_dir),
            data_dir: raw.data_dir.unwrap_or_else(data_dir_without_env),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::from_raw(RawDaemonConfig::default())
    }
}
