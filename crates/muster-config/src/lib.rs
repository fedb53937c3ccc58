//! Configuration parsing and validation for musterd
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Daemon paths
//! - The initial weekly attendance schedule
//! - Validation with clear error messages

mod schema;
mod settings;
mod validation;

pub use schema::*;
pub use settings::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Settings> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Settings> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Settings::from_raw(raw).map_err(|errors| ConfigError::ValidationFailed { errors })
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CLUB_CONFIG: &str = r#"
        config_version = 1

        [attendance]
        day_of_week = "fri"
        week_start_date = "2026-01-09"
        session1 = { start = "15:20", duration_minutes = 5 }
        session2 = { start = "16:50", duration_minutes = 10 }
    "#;

    #[test]
    fn parse_minimal_config() {
        let settings = parse_config("config_version = 1").unwrap();
        assert!(settings.attendance.is_none());
    }

    #[test]
    fn parse_attendance_section() {
        let settings = parse_config(CLUB_CONFIG).unwrap();
        let attendance = settings.attendance.unwrap();
        assert_eq!(attendance.day_of_week, 5);
        assert_eq!(attendance.session1.start.to_string(), "15:20");
        assert_eq!(attendance.session2.duration_minutes, 10);
        assert!(!attendance.debug_mode);
    }

    #[test]
    fn reject_wrong_version() {
        let result = parse_config("config_version = 99");
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_overlapping_sessions() {
        let config = r#"
            config_version = 1

            [attendance]
            day_of_week = 5
            week_start_date = "2026-01-09"
            session1 = { start = "15:20", duration_minutes = 30 }
            session2 = { start = "15:40", duration_minutes = 10 }
        "#;

        match parse_config(config) {
            Err(ConfigError::ValidationFailed { errors }) => {
                assert!(errors.iter().any(|e| matches!(e, ValidationError::SessionsOverlap)));
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CLUB_CONFIG.as_bytes()).unwrap();

        let settings = load_config(file.path()).unwrap();
        assert!(settings.attendance.is_some());
    }
}
