//! Default paths for musterd components
//!
//! Paths are user-writable by default (no root required):
//! - Config: `$XDG_CONFIG_HOME/muster/config.toml` or `~/.config/muster/config.toml`
//! - Socket: `$XDG_RUNTIME_DIR/musterd/musterd.sock` or `/tmp/musterd-$USER/musterd.sock`
//! - Data: `$XDG_DATA_HOME/musterd` or `~/.local/share/musterd`
//! - Logs: `$XDG_STATE_HOME/musterd` or `~/.local/state/musterd`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const MUSTER_SOCKET_ENV: &str = "MUSTER_SOCKET";

/// Environment variable for overriding the data directory
pub const MUSTER_DATA_DIR_ENV: &str = "MUSTER_DATA_DIR";

const SOCKET_FILENAME: &str = "musterd.sock";

const APP_DIR: &str = "musterd";

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join("muster").join("config.toml");
    }

    home_dir()
        .map(|home| home.join(".config").join("muster").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("/etc/muster/config.toml"))
}

/// Get the default socket path.
///
/// Order of precedence:
/// 1. `$MUSTER_SOCKET` environment variable (if set)
/// 2. `$XDG_RUNTIME_DIR/musterd/musterd.sock` (if XDG_RUNTIME_DIR is set)
/// 3. `/tmp/musterd-$USER/musterd.sock` (fallback)
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(MUSTER_SOCKET_ENV) {
        return PathBuf::from(path);
    }

    socket_path_without_env()
}

/// Get the socket path without checking the MUSTER_SOCKET env var.
pub fn socket_path_without_env() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Get the default data directory.
///
/// `$MUSTER_DATA_DIR` wins, then `$XDG_DATA_HOME/musterd`, then
/// `~/.local/share/musterd`.
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(MUSTER_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking the MUSTER_DATA_DIR env var.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    home_dir()
        .map(|home| home.join(".local").join("share").join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("/tmp").join(APP_DIR).join("data"))
}

/// Get the default log directory.
pub fn default_log_dir() -> PathBuf {
    if let Ok(state_home) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(state_home).join(APP_DIR);
    }

    home_dir()
        .map(|home| home.join(".local").join("state").join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("/tmp").join(APP_DIR).join("logs"))
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_path_contains_musterd() {
        let path = socket_path_without_env();
        assert!(path.to_string_lossy().contains("musterd"));
        assert!(path.to_string_lossy().ends_with(".sock"));
    }

    #[test]
    fn data_dir_contains_musterd() {
        assert!(data_dir_without_env().to_string_lossy().contains("musterd"));
    }

    #[test]
    fn config_path_is_toml() {
        assert!(default_config_path().to_string_lossy().ends_with("config.toml"));
    }
}
