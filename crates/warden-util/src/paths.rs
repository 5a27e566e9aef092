//! Default paths for wardend components
//!
//! Paths are user-writable by default (no root required):
//! - Socket: `$XDG_RUNTIME_DIR/wardend/wardend.sock` or `/tmp/wardend-$USER/wardend.sock`
//! - Data: `$XDG_DATA_HOME/wardend` or `~/.local/share/wardend`
//! - Logs: `$XDG_STATE_HOME/wardend` or `~/.local/state/wardend`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const WARDEN_SOCKET_ENV: &str = "WARDEN_SOCKET";

/// Environment variable for overriding the data directory
pub const WARDEN_DATA_DIR_ENV: &str = "WARDEN_DATA_DIR";

const SOCKET_FILENAME: &str = "wardend.sock";
const APP_DIR: &str = "wardend";

/// Get the default socket path.
///
/// Order of precedence:
/// 1. `$WARDEN_SOCKET` environment variable (if set)
/// 2. `$XDG_RUNTIME_DIR/wardend/wardend.sock`
/// 3. `/tmp/wardend-$USER/wardend.sock`
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(WARDEN_SOCKET_ENV) {
        return PathBuf::from(path);
    }
    socket_path_without_env()
}

/// Get the socket path without checking the WARDEN_SOCKET env var.
pub fn socket_path_without_env() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Get the default data directory.
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(WARDEN_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }
    data_dir_without_env()
}

/// Get the data directory without checking the WARDEN_DATA_DIR env var.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

/// Get the default configuration file path:
/// `$XDG_CONFIG_HOME/wardend/config.toml` or `~/.config/wardend/config.toml`.
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join("config.toml");
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join("config.toml");
    }

    PathBuf::from("/etc").join(APP_DIR).join("config.toml")
}

/// Get the default log directory.
pub fn default_log_dir() -> PathBuf {
    if let Ok(state_home) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(state_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("state")
            .join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_path_contains_wardend() {
        let path = socket_path_without_env();
        assert!(path.to_string_lossy().contains("wardend"));
        assert!(path.to_string_lossy().contains(".sock"));
    }

    #[test]
    fn data_dir_contains_wardend() {
        let path = data_dir_without_env();
        assert!(path.to_string_lossy().contains("wardend"));
    }

    #[test]
    fn log_dir_contains_wardend() {
        let path = default_log_dir();
        assert!(path.to_string_lossy().contains("wardend"));
    }
}
