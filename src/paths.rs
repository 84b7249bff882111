//! XDG directory helpers for config/log locations.

use std::path::PathBuf;

const APP_DIR: &str = "mfi-backoffice";

/// Base directory for configuration files.
///
/// Uses `MFI_CONFIG_DIR` if set, otherwise `$XDG_CONFIG_HOME/mfi-backoffice`
/// or `~/.config/mfi-backoffice`.
pub(crate) fn config_dir() -> PathBuf {
    if let Some(dir) = env_dir("MFI_CONFIG_DIR") {
        return dir;
    }
    env_dir("XDG_CONFIG_HOME")
        .or_else(dirs::config_dir)
        .unwrap_or_else(|| home().join(".config"))
        .join(APP_DIR)
}

/// Base directory for persistent data.
///
/// Uses `MFI_DATA_DIR` if set, otherwise `$XDG_DATA_HOME/mfi-backoffice` or
/// `~/.local/share/mfi-backoffice`.
pub(crate) fn data_dir() -> PathBuf {
    if let Some(dir) = env_dir("MFI_DATA_DIR") {
        return dir;
    }
    env_dir("XDG_DATA_HOME")
        .or_else(dirs::data_dir)
        .unwrap_or_else(|| home().join(".local").join("share"))
        .join(APP_DIR)
}

/// Rolling log files.
pub(crate) fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

fn env_dir(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|dir| !dir.trim().is_empty())
        .map(PathBuf::from)
}

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"))
}
