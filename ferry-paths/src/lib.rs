//! XDG Base Directory paths for ferry.
//!
//! The host resolves its default plugin roots and per-plugin data
//! directories from here, so the CLI and embedders agree on locations.

use std::path::PathBuf;

/// Get the ferry config directory.
///
/// Returns `$XDG_CONFIG_HOME/ferry` if set, otherwise `~/.config/ferry`.
/// The default plugin search root lives under it.
///
/// # Examples
///
/// ```
/// use ferry_paths::config_dir;
///
/// let plugin_root = config_dir().join("plugins");
/// ```
pub fn config_dir() -> PathBuf {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config).join("ferry")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".config/ferry")
    } else {
        PathBuf::from(".config/ferry")
    }
}

/// Get the ferry data directory.
///
/// Returns `$XDG_DATA_HOME/ferry` if set, otherwise `~/.local/share/ferry`.
/// Plugins get a private directory below it for migrated state.
pub fn data_dir() -> PathBuf {
    if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg_data).join("ferry")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".local/share/ferry")
    } else {
        PathBuf::from(".local/share/ferry")
    }
}

/// Directory containing the running host executable.
///
/// Searched for plugins when `include_host_dir` is enabled. Returns `None`
/// if the executable path cannot be determined.
pub fn host_install_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
}
