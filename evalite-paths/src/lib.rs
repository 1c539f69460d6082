//! XDG Base Directory paths for evalite.
//!
//! CLI tools should use XDG paths for cross-platform consistency,
//! not platform-native paths.

use std::path::PathBuf;

const APP: &str = "evalite";

fn xdg_dir(var: &str, home_relative: &str) -> PathBuf {
    if let Ok(dir) = std::env::var(var)
        && !dir.is_empty()
    {
        PathBuf::from(dir).join(APP)
    } else if let Some(home) = dirs::home_dir() {
        home.join(home_relative).join(APP)
    } else {
        PathBuf::from(home_relative).join(APP)
    }
}

/// Get the evalite config directory.
///
/// Returns `$XDG_CONFIG_HOME/evalite` if set, otherwise `~/.config/evalite`.
///
/// # Examples
///
/// ```
/// use evalite_paths::config_dir;
///
/// let config = config_dir();
/// let file = config.join("config.toml");
/// ```
pub fn config_dir() -> PathBuf {
    xdg_dir("XDG_CONFIG_HOME", ".config")
}

/// Get the evalite data directory.
///
/// Returns `$XDG_DATA_HOME/evalite` if set, otherwise `~/.local/share/evalite`.
pub fn data_dir() -> PathBuf {
    xdg_dir("XDG_DATA_HOME", ".local/share")
}

/// Default location of the local record store.
pub fn database_path() -> PathBuf {
    data_dir().join("evalite.db")
}
