//! Where stowaway keeps things on disk.
//!
//! The user side follows XDG (`$XDG_CONFIG_HOME/stowaway`) on every platform.
//! The project side is a `.stowaway` directory relative to the working
//! directory, which bundle and config lookups check first.

use std::path::PathBuf;

/// Name of the per-project directory
pub const PROJECT_DIR_NAME: &str = ".stowaway";

/// Overrides [`project_dir`], mostly so tests can isolate themselves
pub const PROJECT_DIR_ENV: &str = "STOWAWAY_PROJECT_CONFIG_DIR";

/// Get the stowaway config directory.
///
/// Returns `$XDG_CONFIG_HOME/stowaway` if set, otherwise `~/.config/stowaway`.
///
/// # Examples
///
/// ```
/// use stowaway_paths::config_dir;
///
/// let config = config_dir();
/// let bundle_dir = config.join("bundles");
/// ```
pub fn config_dir() -> PathBuf {
    match std::env::var_os("XDG_CONFIG_HOME") {
        Some(xdg) if !xdg.is_empty() => PathBuf::from(xdg).join("stowaway"),
        _ => dirs::home_dir()
            .unwrap_or_default()
            .join(".config")
            .join("stowaway"),
    }
}

/// The user bundle directory, `<config_dir>/bundles`. The selection file
/// lives here too.
pub fn bundles_dir() -> PathBuf {
    config_dir().join("bundles")
}

/// The project directory: `$STOWAWAY_PROJECT_CONFIG_DIR` if set, otherwise
/// `.stowaway` under the working directory.
pub fn project_dir() -> PathBuf {
    match std::env::var_os(PROJECT_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(PROJECT_DIR_NAME),
    }
}

/// Bundles that ship with the project, `<project_dir>/bundles`
pub fn project_bundles_dir() -> PathBuf {
    project_dir().join("bundles")
}
