//! Path resolution for fleetform
//!
//! # Environment Variables
//!
//! - `FLEETFORM_CONFIG_DIR` - Override config directory (e.g., `~/dotfiles/fleetform`)
//! - `FLEETFORM_STATE_DIR` - Override state directory (audit log)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `FLEETFORM_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/fleetform` (if set)
//! 3. `~/.config/fleetform`
//!
//! For state_dir():
//! 1. `FLEETFORM_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/fleetform` (if set)
//! 3. `~/.local/state/fleetform`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "FLEETFORM_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "FLEETFORM_STATE_DIR";

const APP_DIR: &str = "fleetform";

/// Config file name inside the config dir
pub const CONFIG_FILE: &str = "fleetform.toml";

/// Audit log name inside the state dir
pub const AUDIT_LOG_FILE: &str = "audit.log";

/// Get the fleetform config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join(APP_DIR);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join(APP_DIR);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the fleetform state directory path
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join(APP_DIR);
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join(APP_DIR);
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Default location of `fleetform.toml`
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// Default location of the audit log
pub fn audit_log() -> Result<PathBuf> {
    Ok(state_dir()?.join(AUDIT_LOG_FILE))
}

/// Expand ~ and environment variables in a path string.
///
/// # Examples
///
/// ```ignore
/// let home_path = paths::expand("~/fleet/lab.toml");
/// let var_path = paths::expand("$HOME/fleet/lab.toml");
/// ```
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// Helper to run a test with temporary env var
    ///
    /// # Safety
    /// This function uses unsafe env::set_var/remove_var which can cause issues
    /// if other threads read environment variables concurrently.
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: each test touches its own variables
        unsafe { env::set_var(key, value) };
        let result = f();
        match original {
            // SAFETY: see above
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    fn without_env_var<F, R>(key: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: each test touches its own variables
        unsafe { env::remove_var(key) };
        let result = f();
        if let Some(v) = original {
            // SAFETY: see above
            unsafe { env::set_var(key, v) };
        }
        result
    }

    #[test]
    fn test_config_dir_env_override() {
        with_env_var(ENV_CONFIG_DIR, "/custom/fleetform/config", || {
            let result = config_dir().unwrap();
            assert_eq!(result, PathBuf::from("/custom/fleetform/config"));
            assert_eq!(
                config_file().unwrap(),
                PathBuf::from("/custom/fleetform/config/fleetform.toml")
            );
        });
    }

    #[test]
    fn test_state_dir_env_override() {
        with_env_var(ENV_STATE_DIR, "/custom/fleetform/state", || {
            assert_eq!(state_dir().unwrap(), PathBuf::from("/custom/fleetform/state"));
            assert_eq!(
                audit_log().unwrap(),
                PathBuf::from("/custom/fleetform/state/audit.log")
            );
        });
    }

    #[test]
    fn test_xdg_state_home() {
        without_env_var(ENV_STATE_DIR, || {
            with_env_var("XDG_STATE_HOME", "/tmp/xdg-state-fleetform", || {
                let result = state_dir().unwrap();
                assert_eq!(result, PathBuf::from("/tmp/xdg-state-fleetform/fleetform"));
            });
        });
    }

    #[test]
    fn test_expand_with_tilde() {
        let result = expand("~/fleet/lab.toml");
        let home = dirs::home_dir().unwrap();
        assert_eq!(result, home.join("fleet").join("lab.toml"));
    }

    #[test]
    fn test_expand_with_env_var() {
        with_env_var("FLEETFORM_TEST_VAR", "lab", || {
            let result = expand("/specs/$FLEETFORM_TEST_VAR.toml");
            assert_eq!(result, PathBuf::from("/specs/lab.toml"));
        });
    }

    #[test]
    fn test_expand_unknown_env_var_unchanged() {
        let result = expand("/path/$NONEXISTENT_FLEETFORM_VAR/file");
        assert_eq!(result, PathBuf::from("/path/$NONEXISTENT_FLEETFORM_VAR/file"));
    }
}
