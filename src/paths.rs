//! Centralized path resolution for stackplan
//!
//! # Environment Variables
//!
//! - `STACKPLAN_CONFIG_DIR` - Override config directory
//! - `STACKPLAN_STATE_DIR` - Override state directory (snapshots, locks,
//!   local provider resources)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `STACKPLAN_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/stackplan` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\stackplan`
//!    - macOS/Linux: `~/.config/stackplan`
//!
//! For state_dir():
//! 1. `STACKPLAN_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/stackplan` (if set)
//! 3. Platform default:
//!    - Windows: `%LOCALAPPDATA%\stackplan`
//!    - macOS/Linux: `~/.local/state/stackplan`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "STACKPLAN_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "STACKPLAN_STATE_DIR";

const APP_DIR: &str = "stackplan";

/// Get the stackplan config directory path
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

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            let path = app_data.join(APP_DIR);
            log::debug!("Using Windows config dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join(APP_DIR);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the stackplan state directory path
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

    #[cfg(windows)]
    {
        if let Some(local_app_data) = dirs::data_local_dir() {
            let path = local_app_data.join(APP_DIR);
            log::debug!("Using Windows state dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join(APP_DIR);
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Path of the settings file
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Default snapshot location
pub fn default_state_file() -> Result<PathBuf> {
    Ok(state_dir()?.join("state.json"))
}

/// Default root for the local provider's resource documents
pub fn default_resources_dir() -> Result<PathBuf> {
    Ok(state_dir()?.join("resources"))
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as written.
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
        // SAFETY: Tests run in isolation and don't read env vars concurrently
        unsafe { env::set_var(key, value) };
        let result = f();
        match original {
            // SAFETY: Tests run in isolation
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
        // SAFETY: Tests run in isolation and don't read env vars concurrently
        unsafe { env::remove_var(key) };
        let result = f();
        if let Some(v) = original {
            // SAFETY: Tests run in isolation
            unsafe { env::set_var(key, v) };
        }
        result
    }

    #[test]
    fn test_config_dir_env_override() {
        with_env_var(ENV_CONFIG_DIR, "/custom/stackplan/config", || {
            let result = config_dir().unwrap();
            assert_eq!(result, PathBuf::from("/custom/stackplan/config"));
        });
    }

    #[test]
    fn test_state_dir_env_override_with_tilde() {
        let home = dirs::home_dir().unwrap();
        let expected = home.join("stacks").join("stackplan-tilde-test");
        with_env_var(ENV_STATE_DIR, "~/stacks/stackplan-tilde-test", || {
            let result = state_dir().unwrap();
            assert_eq!(result, expected);
        });
    }

    #[test]
    fn test_xdg_state_home() {
        without_env_var(ENV_STATE_DIR, || {
            with_env_var("XDG_STATE_HOME", "/tmp/xdg-state-stackplan", || {
                let result = state_dir().unwrap();
                assert_eq!(result, PathBuf::from("/tmp/xdg-state-stackplan/stackplan"));
                assert_eq!(
                    default_state_file().unwrap(),
                    PathBuf::from("/tmp/xdg-state-stackplan/stackplan/state.json")
                );
            });
        });
    }

    #[test]
    fn test_expand_with_env_var() {
        with_env_var("STACKPLAN_TEST_VAR", "prod", || {
            let result = expand("/stacks/$STACKPLAN_TEST_VAR/stack.yaml");
            assert_eq!(result, PathBuf::from("/stacks/prod/stack.yaml"));
        });
    }

    #[test]
    fn test_expand_unknown_env_var_unchanged() {
        let result = expand("/path/$NONEXISTENT_STACKPLAN_VAR/file");
        assert_eq!(result, PathBuf::from("/path/$NONEXISTENT_STACKPLAN_VAR/file"));
    }

    #[cfg(unix)]
    #[test]
    fn test_default_state_dir_unix() {
        without_env_var(ENV_STATE_DIR, || {
            without_env_var("XDG_STATE_HOME", || {
                let result = state_dir().unwrap();
                let home = dirs::home_dir().unwrap();
                assert_eq!(result, home.join(".local").join("state").join("stackplan"));
            });
        });
    }
}
