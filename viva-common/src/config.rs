//! Configuration file resolution and TOML loading
//!
//! Bootstrap configuration is optional. A missing file is never fatal: the
//! caller falls back to built-in defaults and logs a warning.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable consulted for the configuration file path
pub const CONFIG_ENV_VAR: &str = "VIVA_CONFIG";

/// Configuration file resolution in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. Per-user config file (`<config_dir>/viva/<file_name>`), if it exists
///
/// Returns None when no source names a file; the caller uses defaults.
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    file_name: &str,
) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config file
    let user_config = default_config_path(file_name)?;
    if user_config.exists() {
        Some(user_config)
    } else {
        None
    }
}

/// Platform config location for a Viva configuration file
///
/// `~/.config/viva/<file>` on Linux, `~/Library/Application Support/viva/<file>`
/// on macOS, `%APPDATA%\viva\<file>` on Windows.
pub fn default_config_path(file_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("viva").join(file_name))
}

/// Read and deserialize a TOML file
pub fn load_toml_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let parsed = toml::from_str::<T>(&content)?;
    debug!("Loaded configuration from {}", path.display());
    Ok(parsed)
}

/// Load a TOML file if one resolves, otherwise return `T::default()`
///
/// A file that resolves but cannot be read or parsed is an error: silently
/// ignoring an explicit configuration would hide operator mistakes.
pub fn load_or_default<T: DeserializeOwned + Default>(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    file_name: &str,
) -> Result<T> {
    match resolve_config_path(cli_arg, env_var_name, file_name) {
        Some(path) => load_toml_file(&path),
        None => {
            warn!("No configuration file found for {}, using built-in defaults", file_name);
            Ok(T::default())
        }
    }
}
