// src/core/paths.rs

use crate::constants::{
    CONFIG_DIR, DEFAULT_INSTALL_ROOT, ENV_CONTINUENT_ROOT, GLOBAL_CONFIG_FILENAME,
    USER_DEFAULTS_FILENAME, USER_DIR,
};
use lazy_static::lazy_static;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

lazy_static! {
    static ref USER_CONFIG_DIR: Mutex<Option<PathBuf>> = Mutex::new(None);
}

#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not find the home directory of the current user.")]
    HomeNotFound,
    #[error("Could not expand path '{path}': {reason}")]
    Expansion { path: String, reason: String },
    #[error("Could not determine the working directory: {0}")]
    WorkingDirectory(#[source] std::io::Error),
}

/// Returns the per-user directory (`~/.tungsten`).
///
/// Memoized: the home directory is looked up once per process.
pub fn user_dir() -> Result<PathBuf, PathError> {
    let mut cached = USER_CONFIG_DIR.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(path) = &*cached {
        return Ok(path.clone());
    }
    let path = dirs::home_dir().ok_or(PathError::HomeNotFound)?.join(USER_DIR);
    *cached = Some(path.clone());
    Ok(path)
}

/// The per-user defaults merged underneath every configuration.
pub fn user_defaults_path() -> Result<PathBuf, PathError> {
    user_dir().map(|dir| dir.join(USER_DEFAULTS_FILENAME))
}

/// `$CONTINUENT_ROOT`, or the built-in default install root.
pub fn install_root() -> PathBuf {
    match env::var(ENV_CONTINUENT_ROOT) {
        Ok(root) if !root.trim().is_empty() => PathBuf::from(root),
        _ => PathBuf::from(DEFAULT_INSTALL_ROOT),
    }
}

/// The configuration file used when `--config` is not given:
/// `$CONTINUENT_ROOT/conf/tungsten.cfg` when the variable is set, otherwise
/// `tungsten.cfg` in the working directory.
pub fn default_config_path() -> Result<PathBuf, PathError> {
    match env::var(ENV_CONTINUENT_ROOT) {
        Ok(root) if !root.trim().is_empty() => {
            Ok(Path::new(&root).join(CONFIG_DIR).join(GLOBAL_CONFIG_FILENAME))
        }
        _ => {
            let cwd = env::current_dir().map_err(PathError::WorkingDirectory)?;
            Ok(dunce::simplified(&cwd).join(GLOBAL_CONFIG_FILENAME))
        }
    }
}

/// Expands `~` and environment variables in a user-supplied path.
pub fn expand_path(path: &str) -> Result<PathBuf, PathError> {
    let expanded = shellexpand::full(path).map_err(|e| PathError::Expansion {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    Ok(PathBuf::from(expanded.into_owned()))
}
