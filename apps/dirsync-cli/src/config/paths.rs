//! Job file location

use std::path::{Path, PathBuf};

/// Environment variable naming the job file.
pub const CONFIG_ENV: &str = "DIRSYNC_CONFIG";

/// Job file used when neither `--config` nor `DIRSYNC_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/dirsync.yaml";

/// Resolve the job file path: `--config`, then `DIRSYNC_CONFIG`, then
/// `./config/dirsync.yaml`.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    resolve_with(explicit, |key| std::env::var(key).ok())
}

pub(crate) fn resolve_with(
    explicit: Option<&Path>,
    lookup: impl Fn(&str) -> Option<String>,
) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match lookup(CONFIG_ENV) {
        Some(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_CONFIG_PATH),
    }
}
