//! Download configuration and default locations.

use directories::ProjectDirs;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a single download.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Interval between progress events while bytes are flowing. The first
    /// event fires after half an interval.
    pub poll_interval: Duration,
    /// Directory under the cache dir where partial downloads are staged.
    pub cache_subdir: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            cache_subdir: "download_cache".to_string(),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("rs", "coffer", "coffer")
}

fn home_fallback(leaf: &str) -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".coffer").join(leaf))
}

/// Returns the platform cache directory, falling back to `$HOME/.coffer/cache`.
#[must_use]
pub fn default_cache_dir() -> Option<PathBuf> {
    project_dirs()
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .or_else(|| home_fallback("cache"))
}

/// Returns the platform data directory for finished downloads, falling back to
/// `$HOME/.coffer/downloads`.
#[must_use]
pub fn default_downloads_dir() -> Option<PathBuf> {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("downloads"))
        .or_else(|| home_fallback("downloads"))
}
