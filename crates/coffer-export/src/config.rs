//! Export configuration.

use chrono::{DateTime, Utc};

/// Configuration for exports.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Archive names are `<file_prefix>_<yyyyMMddHHmmss>.zip`.
    pub file_prefix: String,
    /// Directory under the cache dir where attachments are staged.
    pub staging_subdir: String,
    /// Attachments downloaded at the same time.
    pub attachment_concurrency: usize,
    /// Broadcast buffer per export.
    pub capacity: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            file_prefix: "coffer_export".to_string(),
            staging_subdir: "export_cache".to_string(),
            attachment_concurrency: 4,
            capacity: coffer_pool::PoolConfig::default().capacity,
        }
    }
}

impl ExportConfig {
    /// Archive name for an export started at `now`.
    #[must_use]
    pub fn file_name(&self, now: DateTime<Utc>) -> String {
        format!("{}_{}.zip", self.file_prefix, now.format("%Y%m%d%H%M%S"))
    }
}
