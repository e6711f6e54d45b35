//! Staging area for partially downloaded files.

use crate::default_cache_dir;
use coffer_types::JobError;
use std::fmt;
use std::path::{Path, PathBuf};

/// Resolves the directory partial downloads are staged in.
pub trait CacheDirProvider: fmt::Debug + Send + Sync {
    /// Returns the cache directory.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::CacheResolution`] if no directory is available.
    fn cache_dir(&self) -> Result<PathBuf, JobError>;
}

/// Always resolves to the same directory.
#[derive(Debug, Clone)]
pub struct FixedCacheDir(PathBuf);

impl FixedCacheDir {
    /// Creates a provider for `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self(dir.into())
    }
}

impl CacheDirProvider for FixedCacheDir {
    fn cache_dir(&self) -> Result<PathBuf, JobError> {
        Ok(self.0.clone())
    }
}

/// Resolves the platform cache directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformCacheDir;

impl CacheDirProvider for PlatformCacheDir {
    fn cache_dir(&self) -> Result<PathBuf, JobError> {
        default_cache_dir().ok_or_else(|| {
            JobError::CacheResolution("no home directory to place the cache in".to_string())
        })
    }
}

/// A uniquely named staging file that is deleted when dropped.
#[derive(Debug)]
pub(crate) struct CacheFile {
    path: PathBuf,
}

impl CacheFile {
    /// Reserves `<cache dir>/<subdir>/<uuid>.download`, creating the parent
    /// directories. The file itself is not created.
    pub(crate) async fn reserve(
        provider: &dyn CacheDirProvider,
        subdir: &str,
    ) -> Result<Self, JobError> {
        let dir = provider.cache_dir()?.join(subdir);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            JobError::CacheResolution(format!("cannot create {}: {e}", dir.display()))
        })?;
        let path = dir.join(format!("{}.download", uuid::Uuid::new_v4()));
        Ok(Self { path })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Directory the staging file lives in.
    pub(crate) fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(&self.path)
    }
}

impl Drop for CacheFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::trace!(path = %self.path.display(), "staging file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove staging file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reserve_is_unique() {
        let temp = tempfile::tempdir().unwrap();
        let provider = FixedCacheDir::new(temp.path());

        let a = CacheFile::reserve(&provider, "download_cache").await.unwrap();
        let b = CacheFile::reserve(&provider, "download_cache").await.unwrap();
        assert_ne!(a.path(), b.path());
        assert_eq!(a.dir(), temp.path().join("download_cache"));
        assert!(a.dir().is_dir());
        assert_eq!(a.path().extension().unwrap(), "download");
    }

    #[tokio::test]
    async fn test_dropped_file_is_removed() {
        let temp = tempfile::tempdir().unwrap();
        let provider = FixedCacheDir::new(temp.path());

        let file = CacheFile::reserve(&provider, "staging").await.unwrap();
        let path = file.path().to_path_buf();
        std::fs::write(&path, b"partial").unwrap();
        drop(file);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_unwritable_cache_dir() {
        let temp = tempfile::tempdir().unwrap();
        let blocker = temp.path().join("file");
        std::fs::write(&blocker, b"").unwrap();
        let provider = FixedCacheDir::new(&blocker);

        let err = CacheFile::reserve(&provider, "download_cache").await.unwrap_err();
        assert!(matches!(err, JobError::CacheResolution(_)));
    }
}
