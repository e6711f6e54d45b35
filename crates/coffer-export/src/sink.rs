//! Where finished archives land.

use async_trait::async_trait;
use coffer_types::JobError;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Opens archive files.
#[async_trait]
pub trait ExportSink: std::fmt::Debug + Send + Sync {
    /// Opens a new archive named `file_name` for writing.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Io`] if the archive cannot be created.
    async fn open(&self, file_name: &str) -> Result<ArchiveTarget, JobError>;
}

/// An archive being written.
///
/// Content goes to a `.part` file that becomes visible under its final name
/// only on [`Self::commit`]. Dropping an uncommitted target deletes the part
/// file.
#[derive(Debug)]
pub struct ArchiveTarget {
    part: PathBuf,
    path: PathBuf,
    file: Option<File>,
    committed: bool,
}

impl ArchiveTarget {
    /// Creates the part file for `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the part file cannot be created.
    pub fn create(path: PathBuf) -> Result<Self, JobError> {
        Ok(Self::create_new(path)?)
    }

    fn create_new(path: PathBuf) -> std::io::Result<Self> {
        let part = part_path(&path);
        let file = File::options().write(true).create_new(true).open(&part)?;
        Ok(Self {
            part,
            path,
            file: Some(file),
            committed: false,
        })
    }

    /// Takes the open part file. Returns `None` on every call but the first.
    pub fn take_file(&mut self) -> Option<File> {
        self.file.take()
    }

    /// Final location of the archive.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Location of the archive while it is written.
    #[must_use]
    pub fn part_path(&self) -> &Path {
        &self.part
    }

    /// Moves the archive to its final location.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails; the part file is then deleted.
    pub async fn commit(mut self) -> Result<PathBuf, JobError> {
        self.file = None;
        tokio::fs::rename(&self.part, &self.path).await?;
        self.committed = true;
        Ok(self.path.clone())
    }
}

impl Drop for ArchiveTarget {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.part) {
            Ok(()) => tracing::debug!(path = %self.part.display(), "removed unfinished archive"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.part.display(), error = %e, "failed to remove unfinished archive");
            }
        }
    }
}

fn part_path(path: &Path) -> PathBuf {
    let mut part = path.as_os_str().to_owned();
    part.push(".part");
    PathBuf::from(part)
}

/// Writes archives into a directory.
///
/// A name that is already taken, or reserved by an archive still being
/// written, gets a ` (n)` suffix.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Creates a sink writing into `dir`. The directory is created on first
    /// use.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory archives are written to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn candidate(&self, file_name: &str, n: u32) -> PathBuf {
        if n == 0 {
            return self.dir.join(file_name);
        }
        let path = Path::new(file_name);
        let stem = path.file_stem().map_or_else(
            || file_name.to_string(),
            |s| s.to_string_lossy().into_owned(),
        );
        let name = match path.extension() {
            Some(ext) => format!("{stem} ({n}).{}", ext.to_string_lossy()),
            None => format!("{stem} ({n})"),
        };
        self.dir.join(name)
    }
}

#[async_trait]
impl ExportSink for DirectorySink {
    async fn open(&self, file_name: &str) -> Result<ArchiveTarget, JobError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let sink = self.clone();
        let file_name = file_name.to_string();
        let target = tokio::task::spawn_blocking(move || {
            for n in 0..1000 {
                let path = sink.candidate(&file_name, n);
                if path.exists() {
                    continue;
                }
                match ArchiveTarget::create_new(path) {
                    Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                    result => return result.map_err(JobError::from),
                }
            }
            Err(JobError::Io(format!("no free name for {file_name}")))
        })
        .await
        .map_err(|e| JobError::Io(e.to_string()))??;
        tracing::debug!(path = %target.path().display(), "archive target opened");
        Ok(target)
    }
}
