//! Archive writing.

use async_trait::async_trait;
use bytes::Bytes;
use coffer_types::JobError;
use std::fs::File;
use std::io::{self, Seek, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use zip::write::SimpleFileOptions;
use zip::{AesMode, CompressionMethod, ZipWriter};

/// Content of an archive entry.
#[derive(Debug, Clone)]
pub enum EntryData {
    /// In-memory bytes.
    Bytes(Bytes),
    /// Contents of a local file.
    File(PathBuf),
}

/// One file inside an archive.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Path inside the archive, `/`-separated.
    pub name: String,
    /// Content.
    pub data: EntryData,
}

impl ArchiveEntry {
    /// Entry backed by bytes.
    #[must_use]
    pub fn bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: EntryData::Bytes(data.into()),
        }
    }

    /// Entry backed by a local file.
    #[must_use]
    pub fn file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            data: EntryData::File(path.into()),
        }
    }
}

/// Writes entries into an archive file.
#[async_trait]
pub trait ArchiveWriter: std::fmt::Debug + Send + Sync {
    /// Writes `entries` into `file`, encrypted with `password` when given,
    /// and returns the archive size.
    ///
    /// Dropping the returned future stops the write at the next entry or
    /// chunk boundary.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Archive`] if the archive cannot be built.
    async fn write(
        &self,
        file: File,
        password: Option<String>,
        entries: Vec<ArchiveEntry>,
    ) -> Result<u64, JobError>;
}

/// ZIP archives, AES-256 encrypted when a password is given.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipArchiveWriter;

impl ZipArchiveWriter {
    /// Creates a ZIP writer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Sets its flag when dropped.
struct AbortOnDrop(Arc<AtomicBool>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

fn archive_error(e: impl std::fmt::Display) -> JobError {
    JobError::Archive(e.to_string())
}

const COPY_CHUNK: usize = 64 * 1024;

fn write_zip(
    file: File,
    password: Option<&str>,
    entries: &[ArchiveEntry],
    aborted: &AtomicBool,
) -> Result<u64, JobError> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let options = match password {
        Some(password) => options.with_aes_encryption(AesMode::Aes256, password),
        None => options,
    };

    let mut zip = ZipWriter::new(file);
    for entry in entries {
        if aborted.load(Ordering::Relaxed) {
            return Err(JobError::Cancelled);
        }
        zip.start_file(entry.name.as_str(), options.clone())
            .map_err(archive_error)?;
        match &entry.data {
            EntryData::Bytes(bytes) => zip.write_all(bytes)?,
            EntryData::File(path) => {
                let mut input = File::open(path)?;
                let mut buf = vec![0u8; COPY_CHUNK];
                loop {
                    if aborted.load(Ordering::Relaxed) {
                        return Err(JobError::Cancelled);
                    }
                    let n = io::Read::read(&mut input, &mut buf)?;
                    if n == 0 {
                        break;
                    }
                    zip.write_all(&buf[..n])?;
                }
            }
        }
    }
    let mut file = zip.finish().map_err(archive_error)?;
    file.flush()?;
    file.sync_all()?;
    Ok(file.stream_position()?)
}

#[async_trait]
impl ArchiveWriter for ZipArchiveWriter {
    async fn write(
        &self,
        file: File,
        password: Option<String>,
        entries: Vec<ArchiveEntry>,
    ) -> Result<u64, JobError> {
        let aborted = Arc::new(AtomicBool::new(false));
        let _guard = AbortOnDrop(Arc::clone(&aborted));
        let count = entries.len();
        let work = move || write_zip(file, password.as_deref(), &entries, &aborted);
        let written = match tokio::task::spawn_blocking(work).await {
            Ok(result) => result?,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => return Err(JobError::Io(format!("archive task failed: {e}"))),
        };
        tracing::debug!(entries = count, bytes = written, "archive written");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn read_entry(path: &std::path::Path, name: &str, password: Option<&[u8]>) -> Vec<u8> {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut out = Vec::new();
        match password {
            Some(password) => archive
                .by_name_decrypt(name, password)
                .unwrap()
                .read_to_end(&mut out)
                .unwrap(),
            None => archive.by_name(name).unwrap().read_to_end(&mut out).unwrap(),
        };
        out
    }

    #[tokio::test]
    async fn test_writes_bytes_and_files() {
        let dir = TempDir::new().unwrap();
        let attachment = dir.path().join("report.pdf");
        std::fs::write(&attachment, vec![9u8; 200_000]).unwrap();
        let archive = dir.path().join("out.zip");

        let entries = vec![
            ArchiveEntry::bytes("vault.json", &b"{}"[..]),
            ArchiveEntry::file("attachments/a1/report.pdf", &attachment),
        ];
        let written = ZipArchiveWriter::new()
            .write(File::create(&archive).unwrap(), None, entries)
            .await
            .unwrap();

        assert_eq!(written, std::fs::metadata(&archive).unwrap().len());
        assert_eq!(read_entry(&archive, "vault.json", None), b"{}");
        assert_eq!(
            read_entry(&archive, "attachments/a1/report.pdf", None),
            vec![9u8; 200_000]
        );
    }

    #[tokio::test]
    async fn test_password_protects_entries() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("out.zip");
        let entries = vec![ArchiveEntry::bytes("vault.json", &b"secret"[..])];
        ZipArchiveWriter::new()
            .write(
                File::create(&archive).unwrap(),
                Some("hunter2".to_string()),
                entries,
            )
            .await
            .unwrap();

        let mut zip = ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        assert!(zip.by_name("vault.json").is_err());
        drop(zip);
        assert_eq!(read_entry(&archive, "vault.json", Some(b"hunter2")), b"secret");
    }

    #[tokio::test]
    async fn test_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("out.zip");
        let entries = vec![ArchiveEntry::file("x", dir.path().join("missing"))];
        let err = ZipArchiveWriter::new()
            .write(File::create(&archive).unwrap(), None, entries)
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Io(_)));
    }

    #[test]
    fn test_aborted_write_stops() {
        let dir = TempDir::new().unwrap();
        let file = File::create(dir.path().join("out.zip")).unwrap();
        let entries = vec![ArchiveEntry::bytes("a", &b"1"[..])];
        let aborted = AtomicBool::new(true);
        let err = write_zip(file, None, &entries, &aborted).unwrap_err();
        assert!(err.is_cancelled());
    }
}
