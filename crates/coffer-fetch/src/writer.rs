//! Destinations of a download.

use std::fmt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWrite;

/// Caller-supplied byte sink.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Where the plaintext of a download ends up.
pub enum DownloadWriter {
    /// A file, created along with its parent directories. The file is replaced
    /// atomically, so it is either the complete download or untouched.
    File(PathBuf),
    /// An open stream the plaintext is written to and flushed.
    Stream(BoxedWriter),
}

impl DownloadWriter {
    /// Creates a file destination.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// Creates a stream destination.
    #[must_use]
    pub fn stream(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self::Stream(Box::new(writer))
    }

    /// Returns the destination path for file destinations.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Stream(_) => None,
        }
    }
}

impl fmt::Debug for DownloadWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Outcome of a successful download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    /// The destination file, or `None` for stream destinations.
    pub path: Option<PathBuf>,
    /// Plaintext bytes at the destination.
    pub bytes: u64,
    /// True if the destination was already complete and nothing was
    /// transferred.
    pub reused: bool,
}
