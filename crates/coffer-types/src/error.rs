//! Error types for coffer jobs.

use thiserror::Error;

/// Result type alias for job outcomes.
pub type Result<T> = std::result::Result<T, JobError>;

/// How a caller should treat a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Worth retrying later (5xx, timeouts, dropped connections).
    Transient,
    /// Retrying will not help.
    Permanent,
    /// The job was cancelled; not a failure of the job itself.
    Cancelled,
}

/// Errors that terminate a job.
///
/// Every variant is cheap to clone because the terminal event of a job is
/// replayed to each of its subscribers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Server answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Reason phrase or response summary.
        message: String,
    },

    /// The request never produced a response (connect, timeout, reset).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Local I/O failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// No writable temporary location could be resolved.
    #[error("Failed to resolve cache file: {0}")]
    CacheResolution(String),

    /// Decrypting the downloaded payload failed.
    #[error("Decryption failed: {0}")]
    Decrypt(String),

    /// Building the export archive failed.
    #[error("Archive error: {0}")]
    Archive(String),

    /// Encoding the export payload failed.
    #[error("Encode error: {0}")]
    Encode(String),

    /// Attachment metadata needed for a download was unavailable.
    #[error("Missing metadata: {0}")]
    Metadata(String),

    /// The job was cancelled before it could finish.
    #[error("Cancelled")]
    Cancelled,
}

impl JobError {
    /// Creates an HTTP error from a status code.
    #[must_use]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Returns the HTTP status code carried by this error, if any.
    #[must_use]
    pub const fn http_status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if the job was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Classifies the error for a caller's retry policy.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Cancelled => ErrorClass::Cancelled,
            Self::Transport(_) => ErrorClass::Transient,
            Self::Http { status, .. } => {
                if *status >= 500 || *status == 408 || *status == 429 {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Permanent
                }
            }
            Self::Io(_)
            | Self::CacheResolution(_)
            | Self::Decrypt(_)
            | Self::Archive(_)
            | Self::Encode(_)
            | Self::Metadata(_) => ErrorClass::Permanent,
        }
    }

    /// Returns true if a caller may retry the job.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.class(), ErrorClass::Transient)
    }
}

impl From<std::io::Error> for JobError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
