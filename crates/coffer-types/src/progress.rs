//! Progress events emitted by jobs.

use crate::JobError;

/// Point-in-time state of a job.
///
/// A job moves through `None -> Loading -> Complete` and never revisits a
/// state. `Complete` is terminal: it is the last event a job's stream yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent<T> {
    /// No job exists, or there is nothing to report yet.
    None,
    /// The job is running.
    ///
    /// Both counters are best effort; `downloaded` never decreases within
    /// one job.
    Loading {
        /// Bytes transferred so far.
        downloaded: Option<u64>,
        /// Expected total in bytes.
        total: Option<u64>,
    },
    /// The job finished.
    Complete {
        /// Output on success, the reason on failure.
        result: Result<T, JobError>,
    },
}

impl<T> ProgressEvent<T> {
    /// Loading without any metrics.
    #[must_use]
    pub const fn loading() -> Self {
        Self::Loading {
            downloaded: None,
            total: None,
        }
    }

    /// Loading with byte counters.
    #[must_use]
    pub const fn loading_with(downloaded: u64, total: Option<u64>) -> Self {
        Self::Loading {
            downloaded: Some(downloaded),
            total,
        }
    }

    /// Successful completion.
    #[must_use]
    pub const fn success(value: T) -> Self {
        Self::Complete { result: Ok(value) }
    }

    /// Failed completion.
    #[must_use]
    pub const fn failure(error: JobError) -> Self {
        Self::Complete { result: Err(error) }
    }

    /// Terminal event signalling cancellation.
    #[must_use]
    pub const fn cancelled() -> Self {
        Self::failure(JobError::Cancelled)
    }

    /// Returns true for `Complete`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }

    /// Returns true for `Loading`.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }

    /// Returns the downloaded counter of a `Loading` event.
    #[must_use]
    pub const fn downloaded(&self) -> Option<u64> {
        match self {
            Self::Loading { downloaded, .. } => *downloaded,
            _ => None,
        }
    }

    /// Returns the total counter of a `Loading` event.
    #[must_use]
    pub const fn total(&self) -> Option<u64> {
        match self {
            Self::Loading { total, .. } => *total,
            _ => None,
        }
    }

    /// Returns the result of a `Complete` event.
    #[must_use]
    pub const fn result(&self) -> Option<&Result<T, JobError>> {
        match self {
            Self::Complete { result } => Some(result),
            _ => None,
        }
    }

    /// Returns the completed fraction in `0.0..=1.0`, if known.
    #[must_use]
    pub fn fraction(&self) -> Option<f64> {
        match self {
            Self::Loading {
                downloaded: Some(downloaded),
                total: Some(total),
            } if *total > 0 => Some((*downloaded as f64 / *total as f64).min(1.0)),
            Self::Complete { result: Ok(_) } => Some(1.0),
            _ => None,
        }
    }

    /// Maps the success value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ProgressEvent<U> {
        match self {
            Self::None => ProgressEvent::None,
            Self::Loading { downloaded, total } => ProgressEvent::Loading { downloaded, total },
            Self::Complete { result } => ProgressEvent::Complete {
                result: result.map(f),
            },
        }
    }
}

impl<T> Default for ProgressEvent<T> {
    fn default() -> Self {
        Self::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_detection() {
        assert!(!ProgressEvent::<()>::None.is_terminal());
        assert!(!ProgressEvent::<()>::loading().is_terminal());
        assert!(ProgressEvent::success(()).is_terminal());
        assert!(ProgressEvent::<()>::cancelled().is_terminal());
    }

    #[test]
    fn test_fraction() {
        let event = ProgressEvent::<()>::loading_with(5, Some(20));
        assert!((event.fraction().unwrap() - 0.25).abs() < 0.001);

        assert_eq!(ProgressEvent::<()>::loading_with(5, None).fraction(), None);
        assert_eq!(ProgressEvent::<()>::loading_with(5, Some(0)).fraction(), None);
        assert_eq!(ProgressEvent::success(()).fraction(), Some(1.0));
        assert_eq!(ProgressEvent::<()>::cancelled().fraction(), None);
    }

    #[test]
    fn test_fraction_is_capped() {
        let event = ProgressEvent::<()>::loading_with(30, Some(20));
        assert_eq!(event.fraction(), Some(1.0));
    }

    #[test]
    fn test_map_keeps_shape() {
        let event = ProgressEvent::success(2).map(|v| v * 10);
        assert_eq!(event, ProgressEvent::success(20));

        let event = ProgressEvent::<i32>::loading_with(1, Some(2)).map(|v| v * 10);
        assert_eq!(event.downloaded(), Some(1));
        assert_eq!(event.total(), Some(2));
    }
}
