//! Job phases and pool snapshots.

use coffer_types::{JobError, ProgressEvent};
use std::time::Duration;

/// Coarse phase of a job, derived from its latest event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JobPhase {
    /// Nothing has been reported.
    #[default]
    Idle,
    /// The job is running.
    Running,
    /// The job finished successfully.
    Completed,
    /// The job failed.
    Failed,
    /// The job was cancelled.
    Cancelled,
}

impl JobPhase {
    /// Derives the phase of an event.
    #[must_use]
    pub const fn of<T>(event: &ProgressEvent<T>) -> Self {
        match event {
            ProgressEvent::None => Self::Idle,
            ProgressEvent::Loading { .. } => Self::Running,
            ProgressEvent::Complete { result: Ok(_) } => Self::Completed,
            ProgressEvent::Complete {
                result: Err(JobError::Cancelled),
            } => Self::Cancelled,
            ProgressEvent::Complete { result: Err(_) } => Self::Failed,
        }
    }

    /// Returns true if the phase is terminal.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns the phase as a string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Point-in-time view of one pool entry.
#[derive(Debug, Clone)]
pub struct JobSnapshot<K> {
    /// The entry's key.
    pub key: K,
    /// Phase derived from the latest event.
    pub phase: JobPhase,
    /// Bytes reported so far, if known.
    pub downloaded: Option<u64>,
    /// Expected total, if known.
    pub total: Option<u64>,
    /// Number of live subscriptions.
    pub subscribers: u32,
    /// Time since the entry was created.
    pub age: Duration,
}

impl<K> JobSnapshot<K> {
    /// Returns the progress percentage, or `None` when the total is unknown.
    #[must_use]
    pub fn progress_percent(&self) -> Option<f64> {
        match (self.downloaded, self.total) {
            (Some(downloaded), Some(total)) if total > 0 => {
                Some((downloaded as f64 / total as f64).min(1.0) * 100.0)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_of_event() {
        assert_eq!(JobPhase::of(&ProgressEvent::<()>::None), JobPhase::Idle);
        assert_eq!(JobPhase::of(&ProgressEvent::<()>::loading()), JobPhase::Running);
        assert_eq!(JobPhase::of(&ProgressEvent::success(())), JobPhase::Completed);
        assert_eq!(
            JobPhase::of(&ProgressEvent::<()>::failure(JobError::http(500, "boom"))),
            JobPhase::Failed
        );
        assert_eq!(JobPhase::of(&ProgressEvent::<()>::cancelled()), JobPhase::Cancelled);
    }

    #[test]
    fn test_phase_is_finished() {
        assert!(!JobPhase::Idle.is_finished());
        assert!(!JobPhase::Running.is_finished());
        assert!(JobPhase::Completed.is_finished());
        assert!(JobPhase::Failed.is_finished());
        assert!(JobPhase::Cancelled.is_finished());
    }

    #[test]
    fn test_snapshot_progress() {
        let snapshot = JobSnapshot {
            key: "a",
            phase: JobPhase::Running,
            downloaded: Some(24),
            total: Some(96),
            subscribers: 1,
            age: Duration::ZERO,
        };
        assert!((snapshot.progress_percent().unwrap() - 25.0).abs() < 0.001);

        let unknown = JobSnapshot { total: None, ..snapshot };
        assert_eq!(unknown.progress_percent(), None);
    }
}
