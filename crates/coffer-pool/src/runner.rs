//! The body of a job.

use crate::Emitter;
use coffer_types::JobError;
use std::future::Future;

/// Work executed once per pool entry.
///
/// The body reports progress through the [`Emitter`] and returns its
/// outcome; the pool turns that outcome into the single terminal event.
/// Dropping the returned future is how a job is cancelled, so bodies must
/// clean up after themselves in `Drop` rather than after an `.await`.
///
/// Any `FnOnce(Emitter<T>) -> impl Future` closure is a runner.
pub trait JobRunner<T>: Send + 'static {
    /// Runs the job to completion.
    fn run(self, emitter: Emitter<T>)
    -> impl Future<Output = Result<T, JobError>> + Send + 'static;
}

impl<T, F, Fut> JobRunner<T> for F
where
    F: FnOnce(Emitter<T>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, JobError>> + Send + 'static,
{
    fn run(self, emitter: Emitter<T>) -> impl Future<Output = Result<T, JobError>> + Send + 'static {
        self(emitter)
    }
}
