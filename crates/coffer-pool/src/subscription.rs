//! A single subscriber's view of a job.

use coffer_types::{JobError, ProgressEvent};
use futures::Stream;
use std::fmt;
use std::time::Duration;
use tokio::sync::broadcast;

/// Callback run when a subscription goes away.
pub(crate) type ReleaseFn = Box<dyn FnOnce() + Send>;

/// Live view of one job's progress.
///
/// The first event is the job's latest state at the time of subscribing,
/// followed by every later event. The view ends after exactly one
/// `Complete`; if the job's channel closes without one, a
/// `Complete(Err(Cancelled))` is synthesized so a subscriber never sees a
/// stream end silently.
///
/// Dropping a subscription releases its reference on the pool entry.
pub struct Subscription<T> {
    pending: Option<ProgressEvent<T>>,
    receiver: Option<broadcast::Receiver<ProgressEvent<T>>>,
    finished: bool,
    release: Option<ReleaseFn>,
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("finished", &self.finished)
            .field("tracked", &self.release.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + 'static> Subscription<T> {
    pub(crate) fn new(
        latest: ProgressEvent<T>,
        receiver: Option<broadcast::Receiver<ProgressEvent<T>>>,
    ) -> Self {
        Self {
            pending: Some(latest),
            receiver,
            finished: false,
            release: None,
        }
    }

    /// A view of a job that does not exist: yields `None` once, then ends.
    #[must_use]
    pub fn none() -> Self {
        Self::new(ProgressEvent::None, None)
    }

    pub(crate) fn with_release(mut self, release: ReleaseFn) -> Self {
        self.release = Some(release);
        self
    }

    /// Waits for the next event. Returns `None` after the terminal event.
    pub async fn next(&mut self) -> Option<ProgressEvent<T>> {
        if self.finished {
            return None;
        }
        if let Some(event) = self.pending.take() {
            if event.is_terminal() {
                self.finished = true;
            }
            return Some(event);
        }
        let Some(receiver) = self.receiver.as_mut() else {
            self.finished = true;
            return None;
        };
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if event.is_terminal() {
                        self.finished = true;
                        self.receiver = None;
                    }
                    return Some(event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Only loading events can be skipped: the terminal event is
                    // always the newest one in the buffer.
                    tracing::trace!(skipped, "subscriber lagged behind progress");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.finished = true;
                    self.receiver = None;
                    return Some(ProgressEvent::cancelled());
                }
            }
        }
    }

    /// Drains the view and returns the job's outcome.
    ///
    /// A view that ends without a terminal event (only possible for
    /// [`Subscription::none`]) resolves to `Cancelled`.
    pub async fn wait(mut self) -> Result<T, JobError> {
        let mut outcome = Err(JobError::Cancelled);
        while let Some(event) = self.next().await {
            if let ProgressEvent::Complete { result } = event {
                outcome = result;
            }
        }
        outcome
    }

    /// Returns the first observation, or `None` if nothing arrives within
    /// `timeout`.
    pub async fn first_within(&mut self, timeout: Duration) -> ProgressEvent<T> {
        match tokio::time::timeout(timeout, self.next()).await {
            Ok(Some(event)) => event,
            Ok(None) | Err(_) => ProgressEvent::None,
        }
    }

    /// Returns true once the terminal event has been yielded.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Converts the view into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent<T>> + Send + 'static {
        futures::stream::unfold(self, |mut subscription| async move {
            let event = subscription.next().await?;
            Some((event, subscription))
        })
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_none_subscription() {
        let mut sub = Subscription::<u8>::none();
        assert_eq!(sub.next().await, Some(ProgressEvent::None));
        assert_eq!(sub.next().await, None);
        assert!(sub.is_finished());
    }

    #[tokio::test]
    async fn test_wait_on_none_is_cancelled() {
        let sub = Subscription::<u8>::none();
        assert_eq!(sub.wait().await, Err(JobError::Cancelled));
    }

    #[tokio::test]
    async fn test_release_runs_on_drop() {
        let released = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = std::sync::Arc::clone(&released);
        let sub = Subscription::<u8>::none().with_release(Box::new(move || {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        }));
        assert!(!released.load(std::sync::atomic::Ordering::SeqCst));
        drop(sub);
        assert!(released.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_within_times_out() {
        let (sender, receiver) = broadcast::channel::<ProgressEvent<u8>>(4);
        let mut sub = Subscription::new(ProgressEvent::loading(), Some(receiver));
        assert_eq!(
            sub.first_within(Duration::from_secs(1)).await,
            ProgressEvent::loading()
        );
        assert_eq!(
            sub.first_within(Duration::from_secs(1)).await,
            ProgressEvent::None
        );
        drop(sender);
    }

    #[tokio::test]
    async fn test_into_stream() {
        let (sender, receiver) = broadcast::channel(4);
        let sub = Subscription::new(ProgressEvent::loading(), Some(receiver));
        sender.send(ProgressEvent::loading_with(3, Some(4))).unwrap();
        sender.send(ProgressEvent::success(9u8)).unwrap();

        let events: Vec<_> = sub.into_stream().collect().await;
        assert_eq!(
            events,
            vec![
                ProgressEvent::loading(),
                ProgressEvent::loading_with(3, Some(4)),
                ProgressEvent::success(9),
            ]
        );
    }
}
