//! Replay-1 multicast of a job's progress.

use crate::Subscription;
use coffer_types::{JobError, ProgressEvent};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

/// Turns one producer into many consumers.
///
/// The broadcaster caches the latest event next to a [`broadcast`] channel.
/// Both are updated under the same lock, so a new subscriber receives the
/// cached event followed by every event published after it, with nothing
/// lost or duplicated in between.
///
/// Publishing a terminal event drops the channel sender. After that the
/// broadcaster only replays the terminal event.
#[derive(Debug)]
pub struct ProgressBroadcaster<T> {
    state: Mutex<BroadcastState<T>>,
}

#[derive(Debug)]
struct BroadcastState<T> {
    latest: ProgressEvent<T>,
    sender: Option<broadcast::Sender<ProgressEvent<T>>>,
}

impl<T: Clone + Send + 'static> ProgressBroadcaster<T> {
    /// Creates an open broadcaster whose cached event is `initial`.
    #[must_use]
    pub fn new(capacity: usize, initial: ProgressEvent<T>) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            state: Mutex::new(BroadcastState {
                latest: initial,
                sender: Some(sender),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BroadcastState<T>> {
        // The state is valid after any panic that could poison it.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Publishes a non-terminal event.
    ///
    /// `downloaded` is clamped to the highest value seen so far and a known
    /// `total` is kept when the new event omits it. Returns false once the
    /// broadcaster is closed, or if `event` is terminal (use [`Self::finish`]).
    pub fn publish(&self, event: ProgressEvent<T>) -> bool {
        if event.is_terminal() {
            return false;
        }
        let mut state = self.lock();
        let Some(sender) = state.sender.as_ref() else {
            return false;
        };
        let event = match (event, &state.latest) {
            (
                ProgressEvent::Loading { downloaded, total },
                ProgressEvent::Loading {
                    downloaded: prev_downloaded,
                    total: prev_total,
                },
            ) => ProgressEvent::Loading {
                downloaded: match (downloaded, *prev_downloaded) {
                    (Some(d), Some(p)) => Some(d.max(p)),
                    (d, p) => d.or(p),
                },
                total: total.or(*prev_total),
            },
            (event, _) => event,
        };
        // No receivers is fine: the event is still cached for late joiners.
        let _ = sender.send(event.clone());
        state.latest = event;
        true
    }

    /// Publishes the terminal event and closes the channel.
    ///
    /// Only the first call has an effect; returns whether it was this one.
    pub fn finish(&self, result: Result<T, JobError>) -> bool {
        let mut state = self.lock();
        let Some(sender) = state.sender.take() else {
            return false;
        };
        let event = ProgressEvent::Complete { result };
        let _ = sender.send(event.clone());
        state.latest = event;
        true
    }

    /// Closes the channel without a terminal event.
    ///
    /// Subscribers that are still attached observe a synthesized
    /// cancellation.
    pub fn abandon(&self) {
        self.lock().sender = None;
    }

    /// Returns true once the terminal event was published or the channel was
    /// abandoned.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().sender.is_none()
    }

    /// Returns a copy of the cached event.
    #[must_use]
    pub fn latest(&self) -> ProgressEvent<T> {
        self.lock().latest.clone()
    }

    /// Attaches a new subscriber without reference tracking.
    #[must_use]
    pub fn subscribe(&self) -> Subscription<T> {
        let state = self.lock();
        let receiver = state.sender.as_ref().map(broadcast::Sender::subscribe);
        let latest = match (&state.latest, &receiver) {
            // An abandoned channel replays a cancellation instead of a stale
            // loading event.
            (event, None) if !event.is_terminal() => ProgressEvent::cancelled(),
            (event, _) => event.clone(),
        };
        Subscription::new(latest, receiver)
    }
}

/// Handle a job body uses to report progress.
///
/// An emitter can only publish non-terminal events: the terminal event is
/// published by the pool once the body returns.
#[derive(Debug)]
pub struct Emitter<T> {
    broadcaster: Arc<ProgressBroadcaster<T>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            broadcaster: Arc::clone(&self.broadcaster),
        }
    }
}

impl<T: Clone + Send + 'static> Emitter<T> {
    /// Creates an emitter publishing into `broadcaster`.
    #[must_use]
    pub const fn new(broadcaster: Arc<ProgressBroadcaster<T>>) -> Self {
        Self { broadcaster }
    }

    /// Reports a loading state.
    pub fn loading(&self, downloaded: Option<u64>, total: Option<u64>) -> bool {
        self.broadcaster
            .publish(ProgressEvent::Loading { downloaded, total })
    }

    /// Returns true once the job's stream is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.broadcaster.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broadcaster() -> ProgressBroadcaster<u32> {
        ProgressBroadcaster::new(16, ProgressEvent::loading())
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_latest() {
        let b = broadcaster();
        assert!(b.publish(ProgressEvent::loading_with(10, Some(100))));
        assert!(b.publish(ProgressEvent::loading_with(40, Some(100))));

        let mut sub = b.subscribe();
        assert_eq!(sub.next().await, Some(ProgressEvent::loading_with(40, Some(100))));

        b.finish(Ok(7));
        assert_eq!(sub.next().await, Some(ProgressEvent::success(7)));
        assert_eq!(sub.next().await, None);
    }

    #[tokio::test]
    async fn test_finish_only_once() {
        let b = broadcaster();
        let mut sub = b.subscribe();
        assert!(b.finish(Ok(1)));
        assert!(!b.finish(Ok(2)));
        assert!(!b.publish(ProgressEvent::loading()));

        let mut events = Vec::new();
        while let Some(event) = sub.next().await {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![ProgressEvent::loading(), ProgressEvent::success(1)]
        );
    }

    #[tokio::test]
    async fn test_downloaded_is_clamped() {
        let b = broadcaster();
        b.publish(ProgressEvent::loading_with(50, Some(100)));
        b.publish(ProgressEvent::loading_with(20, None));

        assert_eq!(b.latest(), ProgressEvent::loading_with(50, Some(100)));
    }

    #[tokio::test]
    async fn test_subscriber_after_finish_replays_terminal() {
        let b = broadcaster();
        b.finish(Err(JobError::http(404, "Not Found")));

        let mut sub = b.subscribe();
        assert_eq!(
            sub.next().await,
            Some(ProgressEvent::failure(JobError::http(404, "Not Found")))
        );
        assert_eq!(sub.next().await, None);
    }

    #[tokio::test]
    async fn test_abandoned_channel_yields_cancellation() {
        let b = broadcaster();
        let mut sub = b.subscribe();
        b.abandon();

        assert_eq!(sub.next().await, Some(ProgressEvent::loading()));
        assert_eq!(sub.next().await, Some(ProgressEvent::cancelled()));
        assert_eq!(sub.next().await, None);

        let mut late = b.subscribe();
        assert_eq!(late.next().await, Some(ProgressEvent::cancelled()));
        assert_eq!(late.next().await, None);
    }

    #[tokio::test]
    async fn test_emitter_cannot_complete() {
        let b = Arc::new(broadcaster());
        let emitter = Emitter::new(Arc::clone(&b));
        assert!(emitter.loading(Some(1), Some(2)));
        assert!(!b.publish(ProgressEvent::success(1)));
        assert!(!emitter.is_closed());

        b.finish(Ok(3));
        assert!(emitter.is_closed());
        assert!(!emitter.loading(Some(2), Some(2)));
    }
}
