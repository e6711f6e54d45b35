//! Keyed registry of in-flight jobs.

use crate::{Emitter, JobPhase, JobRunner, JobSnapshot, ProgressBroadcaster, Subscription};
use coffer_types::{JobError, KeyFingerprint, ProgressEvent};
use futures::FutureExt;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Keys a [`JobPool`] can be indexed by.
pub trait JobKey: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<K> JobKey for K where K: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

/// When a pool entry is evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    /// Evicted when its job terminates, or when its last subscriber goes
    /// away. In the second case the job is cancelled since nobody is left to
    /// observe it.
    #[default]
    Referenced,
    /// Evicted only after its job has published the terminal event.
    /// Subscribers come and go without affecting the job.
    Pinned,
}

/// Configuration for a [`JobPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Events buffered per subscriber before the slowest one starts skipping
    /// loading events.
    pub capacity: usize,
    /// Eviction policy.
    pub lifecycle: Lifecycle,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            lifecycle: Lifecycle::Referenced,
        }
    }
}

/// One in-flight job.
#[derive(Debug)]
struct JobEntry<T> {
    generation: u64,
    fingerprint: KeyFingerprint,
    token: CancellationToken,
    broadcaster: Arc<ProgressBroadcaster<T>>,
    subscribers: u32,
    pinned: bool,
    created_at: Instant,
}

impl<T: Clone + Send + 'static> JobEntry<T> {
    fn is_live(&self) -> bool {
        !self.token.is_cancelled() && !self.broadcaster.is_closed()
    }
}

#[derive(Debug)]
struct PoolInner<K, T> {
    name: &'static str,
    config: PoolConfig,
    entries: Mutex<HashMap<K, JobEntry<T>>>,
    generations: AtomicU64,
}

impl<K: JobKey, T: Clone + Send + Sync + 'static> PoolInner<K, T> {
    fn lock(&self) -> MutexGuard<'_, HashMap<K, JobEntry<T>>> {
        // Every mutation leaves the map consistent, so a poisoned lock is
        // still usable.
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Drops one reference on the entry for `key` created as `generation`.
    fn release(&self, key: &K, generation: u64) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        if entry.generation != generation {
            return;
        }
        entry.subscribers = entry.subscribers.saturating_sub(1);
        if entry.subscribers == 0
            && self.config.lifecycle == Lifecycle::Referenced
            && !entry.pinned
        {
            if let Some(entry) = entries.remove(key) {
                tracing::debug!(pool = self.name, ?key, "last subscriber left, cancelling job");
                entry.token.cancel();
            }
        }
    }

    /// Removes the entry for `key` if it is still `generation`.
    fn evict(&self, key: &K, generation: u64) {
        let mut entries = self.lock();
        if entries
            .get(key)
            .is_some_and(|entry| entry.generation == generation)
        {
            entries.remove(key);
            tracing::debug!(pool = self.name, ?key, "job evicted");
        }
    }
}

/// An entry inserted ahead of its runner. Releases the entry if the factory
/// unwinds before a supervisor takes over.
struct Reservation<'a, K: JobKey, T: Clone + Send + Sync + 'static> {
    inner: &'a PoolInner<K, T>,
    key: &'a K,
    generation: u64,
    broadcaster: &'a ProgressBroadcaster<T>,
    armed: bool,
}

impl<K: JobKey, T: Clone + Send + Sync + 'static> Drop for Reservation<'_, K, T> {
    fn drop(&mut self) {
        if self.armed {
            self.broadcaster.abandon();
            self.inner.evict(self.key, self.generation);
        }
    }
}

/// Keyed registry that runs each job at most once per key and fans its
/// progress out to every subscriber.
///
/// The map is guarded by a single mutex that is held only for lookups and
/// mutations; job bodies run on their own tasks outside of it. Jobs start
/// eagerly on creation, independent of whether anybody reads the returned
/// subscription yet.
///
/// Cloning a pool is cheap and yields a handle to the same registry.
#[derive(Debug)]
pub struct JobPool<K, T> {
    inner: Arc<PoolInner<K, T>>,
}

impl<K, T> Clone for JobPool<K, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: JobKey, T: Clone + Send + Sync + 'static> JobPool<K, T> {
    /// Creates an empty pool. `name` labels the pool's log events.
    #[must_use]
    pub fn new(name: &'static str, config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                name,
                config,
                entries: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
            }),
        }
    }

    /// Returns the pool's eviction policy.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.config.lifecycle
    }

    /// Subscribes to the job for `key`, starting one if none is running.
    ///
    /// Equivalent to [`Self::get_or_create_with`] with an empty fingerprint.
    pub fn get_or_create<R, F>(&self, key: K, factory: F) -> Subscription<T>
    where
        F: FnOnce() -> R,
        R: JobRunner<T>,
    {
        self.get_or_create_with(key, KeyFingerprint::of(None), factory)
    }

    /// Subscribes to the job for `key`, starting one if none is running.
    ///
    /// An existing entry is reused only while it is live and was created with
    /// the same `fingerprint`. A mismatching entry is cancelled and replaced.
    /// `factory` is invoked only when a new job is started. It runs after the
    /// new entry is reserved and outside the pool's lock, so it may use the
    /// pool itself; requests for `key` made meanwhile join the new entry.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn get_or_create_with<R, F>(
        &self,
        key: K,
        fingerprint: KeyFingerprint,
        factory: F,
    ) -> Subscription<T>
    where
        F: FnOnce() -> R,
        R: JobRunner<T>,
    {
        let mut entries = self.inner.lock();

        if let Some(entry) = entries.get_mut(&key) {
            if entry.is_live() && entry.fingerprint == fingerprint {
                entry.subscribers += 1;
                tracing::trace!(pool = self.inner.name, ?key, "joined running job");
                let subscription = entry.broadcaster.subscribe();
                let generation = entry.generation;
                drop(entries);
                return self.track(subscription, key, generation);
            }
            if entry.is_live() {
                tracing::warn!(
                    pool = self.inner.name,
                    ?key,
                    "job parameters changed, replacing running job"
                );
            }
            entry.token.cancel();
        }

        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let broadcaster = Arc::new(ProgressBroadcaster::new(
            self.inner.config.capacity,
            ProgressEvent::loading(),
        ));
        let subscription = broadcaster.subscribe();
        entries.insert(
            key.clone(),
            JobEntry {
                generation,
                fingerprint,
                token: token.clone(),
                broadcaster: Arc::clone(&broadcaster),
                subscribers: 1,
                pinned: false,
                created_at: Instant::now(),
            },
        );
        drop(entries);

        let runner = {
            let mut reservation = Reservation {
                inner: &*self.inner,
                key: &key,
                generation,
                broadcaster: &*broadcaster,
                armed: true,
            };
            let runner = factory();
            reservation.armed = false;
            runner
        };
        self.launch(key.clone(), generation, token, broadcaster, runner);
        tracing::debug!(pool = self.inner.name, ?key, generation, "job started");

        self.track(subscription, key, generation)
    }

    /// Spawns the supervisor task of a new entry.
    ///
    /// The supervisor races the job body against the entry's token and turns
    /// whichever finishes first into the terminal event, so cancellation is
    /// always reported as `Complete(Err(Cancelled))`. A panicking body is not
    /// turned into an event: the channel is abandoned and the panic resumed.
    fn launch<R: JobRunner<T>>(
        &self,
        key: K,
        generation: u64,
        token: CancellationToken,
        broadcaster: Arc<ProgressBroadcaster<T>>,
        runner: R,
    ) {
        let pool: Weak<PoolInner<K, T>> = Arc::downgrade(&self.inner);
        let name = self.inner.name;
        let emitter = Emitter::new(Arc::clone(&broadcaster));

        tokio::spawn(async move {
            let body = AssertUnwindSafe(runner.run(emitter)).catch_unwind();
            let outcome = tokio::select! {
                biased;
                () = token.cancelled() => Ok(Err(JobError::Cancelled)),
                outcome = body => outcome,
            };

            let result = match outcome {
                Ok(result) => result,
                Err(panic) => {
                    tracing::error!(pool = name, ?key, "job panicked");
                    broadcaster.abandon();
                    if let Some(pool) = pool.upgrade() {
                        pool.evict(&key, generation);
                    }
                    std::panic::resume_unwind(panic);
                }
            };

            match &result {
                Ok(_) => tracing::debug!(pool = name, ?key, "job completed"),
                Err(JobError::Cancelled) => tracing::info!(pool = name, ?key, "job cancelled"),
                Err(e) => tracing::warn!(pool = name, ?key, error = %e, "job failed"),
            }
            broadcaster.finish(result);
            if let Some(pool) = pool.upgrade() {
                pool.evict(&key, generation);
            }
        });
    }

    fn track(&self, subscription: Subscription<T>, key: K, generation: u64) -> Subscription<T> {
        let pool = Arc::downgrade(&self.inner);
        subscription.with_release(Box::new(move || {
            if let Some(pool) = pool.upgrade() {
                pool.release(&key, generation);
            }
        }))
    }

    /// Subscribes to the running job for `key`, if there is one.
    #[must_use]
    pub fn subscribe(&self, key: &K) -> Option<Subscription<T>> {
        let mut entries = self.inner.lock();
        let entry = entries.get_mut(key).filter(|entry| entry.is_live())?;
        entry.subscribers += 1;
        let subscription = entry.broadcaster.subscribe();
        let generation = entry.generation;
        drop(entries);
        Some(self.track(subscription, key.clone(), generation))
    }

    /// Subscribes to the job for `key`, or returns a view that yields `None`
    /// and ends when there is no such job.
    #[must_use]
    pub fn status(&self, key: &K) -> Subscription<T> {
        self.subscribe(key).unwrap_or_else(Subscription::none)
    }

    /// Returns the first observation of the job for `key`, treating a missing
    /// job or a `timeout` expiry as `None`.
    pub async fn probe(&self, key: &K, timeout: Duration) -> ProgressEvent<T> {
        match self.subscribe(key) {
            Some(mut subscription) => subscription.first_within(timeout).await,
            None => ProgressEvent::None,
        }
    }

    /// Keeps the entry for `key` until its job terminates, even without
    /// subscribers, as if the pool were [`Lifecycle::Pinned`]. Returns false
    /// if no job is running.
    pub fn pin(&self, key: &K) -> bool {
        let mut entries = self.inner.lock();
        match entries.get_mut(key) {
            Some(entry) if entry.is_live() => {
                entry.pinned = true;
                true
            }
            _ => false,
        }
    }

    /// Cancels the job for `key`. Its subscribers receive
    /// `Complete(Err(Cancelled))`. Returns false if no job was running.
    pub fn cancel(&self, key: &K) -> bool {
        let entries = self.inner.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live() => {
                tracing::info!(pool = self.inner.name, ?key, "cancelling job");
                entry.token.cancel();
                true
            }
            _ => false,
        }
    }

    /// Removes the entry for `key` without cancelling its job. Idempotent.
    ///
    /// Current subscribers keep observing the job; new requests for `key`
    /// start a fresh one.
    pub fn remove(&self, key: &K) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    /// Cancels every running job.
    pub fn cancel_all(&self) {
        let entries = self.inner.lock();
        for entry in entries.values() {
            entry.token.cancel();
        }
    }

    /// Returns true if a live job exists for `key`.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().get(key).is_some_and(JobEntry::is_live)
    }

    /// Returns the first key matching `predicate`.
    pub fn find_key(&self, predicate: impl Fn(&K) -> bool) -> Option<K> {
        self.inner
            .lock()
            .iter()
            .find(|(key, entry)| entry.is_live() && predicate(key))
            .map(|(key, _)| key.clone())
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns true if the pool has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Returns the subscriber count of the entry for `key`.
    #[must_use]
    pub fn subscribers(&self, key: &K) -> Option<u32> {
        self.inner.lock().get(key).map(|entry| entry.subscribers)
    }

    /// Snapshots every entry.
    #[must_use]
    pub fn snapshot(&self) -> Vec<JobSnapshot<K>> {
        let entries = self.inner.lock();
        entries
            .iter()
            .map(|(key, entry)| {
                let latest = entry.broadcaster.latest();
                JobSnapshot {
                    key: key.clone(),
                    phase: JobPhase::of(&latest),
                    downloaded: latest.downloaded(),
                    total: latest.total(),
                    subscribers: entry.subscribers,
                    age: entry.created_at.elapsed(),
                }
            })
            .collect()
    }
}
