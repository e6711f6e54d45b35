//! Deduplicating attachment download manager.

use crate::{
    ByteSource, CacheDirProvider, ClientConfig, Decryptor, DownloadConfig, DownloadRequest,
    DownloadWriter, Downloaded, Downloader, HttpByteSource, PlatformCacheDir,
    default_downloads_dir,
};
use coffer_pool::{Emitter, JobPool, JobRunner, JobSnapshot, Lifecycle, PoolConfig, Subscription};
use coffer_types::{AttachmentTag, DownloadId, JobError, KeyFingerprint, ProgressEvent};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Configuration for a [`DownloadManager`].
#[derive(Debug, Clone)]
pub struct DownloadManagerConfig {
    /// Root directory of default download destinations.
    pub downloads_dir: PathBuf,
    /// How long [`DownloadManager::probe`] waits for a first observation.
    pub status_timeout: Duration,
    /// Per-download settings.
    pub download: DownloadConfig,
    /// Broadcast buffer per download.
    pub capacity: usize,
}

impl Default for DownloadManagerConfig {
    fn default() -> Self {
        Self {
            downloads_dir: default_downloads_dir().unwrap_or_else(|| PathBuf::from("downloads")),
            status_timeout: Duration::from_secs(1),
            download: DownloadConfig::default(),
            capacity: PoolConfig::default().capacity,
        }
    }
}

/// A queued attachment download.
#[derive(Debug)]
pub struct AttachmentDownload {
    /// Identity of the attachment, used to deduplicate requests.
    pub tag: AttachmentTag,
    /// The transfer itself.
    pub request: DownloadRequest,
}

impl AttachmentDownload {
    /// Creates a download of `url` for `tag`.
    #[must_use]
    pub const fn new(tag: AttachmentTag, request: DownloadRequest) -> Self {
        Self { tag, request }
    }
}

/// Where a download is written, as part of its identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    /// A file path.
    File(PathBuf),
    /// A caller-supplied stream. No two streams are the same destination.
    Stream(u64),
}

impl Destination {
    fn of(writer: &DownloadWriter) -> Self {
        static STREAMS: AtomicU64 = AtomicU64::new(0);
        match writer {
            DownloadWriter::File(path) => Self::File(path.clone()),
            DownloadWriter::Stream(_) => Self::Stream(STREAMS.fetch_add(1, Ordering::Relaxed)),
        }
    }
}

/// Identity of a running download.
///
/// Requests for the same attachment share one transfer only when they write
/// to the same destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DownloadKey {
    /// The attachment.
    pub tag: AttachmentTag,
    /// Where it is written.
    pub destination: Destination,
}

impl DownloadKey {
    fn new(tag: AttachmentTag, writer: &DownloadWriter) -> Self {
        Self {
            tag,
            destination: Destination::of(writer),
        }
    }
}

/// The last recorded failure of a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadFailure {
    /// HTTP status code, when the failure was an HTTP error.
    pub code: Option<u16>,
    /// Human-readable description.
    pub message: String,
    /// Number of failed attempts so far.
    pub attempt: u32,
    /// Whether retrying may succeed.
    pub retryable: bool,
}

#[derive(Debug)]
struct DownloadRecord {
    id: DownloadId,
    url: String,
    key: DownloadKey,
}

#[derive(Debug, Default)]
struct Journal {
    records: HashMap<AttachmentTag, DownloadRecord>,
    failures: HashMap<DownloadId, DownloadFailure>,
}

impl Journal {
    fn tag_of(&self, id: &DownloadId) -> Option<AttachmentTag> {
        self.records
            .iter()
            .find(|(_, record)| &record.id == id)
            .map(|(tag, _)| tag.clone())
    }

    fn key_of(&self, id: &DownloadId) -> Option<DownloadKey> {
        self.records
            .values()
            .find(|record| &record.id == id)
            .map(|record| record.key.clone())
    }
}

#[derive(Debug)]
struct ManagerInner {
    downloader: Downloader,
    pool: JobPool<DownloadKey, Downloaded>,
    journal: Mutex<Journal>,
    config: DownloadManagerConfig,
}

impl ManagerInner {
    fn journal(&self) -> MutexGuard<'_, Journal> {
        self.journal
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Journals the outcome of the transfer for `key`, if it is the one
    /// registered for its tag.
    fn record_outcome(&self, key: &DownloadKey, result: &Result<Downloaded, JobError>) {
        let mut journal = self.journal();
        let Some(id) = journal
            .records
            .get(&key.tag)
            .filter(|record| record.key == *key)
            .map(|record| record.id.clone())
        else {
            return;
        };
        match result {
            Ok(_) => {
                journal.failures.remove(&id);
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                let attempt = journal.failures.get(&id).map_or(0, |f| f.attempt) + 1;
                tracing::warn!(download = %id, attempt, error = %e, "download failed");
                journal.failures.insert(
                    id,
                    DownloadFailure {
                        code: e.http_status(),
                        message: e.to_string(),
                        attempt,
                        retryable: e.is_retryable(),
                    },
                );
            }
        }
    }
}

/// Runs attachment downloads, at most one per [`DownloadKey`].
///
/// Downloads started with [`Self::queue`] get a stable [`DownloadId`] and run
/// to completion even when every caller drops its subscription. Failures of
/// registered downloads are journaled per id; see [`Self::last_failure`].
///
/// [`Self::fetch`] starts an unregistered download that lives only as long as
/// somebody is subscribed to it.
#[derive(Debug, Clone)]
pub struct DownloadManager {
    inner: Arc<ManagerInner>,
}

impl DownloadManager {
    /// Creates a manager over the given collaborators.
    #[must_use]
    pub fn new(
        source: Arc<dyn ByteSource>,
        decryptor: Arc<dyn Decryptor>,
        cache: Arc<dyn CacheDirProvider>,
        config: DownloadManagerConfig,
    ) -> Self {
        let downloader = Downloader::new(source, cache)
            .with_decryptor(decryptor)
            .with_config(config.download.clone());
        let pool = JobPool::new(
            "downloads",
            PoolConfig {
                capacity: config.capacity,
                lifecycle: Lifecycle::Referenced,
            },
        );
        Self {
            inner: Arc::new(ManagerInner {
                downloader,
                pool,
                journal: Mutex::new(Journal::default()),
                config,
            }),
        }
    }

    /// Creates a manager fetching over HTTP and staging in the platform cache
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn http(
        client: ClientConfig,
        decryptor: Arc<dyn Decryptor>,
        config: DownloadManagerConfig,
    ) -> Result<Self, reqwest::Error> {
        let source = HttpByteSource::new(client)?;
        Ok(Self::new(
            Arc::new(source),
            decryptor,
            Arc::new(PlatformCacheDir),
            config,
        ))
    }

    /// Returns the manager configuration.
    #[must_use]
    pub fn config(&self) -> &DownloadManagerConfig {
        &self.inner.config
    }

    /// Default destination of an attachment:
    /// `<downloads dir>/<local item id>/<attachment id>/<file name>`.
    #[must_use]
    pub fn default_destination(&self, tag: &AttachmentTag, file_name: &str) -> DownloadWriter {
        DownloadWriter::File(
            self.inner
                .config
                .downloads_dir
                .join(&tag.local_item_id)
                .join(&tag.attachment_id)
                .join(file_name),
        )
    }

    /// Queues a download and returns its id and a subscription to it.
    ///
    /// Queueing the same tag again returns the same id. A request for the
    /// same destination joins the running transfer, unless the content key
    /// changed, in which case the running transfer is cancelled and replaced.
    /// A request for another destination becomes the registered download of
    /// the tag and gets its own transfer. Any previously journaled failure is
    /// cleared.
    pub fn queue(&self, download: AttachmentDownload) -> (DownloadId, Subscription<Downloaded>) {
        let AttachmentDownload { tag, request } = download;
        let fingerprint = request.fingerprint();
        let key = DownloadKey::new(tag.clone(), &request.writer);

        let id = {
            let mut journal = self.inner.journal();
            let record = journal
                .records
                .entry(tag.clone())
                .or_insert_with(|| DownloadRecord {
                    id: DownloadId::generate(),
                    url: request.url.clone(),
                    key: key.clone(),
                });
            record.url.clone_from(&request.url);
            record.key.clone_from(&key);
            let id = record.id.clone();
            journal.failures.remove(&id);
            id
        };

        let subscription = self.start(key.clone(), fingerprint, request);
        // The subscription is held, so the entry cannot be released before
        // it is pinned.
        self.inner.pool.pin(&key);
        tracing::info!(download = %id, %tag, "download queued");
        (id, subscription)
    }

    /// Subscribes to a download without registering it.
    ///
    /// The transfer is shared with any other request for the same tag and
    /// destination, and is cancelled once no subscriber is left.
    pub fn fetch(&self, download: AttachmentDownload) -> Subscription<Downloaded> {
        let AttachmentDownload { tag, request } = download;
        let fingerprint = request.fingerprint();
        let key = DownloadKey::new(tag, &request.writer);
        self.start(key, fingerprint, request)
    }

    fn start(
        &self,
        key: DownloadKey,
        fingerprint: KeyFingerprint,
        request: DownloadRequest,
    ) -> Subscription<Downloaded> {
        let inner = Arc::downgrade(&self.inner);
        let journal_key = key.clone();
        self.inner.pool.get_or_create_with(key, fingerprint, || {
            let task = self.inner.downloader.task(request);
            move |emitter: Emitter<Downloaded>| async move {
                let result = task.run(emitter).await;
                if let Some(inner) = inner.upgrade() {
                    inner.record_outcome(&journal_key, &result);
                }
                result
            }
        })
    }

    /// Subscribes to the download for `tag`, or to a view that yields `None`
    /// and ends when nothing is running.
    #[must_use]
    pub fn status_by_tag(&self, tag: &AttachmentTag) -> Subscription<Downloaded> {
        match self.running_key(tag) {
            Some(key) => self.inner.pool.status(&key),
            None => Subscription::none(),
        }
    }

    /// Subscribes to the download with `id`, or to a view that yields `None`
    /// and ends when nothing is running.
    #[must_use]
    pub fn status_by_download_id(&self, id: &DownloadId) -> Subscription<Downloaded> {
        let key = self.inner.journal().key_of(id);
        match key {
            Some(key) => self.inner.pool.status(&key),
            None => Subscription::none(),
        }
    }

    /// Returns the current state of `tag`'s download, treating a missing
    /// download or a slow answer as `None`.
    pub async fn probe(&self, tag: &AttachmentTag) -> ProgressEvent<Downloaded> {
        let Some(key) = self.running_key(tag) else {
            return ProgressEvent::None;
        };
        self.inner
            .pool
            .probe(&key, self.inner.config.status_timeout)
            .await
    }

    /// The registered download of `tag` while it runs, otherwise any running
    /// transfer of `tag`.
    fn running_key(&self, tag: &AttachmentTag) -> Option<DownloadKey> {
        let registered = self
            .inner
            .journal()
            .records
            .get(tag)
            .map(|record| record.key.clone());
        registered
            .filter(|key| self.inner.pool.contains(key))
            .or_else(|| self.inner.pool.find_key(|key| key.tag == *tag))
    }

    /// Returns the download id registered for `tag`.
    #[must_use]
    pub fn download_id(&self, tag: &AttachmentTag) -> Option<DownloadId> {
        self.inner
            .journal()
            .records
            .get(tag)
            .map(|record| record.id.clone())
    }

    /// Returns the URL last queued for `id`.
    #[must_use]
    pub fn url(&self, id: &DownloadId) -> Option<String> {
        let journal = self.inner.journal();
        let tag = journal.tag_of(id)?;
        journal.records.get(&tag).map(|record| record.url.clone())
    }

    /// Returns the last journaled failure of `id`.
    #[must_use]
    pub fn last_failure(&self, id: &DownloadId) -> Option<DownloadFailure> {
        self.inner.journal().failures.get(id).cloned()
    }

    /// Forgets the download with `id` and cancels its transfer.
    pub fn remove_by_download_id(&self, id: &DownloadId) -> bool {
        let tag = self.inner.journal().tag_of(id);
        tag.is_some_and(|tag| self.remove_by_tag(&tag))
    }

    /// Forgets the download registered for `tag` and cancels its transfer.
    /// Unregistered transfers of `tag` are left alone.
    pub fn remove_by_tag(&self, tag: &AttachmentTag) -> bool {
        let record = {
            let mut journal = self.inner.journal();
            let record = journal.records.remove(tag);
            if let Some(record) = &record {
                journal.failures.remove(&record.id);
            }
            record
        };
        let Some(record) = record else {
            return false;
        };
        let cancelled = self.inner.pool.cancel(&record.key);
        tracing::info!(download = %record.id, %tag, cancelled, "download removed");
        true
    }

    /// Snapshots every running download.
    #[must_use]
    pub fn active(&self) -> Vec<JobSnapshot<DownloadKey>> {
        self.inner.pool.snapshot()
    }

    /// Cancels every running download.
    pub fn cancel_all(&self) {
        self.inner.pool.cancel_all();
    }
}
