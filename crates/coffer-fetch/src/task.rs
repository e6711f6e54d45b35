//! The download job body.

use crate::cache::CacheFile;
use crate::decrypt::decrypt_or_copy;
use crate::{
    ByteSource, ByteStream, CacheDirProvider, Decryptor, DownloadConfig, DownloadWriter,
    Downloaded, NoDecryptor,
};
use bytes::Bytes;
use coffer_pool::{Emitter, JobRunner};
use coffer_types::{JobError, KeyFingerprint};
use futures::StreamExt;
use std::future::Future;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::{Instant, MissedTickBehavior};

/// What to download and where to put it.
#[derive(Debug)]
pub struct DownloadRequest {
    /// Source URL.
    pub url: String,
    /// Symmetric key of the content, if it is encrypted.
    pub key: Option<Vec<u8>>,
    /// Content that has already been fetched. When present the network is
    /// not touched.
    pub prefetched: Option<Bytes>,
    /// Destination.
    pub writer: DownloadWriter,
}

impl DownloadRequest {
    /// Creates a request for unencrypted content.
    #[must_use]
    pub fn new(url: impl Into<String>, writer: DownloadWriter) -> Self {
        Self {
            url: url.into(),
            key: None,
            prefetched: None,
            writer,
        }
    }

    /// Sets the content key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Supplies content that has already been fetched.
    #[must_use]
    pub fn with_prefetched(mut self, bytes: impl Into<Bytes>) -> Self {
        self.prefetched = Some(bytes.into());
        self
    }

    /// Fingerprint of the content key, used to detect stale pool entries.
    #[must_use]
    pub fn fingerprint(&self) -> KeyFingerprint {
        KeyFingerprint::of(self.key.as_deref())
    }
}

/// Shared collaborators of every download.
#[derive(Debug, Clone)]
pub struct Downloader {
    source: Arc<dyn ByteSource>,
    decryptor: Arc<dyn Decryptor>,
    cache: Arc<dyn CacheDirProvider>,
    config: DownloadConfig,
}

impl Downloader {
    /// Creates a downloader for plaintext content with default settings.
    #[must_use]
    pub fn new(source: Arc<dyn ByteSource>, cache: Arc<dyn CacheDirProvider>) -> Self {
        Self {
            source,
            decryptor: Arc::new(NoDecryptor),
            cache,
            config: DownloadConfig::default(),
        }
    }

    /// Sets the decryptor used for keyed content.
    #[must_use]
    pub fn with_decryptor(mut self, decryptor: Arc<dyn Decryptor>) -> Self {
        self.decryptor = decryptor;
        self
    }

    /// Sets the download configuration.
    #[must_use]
    pub fn with_config(mut self, config: DownloadConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the download configuration.
    #[must_use]
    pub const fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Creates the job body for `request`.
    #[must_use]
    pub fn task(&self, request: DownloadRequest) -> DownloadTask {
        DownloadTask {
            downloader: self.clone(),
            request,
        }
    }
}

/// A single download, runnable in a [`coffer_pool::JobPool`].
///
/// The content is staged in a fresh cache file, then decrypted (or copied)
/// into the destination. The staging file is removed on every path, including
/// cancellation.
#[derive(Debug)]
pub struct DownloadTask {
    downloader: Downloader,
    request: DownloadRequest,
}

impl JobRunner<Downloaded> for DownloadTask {
    fn run(
        self,
        emitter: Emitter<Downloaded>,
    ) -> impl Future<Output = Result<Downloaded, JobError>> + Send + 'static {
        self.execute(emitter)
    }
}

impl DownloadTask {
    async fn execute(self, emitter: Emitter<Downloaded>) -> Result<Downloaded, JobError> {
        let Self {
            downloader,
            request,
        } = self;
        let DownloadRequest {
            url,
            key,
            prefetched,
            writer,
        } = request;

        let staging =
            CacheFile::reserve(downloader.cache.as_ref(), &downloader.config.cache_subdir).await?;

        match prefetched {
            Some(bytes) => {
                tokio::fs::write(staging.path(), &bytes).await?;
                let length = bytes.len() as u64;
                emitter.loading(Some(length), Some(length));
            }
            None => {
                let response = downloader.source.fetch(&url).await?.error_for_status()?;
                let total = response.content_length;
                let existing = writer.path().map(Path::to_path_buf);

                if let (Some(dst), Some(total)) = (existing, total) {
                    if is_complete(&dst, total).await {
                        tracing::debug!(url = %url, path = %dst.display(), "destination already complete");
                        return Ok(Downloaded {
                            path: Some(dst),
                            bytes: total,
                            reused: true,
                        });
                    }
                }

                let staged = stage(
                    staging.path(),
                    response.body,
                    total,
                    &emitter,
                    downloader.config.poll_interval,
                )
                .await?;
                tracing::debug!(url = %url, bytes = staged, "download staged");
            }
        }

        let decryptor = Arc::clone(&downloader.decryptor);
        match writer {
            DownloadWriter::File(dst) => {
                let bytes = persist(staging, decryptor, key, dst.clone()).await?;
                Ok(Downloaded {
                    path: Some(dst),
                    bytes,
                    reused: false,
                })
            }
            DownloadWriter::Stream(mut output) => {
                let plain = blocking(move || {
                    let mut input = std::fs::File::open(staging.path())?;
                    let mut plain = tempfile::tempfile_in(staging.dir())?;
                    decrypt_or_copy(decryptor.as_ref(), key.as_deref(), &mut input, &mut plain)?;
                    plain.seek(SeekFrom::Start(0))?;
                    Ok(plain)
                })
                .await?;
                let mut plain = tokio::fs::File::from_std(plain);
                let bytes = tokio::io::copy(&mut plain, &mut output).await?;
                output.flush().await?;
                Ok(Downloaded {
                    path: None,
                    bytes,
                    reused: false,
                })
            }
        }
    }
}

async fn is_complete(path: &Path, length: u64) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_file() && meta.len() == length)
}

/// Copies `body` into `path`, reporting progress every `interval`.
async fn stage(
    path: &Path,
    mut body: ByteStream,
    total: Option<u64>,
    emitter: &Emitter<Downloaded>,
    interval: Duration,
) -> Result<u64, JobError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;

    let interval = interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + interval / 2, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            chunk = body.next() => match chunk {
                Some(chunk) => {
                    let chunk = chunk?;
                    file.write_all(&chunk).await?;
                    written += chunk.len() as u64;
                }
                None => break,
            },
            _ = ticker.tick() => {
                emitter.loading(Some(written), total);
            }
        }
    }
    file.flush().await?;

    if let Some(total) = total.filter(|&total| written < total) {
        return Err(JobError::Transport(format!(
            "connection closed after {written} of {total} bytes"
        )));
    }
    emitter.loading(Some(written), total);
    Ok(written)
}

/// Decrypts the staged file next to `dst` and atomically moves it in place.
async fn persist(
    staging: CacheFile,
    decryptor: Arc<dyn Decryptor>,
    key: Option<Vec<u8>>,
    dst: PathBuf,
) -> Result<u64, JobError> {
    let parent = match dst.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&parent).await?;

    blocking(move || {
        let mut input = std::fs::File::open(staging.path())?;
        let mut output = tempfile::NamedTempFile::new_in(&parent)?;
        let written = decrypt_or_copy(
            decryptor.as_ref(),
            key.as_deref(),
            &mut input,
            output.as_file_mut(),
        )?;
        output.persist(&dst).map_err(|e| JobError::from(e.error))?;
        tracing::debug!(path = %dst.display(), bytes = written, "download persisted");
        Ok(written)
    })
    .await
}

/// Runs blocking file work off the async threads. Panics are resumed.
async fn blocking<R, F>(work: F) -> Result<R, JobError>
where
    F: FnOnce() -> Result<R, JobError> + Send + 'static,
    R: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(JobError::Io(format!("blocking task failed: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FixedCacheDir;
    use crate::decrypt::testing::XorDecryptor;
    use crate::source::testing::StaticSource;
    use coffer_pool::{JobPool, PoolConfig, Subscription};
    use coffer_types::ProgressEvent;
    use tokio::io::AsyncReadExt;

    struct Fixture {
        dir: tempfile::TempDir,
        source: Arc<StaticSource>,
        downloader: Downloader,
        pool: JobPool<&'static str, Downloaded>,
    }

    impl Fixture {
        fn new(source: StaticSource) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let source = Arc::new(source);
            let downloader = Downloader::new(
                Arc::clone(&source) as Arc<dyn ByteSource>,
                Arc::new(FixedCacheDir::new(dir.path().join("cache"))),
            )
            .with_decryptor(Arc::new(XorDecryptor));
            Self {
                dir,
                source,
                downloader,
                pool: JobPool::new("downloads", PoolConfig::default()),
            }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join("out").join(name)
        }

        fn start(&self, request: DownloadRequest) -> Subscription<Downloaded> {
            self.pool
                .get_or_create("job", || self.downloader.task(request))
        }

        fn staging_is_empty(&self) -> bool {
            std::fs::read_dir(self.dir.path().join("cache").join("download_cache"))
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(true)
        }
    }

    #[tokio::test]
    async fn test_download_to_file() {
        let fixture = Fixture::new(StaticSource::ok(b"attachment body", 4));
        let dst = fixture.path("a.txt");

        let result = fixture
            .start(DownloadRequest::new("http://host/a", DownloadWriter::file(&dst)))
            .wait()
            .await
            .unwrap();

        assert_eq!(result.path.as_deref(), Some(dst.as_path()));
        assert_eq!(result.bytes, 15);
        assert!(!result.reused);
        assert_eq!(std::fs::read(&dst).unwrap(), b"attachment body");
        assert!(fixture.staging_is_empty());
    }

    #[tokio::test]
    async fn test_http_error_leaves_destination_untouched() {
        let fixture = Fixture::new(StaticSource::status(503));
        let dst = fixture.path("a.txt");

        let result = fixture
            .start(DownloadRequest::new("http://host/a", DownloadWriter::file(&dst)))
            .wait()
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.http_status(), Some(503));
        assert!(err.is_retryable());
        assert!(!dst.exists());
        assert!(fixture.staging_is_empty());
    }

    #[tokio::test]
    async fn test_complete_destination_is_reused() {
        let fixture = Fixture::new(StaticSource::ok(b"0123456789", 10));
        let dst = fixture.path("a.bin");
        std::fs::create_dir_all(dst.parent().unwrap()).unwrap();
        std::fs::write(&dst, b"abcdefghij").unwrap();

        let result = fixture
            .start(DownloadRequest::new("http://host/a", DownloadWriter::file(&dst)))
            .wait()
            .await
            .unwrap();

        assert!(result.reused);
        assert_eq!(result.bytes, 10);
        // Same length, so the existing content is kept.
        assert_eq!(std::fs::read(&dst).unwrap(), b"abcdefghij");
    }

    #[tokio::test]
    async fn test_keyed_download_is_decrypted() {
        let encrypted: Vec<u8> = b"secret".iter().map(|b| b ^ 0x5a).collect();
        let fixture = Fixture::new(StaticSource::ok(&encrypted, 3));
        let dst = fixture.path("secret.txt");

        let request = DownloadRequest::new("http://host/s", DownloadWriter::file(&dst))
            .with_key(vec![0x5a]);
        fixture.start(request).wait().await.unwrap();

        assert_eq!(std::fs::read(&dst).unwrap(), b"secret");
    }

    #[tokio::test]
    async fn test_prefetched_bytes_skip_network() {
        let fixture = Fixture::new(StaticSource::ok(b"remote", 6));
        let dst = fixture.path("local.txt");

        let request = DownloadRequest::new("http://host/p", DownloadWriter::file(&dst))
            .with_prefetched(Bytes::from_static(b"local"));
        let result = fixture.start(request).wait().await.unwrap();

        assert_eq!(result.bytes, 5);
        assert_eq!(std::fs::read(&dst).unwrap(), b"local");
        assert_eq!(fixture.source.fetches(), 0);
    }

    #[tokio::test]
    async fn test_stream_destination() {
        let fixture = Fixture::new(StaticSource::ok(b"streamed", 3));
        let (writer, mut reader) = tokio::io::duplex(1024);

        let result = fixture
            .start(DownloadRequest::new("http://host/s", DownloadWriter::stream(writer)))
            .wait()
            .await
            .unwrap();
        assert_eq!(result.path, None);
        assert_eq!(result.bytes, 8);

        let mut received = Vec::new();
        reader.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"streamed");
        assert!(fixture.staging_is_empty());
    }

    #[tokio::test]
    async fn test_unresolvable_cache_fails_before_fetching() {
        let fixture = Fixture::new(StaticSource::ok(b"x", 1));
        let blocker = fixture.dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let downloader = Downloader::new(
            Arc::clone(&fixture.source) as Arc<dyn ByteSource>,
            Arc::new(FixedCacheDir::new(&blocker)),
        );

        let subscription = fixture.pool.get_or_create("job", || {
            downloader.task(DownloadRequest::new(
                "http://host/x",
                DownloadWriter::file(fixture.path("x")),
            ))
        });
        let err = subscription.wait().await.unwrap_err();
        assert!(matches!(err, JobError::CacheResolution(_)));
        assert_eq!(fixture.source.fetches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_is_periodic_and_monotonic() {
        let content = vec![7u8; 1000];
        let fixture = Fixture::new(
            StaticSource::ok(&content, 100).with_chunk_delay(Duration::from_millis(300)),
        );
        let dst = fixture.path("big.bin");

        let subscription =
            fixture.start(DownloadRequest::new("http://host/big", DownloadWriter::file(&dst)));
        let events: Vec<_> = subscription.into_stream().collect().await;

        let loading: Vec<_> = events.iter().filter(|e| e.is_loading()).collect();
        // 3 s of transfer at a 1 s interval starting at 0.5 s, plus the
        // initial and final events. Far fewer than one per chunk.
        assert!(loading.len() >= 4, "too few events: {events:?}");
        assert!(loading.len() < 10, "too many events: {events:?}");

        let downloaded: Vec<u64> = events.iter().filter_map(ProgressEvent::downloaded).collect();
        assert!(downloaded.windows(2).all(|w| w[0] <= w[1]));
        assert!(
            events
                .iter()
                .filter_map(ProgressEvent::total)
                .all(|total| total == 1000)
        );
        assert!(matches!(events.last(), Some(ProgressEvent::Complete { result: Ok(_) })));
    }

    #[tokio::test]
    async fn test_cancelled_download_cleans_up() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let fixture = Fixture::new(
            StaticSource::ok(b"never", 5).with_gate(Arc::clone(&gate)),
        );
        let dst = fixture.path("never.txt");

        let subscription =
            fixture.start(DownloadRequest::new("http://host/n", DownloadWriter::file(&dst)));
        while fixture.source.fetches() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(fixture.pool.cancel(&"job"));

        assert_eq!(subscription.wait().await, Err(JobError::Cancelled));
        assert!(!dst.exists());
        assert!(fixture.staging_is_empty());
    }

    #[test]
    fn test_request_fingerprint() {
        let plain = DownloadRequest::new("u", DownloadWriter::file("a"));
        let keyed = DownloadRequest::new("u", DownloadWriter::file("a")).with_key(b"k".to_vec());
        assert!(plain.fingerprint().is_empty());
        assert_ne!(plain.fingerprint(), keyed.fingerprint());
    }
}
