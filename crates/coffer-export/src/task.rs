//! The export job body.

use crate::progress::AttachmentProgress;
use crate::session::while_alive;
use crate::{
    ArchiveEntry, ArchiveWriter, Attachment, Cipher, ExportConfig, ExportEncoder, ExportFilter,
    ExportSink, JsonExportEncoder, NoopKeepAlive, SessionKeepAlive, VaultSnapshot, VaultSource,
    ZipArchiveWriter, snapshot,
};
use coffer_fetch::{
    AttachmentDownload, CacheDirProvider, DownloadManager, DownloadRequest, DownloadWriter,
};
use coffer_pool::{Emitter, JobRunner};
use coffer_types::{AttachmentTag, JobError, ProgressEvent};
use futures::{StreamExt, TryStreamExt};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What to export.
#[derive(Clone, Default)]
pub struct ExportRequest {
    /// Items to include.
    pub filter: ExportFilter,
    /// Archive password. `None` writes an unencrypted archive.
    pub password: Option<String>,
    /// Whether attachments are downloaded into the archive.
    pub attachments: bool,
}

impl std::fmt::Debug for ExportRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportRequest")
            .field("filter", &self.filter)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("attachments", &self.attachments)
            .finish()
    }
}

/// A finished export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exported {
    /// Location of the archive.
    pub path: PathBuf,
    /// Size of the archive.
    pub bytes: u64,
    /// Number of exported items.
    pub items: usize,
    /// Number of attachments in the archive.
    pub attachments: usize,
}

/// Collaborators shared by every export.
#[derive(Debug, Clone)]
pub struct ExportContext {
    vault: Arc<dyn VaultSource>,
    downloads: DownloadManager,
    cache: Arc<dyn CacheDirProvider>,
    sink: Arc<dyn ExportSink>,
    encoder: Arc<dyn ExportEncoder>,
    archive: Arc<dyn ArchiveWriter>,
    session: Arc<dyn SessionKeepAlive>,
}

impl ExportContext {
    /// Creates a context writing JSON into ZIP archives, without a session
    /// keep-alive.
    #[must_use]
    pub fn new(
        vault: Arc<dyn VaultSource>,
        downloads: DownloadManager,
        cache: Arc<dyn CacheDirProvider>,
        sink: Arc<dyn ExportSink>,
    ) -> Self {
        Self {
            vault,
            downloads,
            cache,
            sink,
            encoder: Arc::new(JsonExportEncoder::new()),
            archive: Arc::new(ZipArchiveWriter::new()),
            session: Arc::new(NoopKeepAlive),
        }
    }

    /// Sets the document encoder.
    #[must_use]
    pub fn with_encoder(mut self, encoder: Arc<dyn ExportEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Sets the archive writer.
    #[must_use]
    pub fn with_archive_writer(mut self, archive: Arc<dyn ArchiveWriter>) -> Self {
        self.archive = archive;
        self
    }

    /// Sets the session keep-alive held while archives are written.
    #[must_use]
    pub fn with_session(mut self, session: Arc<dyn SessionKeepAlive>) -> Self {
        self.session = session;
        self
    }

    /// Returns the download manager attachments are fetched through.
    #[must_use]
    pub const fn downloads(&self) -> &DownloadManager {
        &self.downloads
    }
}

/// A single export, runnable in a [`coffer_pool::JobPool`].
///
/// Attachments are fetched through the [`DownloadManager`] into a staging
/// directory that is removed on every path, including cancellation. Their
/// combined byte counts are reported as the export's progress.
#[derive(Debug)]
pub struct ExportTask {
    context: ExportContext,
    config: ExportConfig,
    request: ExportRequest,
}

impl ExportTask {
    /// Creates the job body for `request`.
    #[must_use]
    pub const fn new(context: ExportContext, config: ExportConfig, request: ExportRequest) -> Self {
        Self {
            context,
            config,
            request,
        }
    }
}

impl JobRunner<Exported> for ExportTask {
    fn run(
        self,
        emitter: Emitter<Exported>,
    ) -> impl Future<Output = Result<Exported, JobError>> + Send + 'static {
        self.execute(emitter)
    }
}

impl ExportTask {
    async fn execute(self, emitter: Emitter<Exported>) -> Result<Exported, JobError> {
        let Self {
            context,
            config,
            request,
        } = self;
        let file_name = config.file_name(chrono::Utc::now());

        let snapshot = snapshot(context.vault.as_ref(), &request.filter).await?;
        let document = context.encoder.encode(&snapshot)?;
        tracing::debug!(file = %file_name, bytes = document.len(), "vault encoded");

        let session = Arc::clone(&context.session);
        while_alive(session.as_ref(), async move {
            let mut entries = vec![ArchiveEntry::bytes(context.encoder.file_name(), document)];

            let staging = if request.attachments {
                Some(staging_dir(context.cache.as_ref(), &config.staging_subdir).await?)
            } else {
                None
            };
            if let Some(staging) = &staging {
                let attachments =
                    fetch_attachments(&context, &config, &snapshot, staging.path(), &emitter)
                        .await?;
                entries.extend(attachments);
            }
            let attachments = entries.len() - 1;

            let mut target = context.sink.open(&file_name).await?;
            let file = target
                .take_file()
                .ok_or_else(|| JobError::Io("archive target has no open file".to_string()))?;
            let bytes = context
                .archive
                .write(file, request.password, entries)
                .await?;
            let path = target.commit().await?;
            drop(staging);

            tracing::info!(path = %path.display(), bytes, attachments, "export written");
            Ok::<_, JobError>(Exported {
                path,
                bytes,
                items: snapshot.ciphers.len(),
                attachments,
            })
        })
        .await
    }
}

async fn staging_dir(
    cache: &dyn CacheDirProvider,
    subdir: &str,
) -> Result<tempfile::TempDir, JobError> {
    let dir = cache.cache_dir()?.join(subdir);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| JobError::CacheResolution(format!("{}: {e}", dir.display())))?;
    tempfile::Builder::new()
        .prefix("export-")
        .tempdir_in(&dir)
        .map_err(|e| JobError::CacheResolution(format!("{}: {e}", dir.display())))
}

/// Last path component of an attachment's file name, or its id when the name
/// has none.
fn entry_file_name(attachment: &Attachment) -> String {
    Path::new(&attachment.file_name)
        .file_name()
        .map_or_else(
            || attachment.id.clone(),
            |name| name.to_string_lossy().into_owned(),
        )
}

/// Downloads every attachment of `snapshot` into `dir`, in order.
async fn fetch_attachments(
    context: &ExportContext,
    config: &ExportConfig,
    snapshot: &VaultSnapshot,
    dir: &Path,
    emitter: &Emitter<Exported>,
) -> Result<Vec<ArchiveEntry>, JobError> {
    let progress = AttachmentProgress::new(snapshot.attachments().map(|(_, a)| a.size));
    if progress.len() == 0 {
        return Ok(Vec::new());
    }
    let report = || {
        emitter.loading(Some(progress.downloaded()), Some(progress.total()));
    };
    report();

    let (progress, report) = (&progress, &report);
    let mut jobs = Vec::with_capacity(progress.len());
    for (index, (cipher, attachment)) in snapshot.attachments().enumerate() {
        let on_progress = move |downloaded: Option<u64>| {
            match downloaded {
                Some(downloaded) => progress.update(index, downloaded),
                None => progress.complete(index),
            }
            report();
        };
        jobs.push(fetch_attachment(context, cipher, attachment, dir, on_progress));
    }

    futures::stream::iter(jobs)
        .buffered(config.attachment_concurrency.max(1))
        .try_collect()
        .await
}

/// Downloads one attachment. `on_progress` receives byte counts, then `None`
/// once the attachment is complete.
async fn fetch_attachment(
    context: &ExportContext,
    cipher: &Cipher,
    attachment: &Attachment,
    dir: &Path,
    on_progress: impl Fn(Option<u64>),
) -> Result<ArchiveEntry, JobError> {
    let source = context.vault.attachment_source(cipher, attachment).await?;
    let tag = AttachmentTag::new(&cipher.id, cipher.remote_id.clone(), &attachment.id);
    let file_name = entry_file_name(attachment);
    let dst = dir.join(&attachment.id).join(&file_name);

    let mut request = DownloadRequest::new(source.url, DownloadWriter::File(dst));
    if let Some(key) = source.key {
        request = request.with_key(key);
    }
    let mut subscription = context
        .downloads
        .fetch(AttachmentDownload::new(tag.clone(), request));

    while let Some(event) = subscription.next().await {
        match event {
            ProgressEvent::None => {}
            ProgressEvent::Loading { downloaded, .. } => {
                if let Some(downloaded) = downloaded {
                    on_progress(Some(downloaded));
                }
            }
            ProgressEvent::Complete { result } => {
                let downloaded = result?;
                on_progress(None);
                let path = downloaded.path.ok_or_else(|| {
                    JobError::Archive(format!("attachment {tag} has no local file"))
                })?;
                return Ok(ArchiveEntry::file(
                    format!("attachments/{}/{file_name}", attachment.id),
                    path,
                ));
            }
        }
    }
    Err(JobError::Cancelled)
}
