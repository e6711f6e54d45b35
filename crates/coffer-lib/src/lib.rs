//! Keyed asynchronous job pool for vault attachment downloads and exports.
//!
//! This is a facade crate that re-exports functionality from the coffer
//! workspace crates for convenient access.
//!
//! # Quick Start
//!
//! ```ignore
//! use coffer_lib::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = DownloadManager::http(
//!         ClientConfig::default(),
//!         Arc::new(NoDecryptor),
//!         DownloadManagerConfig::default(),
//!     )?;
//!
//!     let tag = AttachmentTag::new("item-1", None, "A123");
//!     let writer = manager.default_destination(&tag, "report.pdf");
//!     let request = DownloadRequest::new("https://example.com/report.pdf", writer);
//!     let (_, mut progress) = manager.queue(AttachmentDownload::new(tag, request));
//!
//!     while let Some(event) = progress.next().await {
//!         println!("{event:?}");
//!     }
//!     Ok(())
//! }
//! ```

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/coffer-rs/coffer/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use coffer_types::*;

// Re-export the pool
pub use coffer_pool::{
    Emitter, JobKey, JobPhase, JobPool, JobRunner, JobSnapshot, Lifecycle, PoolConfig,
    ProgressBroadcaster, Subscription,
};

// Re-export downloads
#[cfg(feature = "fetch")]
pub use coffer_fetch::{
    AttachmentDownload, BoxedWriter, ByteSource, ByteStream, CacheDirProvider, ClientConfig,
    Decryptor, Destination, DownloadConfig, DownloadFailure, DownloadKey, DownloadManager,
    DownloadManagerConfig,
    DownloadRequest, DownloadTask, DownloadWriter, Downloaded, Downloader, FetchResponse,
    FixedCacheDir, HttpByteSource, NoDecryptor, PlatformCacheDir, default_cache_dir,
    default_downloads_dir,
};

// Re-export exports
#[cfg(feature = "export")]
pub use coffer_export::{
    ArchiveEntry, ArchiveTarget, ArchiveWriter, Attachment, AttachmentSource, Cipher, Collection,
    DirectorySink, EntryData, ExportConfig, ExportContext, ExportEncoder, ExportFilter,
    ExportManager, ExportRequest, ExportSink, ExportTask, Exported, Folder, JsonExportEncoder,
    LaunchHook, MemoryVault, NoopKeepAlive, Organization, SessionKeepAlive, VaultSnapshot,
    VaultSource, ZipArchiveWriter,
};

/// Prelude module for convenient imports.
///
/// ```
/// use coffer_lib::prelude::*;
/// ```
pub mod prelude {
    pub use coffer_types::{
        AttachmentTag, DownloadId, ErrorClass, ExportId, JobError, ProgressEvent, Result,
    };

    pub use coffer_pool::{JobPool, Lifecycle, PoolConfig, Subscription};

    #[cfg(feature = "fetch")]
    pub use coffer_fetch::{
        AttachmentDownload, ClientConfig, DownloadManager, DownloadManagerConfig, DownloadRequest,
        DownloadWriter, Downloaded, NoDecryptor,
    };

    #[cfg(feature = "export")]
    pub use coffer_export::{
        DirectorySink, ExportConfig, ExportContext, ExportFilter, ExportManager, ExportRequest,
        Exported, MemoryVault,
    };
}
