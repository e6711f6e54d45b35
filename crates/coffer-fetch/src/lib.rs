//! Attachment downloads for coffer.
//!
//! This crate provides the download job and the manager that deduplicates it:
//!
//! - [`ByteSource`] / [`HttpByteSource`] - Where bytes come from
//! - [`Decryptor`] - Turns staged ciphertext into plaintext
//! - [`CacheDirProvider`] - Where partial downloads are staged
//! - [`DownloadWriter`] - File or stream destination
//! - [`Downloader`] / [`DownloadTask`] - The download job body
//! - [`DownloadManager`] - Registry of downloads keyed by attachment

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/coffer-rs/coffer/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod cache;
mod client;
mod config;
mod decrypt;
mod manager;
mod source;
mod task;
mod writer;

pub use cache::{CacheDirProvider, FixedCacheDir, PlatformCacheDir};
pub use client::{ClientConfig, HttpByteSource};
pub use config::{DownloadConfig, default_cache_dir, default_downloads_dir};
pub use decrypt::{Decryptor, NoDecryptor};
pub use manager::{
    AttachmentDownload, Destination, DownloadFailure, DownloadKey, DownloadManager,
    DownloadManagerConfig,
};
pub use source::{ByteSource, ByteStream, FetchResponse};
pub use task::{DownloadRequest, DownloadTask, Downloader};
pub use writer::{BoxedWriter, DownloadWriter, Downloaded};
