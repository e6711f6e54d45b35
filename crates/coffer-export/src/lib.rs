//! Vault exports for coffer.
//!
//! This crate builds password-protected archives of a vault, downloading
//! attachments through the shared download pool:
//!
//! - [`VaultSource`] / [`ExportFilter`] - What gets exported
//! - [`ExportEncoder`] / [`JsonExportEncoder`] - The vault document
//! - [`ArchiveWriter`] / [`ZipArchiveWriter`] - The archive format
//! - [`ExportSink`] / [`DirectorySink`] - Where archives land
//! - [`SessionKeepAlive`] - Holds the vault session open while exporting
//! - [`ExportTask`] - The export job body
//! - [`ExportManager`] - Registry of exports keyed by id

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/coffer-rs/coffer/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod archive;
mod config;
mod encoder;
mod filter;
mod manager;
mod model;
mod progress;
mod session;
mod sink;
mod task;
mod vault;

pub use archive::{ArchiveEntry, ArchiveWriter, EntryData, ZipArchiveWriter};
pub use config::ExportConfig;
pub use encoder::{ExportEncoder, JsonExportEncoder};
pub use filter::{ExportFilter, snapshot};
pub use manager::{ExportManager, LaunchHook};
pub use model::{
    Attachment, AttachmentSource, Cipher, Collection, Folder, Organization, VaultSnapshot,
};
pub use session::{NoopKeepAlive, SessionKeepAlive};
pub use sink::{ArchiveTarget, DirectorySink, ExportSink};
pub use task::{ExportContext, ExportRequest, ExportTask, Exported};
pub use vault::{MemoryVault, VaultSource};
