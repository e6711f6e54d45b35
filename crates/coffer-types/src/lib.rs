//! Core types for the coffer keyed job pool.
//!
//! This crate provides the value types shared by every coffer crate:
//!
//! - [`ProgressEvent`] - State of a job: none, loading, or complete
//! - [`JobError`] - Failure taxonomy carried by terminal events
//! - [`ErrorClass`] - Retry classification of a [`JobError`]
//! - [`AttachmentTag`] - Deduplication key for attachment downloads
//! - [`DownloadId`] / [`ExportId`] - Record identifiers
//! - [`KeyFingerprint`] - Digest of a content key

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/coffer-rs/coffer/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod ids;
mod progress;

pub use error::{ErrorClass, JobError, Result};
pub use ids::{AttachmentTag, DownloadId, ExportId, KeyFingerprint};
pub use progress::ProgressEvent;
