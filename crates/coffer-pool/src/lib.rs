//! Keyed job pool for coffer.
//!
//! This crate runs long-lived jobs at most once per key and shares their
//! progress with every interested caller:
//!
//! - [`JobPool`] - Registry of in-flight jobs with single-execution semantics
//! - [`Lifecycle`] - When an entry is evicted from its pool
//! - [`JobRunner`] - The body of a job
//! - [`Emitter`] - Handle a job body reports progress through
//! - [`Subscription`] - One subscriber's replayed view of a job
//! - [`ProgressBroadcaster`] - Replay-1 multicast channel
//! - [`JobPhase`] / [`JobSnapshot`] - Introspection of pool entries

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/coffer-rs/coffer/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod broadcast;
mod job;
mod pool;
mod runner;
mod subscription;

pub use broadcast::{Emitter, ProgressBroadcaster};
pub use job::{JobPhase, JobSnapshot};
pub use pool::{JobKey, JobPool, Lifecycle, PoolConfig};
pub use runner::JobRunner;
pub use subscription::Subscription;
