//! Export job registry.

use crate::{ExportConfig, ExportContext, ExportRequest, ExportTask, Exported};
use coffer_pool::{JobPool, JobSnapshot, Lifecycle, PoolConfig, Subscription};
use coffer_types::ExportId;
use std::fmt;
use std::sync::Arc;

/// Callback invoked with the id of every queued export.
pub type LaunchHook = Arc<dyn Fn(&ExportId) + Send + Sync>;

/// Runs exports and tracks them by [`ExportId`].
///
/// Every call to [`Self::queue`] starts a new export. An export keeps running
/// when its subscribers go away and leaves the registry once its terminal
/// event is published.
#[derive(Clone)]
pub struct ExportManager {
    context: ExportContext,
    config: ExportConfig,
    pool: JobPool<ExportId, Exported>,
    on_launch: Option<LaunchHook>,
}

impl fmt::Debug for ExportManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportManager")
            .field("context", &self.context)
            .field("config", &self.config)
            .field("pool", &self.pool)
            .field("on_launch", &self.on_launch.is_some())
            .finish()
    }
}

impl ExportManager {
    /// Creates a manager.
    #[must_use]
    pub fn new(context: ExportContext, config: ExportConfig) -> Self {
        let pool = JobPool::new(
            "exports",
            PoolConfig {
                capacity: config.capacity,
                lifecycle: Lifecycle::Pinned,
            },
        );
        Self {
            context,
            config,
            pool,
            on_launch: None,
        }
    }

    /// Sets a callback invoked with the id of every queued export, after the
    /// export has started.
    #[must_use]
    pub fn with_on_launch(mut self, hook: impl Fn(&ExportId) + Send + Sync + 'static) -> Self {
        self.on_launch = Some(Arc::new(hook));
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Starts an export and returns its id and a subscription to it.
    pub fn queue(&self, request: ExportRequest) -> (ExportId, Subscription<Exported>) {
        let id = ExportId::generate();
        tracing::info!(export = %id, ?request, "export queued");
        let subscription = self.pool.get_or_create(id.clone(), || {
            ExportTask::new(self.context.clone(), self.config.clone(), request)
        });
        if let Some(hook) = &self.on_launch {
            hook(&id);
        }
        (id, subscription)
    }

    /// Subscribes to the export with `id`, or to a view that yields `None`
    /// and ends when it is not running.
    #[must_use]
    pub fn status_by_export_id(&self, id: &ExportId) -> Subscription<Exported> {
        self.pool.status(id)
    }

    /// Cancels the export with `id`. Its subscribers observe a cancellation.
    pub fn cancel(&self, id: &ExportId) -> bool {
        let cancelled = self.pool.cancel(id);
        if cancelled {
            tracing::info!(export = %id, "export cancelled");
        }
        cancelled
    }

    /// Snapshots every running export.
    #[must_use]
    pub fn active(&self) -> Vec<JobSnapshot<ExportId>> {
        self.pool.snapshot()
    }

    /// Cancels every running export.
    pub fn cancel_all(&self) {
        self.pool.cancel_all();
    }
}
