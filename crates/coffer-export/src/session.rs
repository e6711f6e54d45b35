//! Keeping the vault session open during an export.

use async_trait::async_trait;
use std::future::Future;

/// Holds the vault session open.
#[async_trait]
pub trait SessionKeepAlive: std::fmt::Debug + Send + Sync {
    /// Keeps the session alive until the returned future is dropped.
    ///
    /// The future normally never completes. If it does, the session is no
    /// longer held but the export carries on.
    async fn keep_alive(&self);
}

/// Keep-alive for hosts without session expiry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopKeepAlive;

#[async_trait]
impl SessionKeepAlive for NoopKeepAlive {
    async fn keep_alive(&self) {
        std::future::pending::<()>().await;
    }
}

/// Runs `work` while holding the session open.
pub(crate) async fn while_alive<F: Future>(session: &dyn SessionKeepAlive, work: F) -> F::Output {
    tokio::pin!(work);
    tokio::select! {
        biased;
        output = &mut work => return output,
        () = session.keep_alive() => {
            tracing::debug!("session keep-alive ended before the export");
        }
    }
    work.await
}
