//! Export command implementation.
//!
//! Reads a vault document from disk and writes it, optionally with its
//! attachments, into a ZIP archive through the export manager.

use crate::display::{follow, format_bytes, progress_bar};
use anyhow::{Context, Result};
use coffer_lib::prelude::*;
use coffer_lib::{PlatformCacheDir, VaultSource};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Options of one export run.
pub(crate) struct ExportOptions {
    pub(crate) output_dir: PathBuf,
    pub(crate) items: Vec<String>,
    pub(crate) password: Option<String>,
    pub(crate) attachments: bool,
}

/// Export the vault document at `vault`.
pub(crate) async fn export(vault: &Path, options: ExportOptions, quiet: bool) -> Result<()> {
    let vault = load_vault(vault).await?;

    let downloads = DownloadManager::http(
        ClientConfig::default(),
        Arc::new(NoDecryptor),
        DownloadManagerConfig::default(),
    )
    .context("Failed to create HTTP client")?;
    let context = ExportContext::new(
        vault,
        downloads,
        Arc::new(PlatformCacheDir),
        Arc::new(DirectorySink::new(options.output_dir)),
    );
    let manager = ExportManager::new(context, ExportConfig::default());

    let filter = if options.items.is_empty() {
        ExportFilter::All
    } else {
        ExportFilter::ById(options.items)
    };
    let (id, mut subscription) = manager.queue(ExportRequest {
        filter,
        password: options.password,
        attachments: options.attachments,
    });
    tracing::debug!(export = %id, "export started");

    let progress = progress_bar(quiet, "exporting")?;
    let exported = follow(&progress, &mut subscription, || manager.cancel_all())
        .await
        .context("Export failed")?;

    if !quiet {
        println!(
            "Exported {} items and {} attachments to: {} ({})",
            exported.items,
            exported.attachments,
            exported.path.display(),
            format_bytes(exported.bytes)
        );
    }
    Ok(())
}

async fn load_vault(path: &Path) -> Result<Arc<dyn VaultSource>> {
    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let vault: MemoryVault = serde_json::from_slice(&content)
        .with_context(|| format!("Invalid vault document: {}", path.display()))?;
    tracing::info!(
        items = vault.ciphers.len(),
        sources = vault.sources.len(),
        "vault loaded"
    );
    Ok(Arc::new(vault))
}
