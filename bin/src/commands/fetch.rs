//! Fetch command implementation.
//!
//! Downloads one URL through the download manager, with the same
//! deduplication and staging attachment downloads get.

use crate::display::{follow, format_bytes, progress_bar};
use anyhow::{Context, Result};
use coffer_lib::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;

/// Download `url` to `output`.
pub(crate) async fn fetch(url: &str, output: Option<PathBuf>, quiet: bool) -> Result<()> {
    let output = output.unwrap_or_else(|| PathBuf::from(file_name_from_url(url)));
    let manager = DownloadManager::http(
        ClientConfig::default(),
        Arc::new(NoDecryptor),
        DownloadManagerConfig::default(),
    )
    .context("Failed to create HTTP client")?;

    let tag = AttachmentTag::new("cli", None, url);
    let request = DownloadRequest::new(url, DownloadWriter::file(&output));
    let (id, mut subscription) = manager.queue(AttachmentDownload::new(tag, request));
    tracing::debug!(download = %id, "fetch started");

    let progress = progress_bar(quiet, output.display().to_string())?;
    let downloaded = follow(&progress, &mut subscription, || manager.cancel_all())
        .await
        .with_context(|| format!("Failed to download {url}"))?;

    if !quiet {
        let verb = if downloaded.reused { "Already present" } else { "Downloaded" };
        println!(
            "{verb}: {} ({})",
            output.display(),
            format_bytes(downloaded.bytes)
        );
    }
    Ok(())
}

/// Last non-empty path segment of `url`, without query or fragment.
fn file_name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let path = path.split_once("://").map_or(path, |(_, rest)| {
        rest.split_once('/').map_or("", |(_, path)| path)
    });
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .map_or_else(|| "download".to_string(), str::to_string)
}
