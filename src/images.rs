//! Product image mirroring for the latest committed generation
//!
//! Reads `clearances.csv` from the generation the `LATEST` pointer names,
//! collects the distinct image URLs, and downloads them into a flat cache
//! directory. Filenames are the hex SHA-256 of the source URL so re-runs
//! skip everything already on disk. Individual download failures are
//! logged and counted but never abort the mirror pass.

use futures::stream::{self, StreamExt};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::sink::csv::CsvDatasetSink;
use crate::sink::{SinkError, SinkResult};

/// Parallel downloads in flight at once.
const CONCURRENT_DOWNLOADS: usize = 10;
/// Per-image request timeout.
const DOWNLOAD_TIMEOUT_MS: u64 = 30_000;

/// Outcome of one mirror pass.
#[derive(Debug, Default)]
pub struct ImageDownloadReport {
    /// Distinct URLs found in the generation.
    pub total: usize,
    /// Images fetched during this pass.
    pub downloaded: usize,
    /// Images already present in the cache.
    pub cached: usize,
    /// Downloads that failed (logged, not fatal).
    pub failed: usize,
}

/// Only the column the mirror pass cares about; the rest of the row is
/// ignored by the header-driven deserializer.
#[derive(Debug, Deserialize)]
struct ImageRow {
    image_url: Option<String>,
}

/// Cache filename for a URL: hex SHA-256, extension preserved when the URL
/// path carries a recognizable one.
fn cache_filename(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();

    let ext = url
        .rsplit('/')
        .next()
        .and_then(|name| name.split('?').next())
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| ext.len() <= 4 && ext.chars().all(|c| c.is_ascii_alphanumeric()));

    match ext {
        Some(ext) => format!("{hex}.{}", ext.to_ascii_lowercase()),
        None => format!("{hex}.jpg"),
    }
}

/// Collect the distinct image URLs from a generation's clearance table.
fn collect_urls(clearances: &Path) -> SinkResult<BTreeSet<String>> {
    let mut reader = csv::Reader::from_path(clearances)
        .map_err(|e| SinkError::CsvError(format!("failed to open {}: {e}", clearances.display())))?;

    let mut urls = BTreeSet::new();
    for row in reader.deserialize::<ImageRow>() {
        let row = row.map_err(|e| SinkError::CsvError(format!("malformed clearance row: {e}")))?;
        if let Some(url) = row.image_url {
            if !url.is_empty() {
                urls.insert(url);
            }
        }
    }
    Ok(urls)
}

async fn download_one(client: &reqwest::Client, url: &str, dest: &Path) -> Result<(), String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| format!("request failed: {e}"))?;

    if !response.status().is_success() {
        return Err(format!("status {}", response.status().as_u16()));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| format!("body read failed: {e}"))?;

    // Write via temp file so an interrupted download never poisons the cache.
    let tmp = dest.with_extension("part");
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|e| format!("write failed: {e}"))?;
    tokio::fs::rename(&tmp, dest)
        .await
        .map_err(|e| format!("rename failed: {e}"))?;

    Ok(())
}

/// Mirror the product images of the latest committed generation into
/// `image_dir`.
pub async fn download_images(dataset_root: &Path, image_dir: &Path) -> SinkResult<ImageDownloadReport> {
    let generation = CsvDatasetSink::latest_generation(dataset_root)?.ok_or_else(|| {
        SinkError::IoError(format!(
            "no committed generation under {}",
            dataset_root.display()
        ))
    })?;

    let clearances = CsvDatasetSink::clearances_path(&generation);
    let urls = collect_urls(&clearances)?;
    info!(
        "Found {} distinct image URLs in {}",
        urls.len(),
        generation.display()
    );

    std::fs::create_dir_all(image_dir)
        .map_err(|e| SinkError::IoError(format!("failed to create image dir: {e}")))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(DOWNLOAD_TIMEOUT_MS))
        .build()
        .map_err(|e| SinkError::IoError(format!("failed to build HTTP client: {e}")))?;

    let mut report = ImageDownloadReport {
        total: urls.len(),
        ..Default::default()
    };

    // Partition into cached and pending before touching the network.
    let mut pending: Vec<(String, PathBuf)> = Vec::new();
    for url in urls {
        let dest = image_dir.join(cache_filename(&url));
        if dest.exists() {
            report.cached += 1;
        } else {
            pending.push((url, dest));
        }
    }
    debug!("{} cached, {} to download", report.cached, pending.len());

    let mut downloads = stream::iter(pending.into_iter().map(|(url, dest)| {
        let client = &client;
        async move {
            let result = download_one(client, &url, &dest).await;
            (url, result)
        }
    }))
    .buffer_unordered(CONCURRENT_DOWNLOADS);

    while let Some((url, result)) = downloads.next().await {
        match result {
            Ok(()) => report.downloaded += 1,
            Err(e) => {
                warn!("Failed to download {}: {}", url, e);
                report.failed += 1;
            }
        }
    }

    info!(
        "Image mirror complete: {} downloaded, {} cached, {} failed",
        report.downloaded, report.cached, report.failed
    );
    Ok(report)
}
