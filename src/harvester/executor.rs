//! End-to-end harvesting run driver
//!
//! [`HarvestExecutor`] wires the pieces together: directory fetch, directory
//! write (replace), zip enumeration, the per-zip harvest loop with per-batch
//! sink writes, and the final commit that flips the dataset's latest-complete
//! pointer.

use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use tracing::{info, warn};

use crate::config::HarvesterConfig;
use crate::fetcher::ClearanceApi;
use crate::harvester::run::{HarvestSummary, Harvester};
use crate::harvester::zipcodes::derive_zip_codes;
use crate::harvester::RunError;
use crate::metrics;
use crate::shutdown::SharedShutdown;
use crate::sink::DatasetSink;
use crate::Store;

/// Result of a completed (possibly partially failed) harvesting run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Identifier of the dataset generation this run committed
    pub generation: String,
    /// Stores written to the directory table
    pub stores_total: usize,
    /// Harvest counters
    pub summary: HarvestSummary,
}

impl RunReport {
    /// Human-oriented status line: "completed", or "completed with partial
    /// failures" when some zip codes failed.
    pub fn status(&self) -> &'static str {
        if self.summary.has_partial_failures() {
            "completed with partial failures"
        } else {
            "completed"
        }
    }
}

/// Drop directory records whose `id` repeats an earlier record.
///
/// The directory invariant is that `id` is globally unique; a violating
/// upstream payload is quarantined down to the first occurrence rather than
/// poisoning the snapshot.
pub fn dedupe_directory(stores: Vec<Store>) -> Vec<Store> {
    let mut seen = HashSet::with_capacity(stores.len());
    let before = stores.len();
    let stores: Vec<Store> = stores
        .into_iter()
        .filter(|s| seen.insert(s.id.clone()))
        .collect();
    if stores.len() < before {
        warn!(
            dropped = before - stores.len(),
            "Directory contained duplicate store ids"
        );
    }
    stores
}

/// Orchestrates one full harvesting run.
pub struct HarvestExecutor<C: ClearanceApi, S: DatasetSink> {
    api: C,
    sink: S,
    config: HarvesterConfig,
    shutdown: Option<SharedShutdown>,
    show_progress: bool,
    zip_filter: Option<Vec<String>>,
}

impl<C: ClearanceApi, S: DatasetSink> HarvestExecutor<C, S> {
    /// Create an executor over an API client and a sink.
    pub fn new(api: C, sink: S, config: HarvesterConfig) -> Self {
        Self {
            api,
            sink,
            config,
            shutdown: None,
            show_progress: false,
            zip_filter: None,
        }
    }

    /// Attach a shutdown handle for clean aborts between zip codes.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Show a per-zip progress bar during the harvest loop.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Restrict the harvest to the given zip codes.
    ///
    /// The directory-derived ordering is kept; requested zips with no store
    /// in the directory are logged and skipped.
    pub fn with_zip_filter(mut self, zips: Vec<String>) -> Self {
        self.zip_filter = Some(zips);
        self
    }

    /// Execute the run end to end.
    ///
    /// Consumes the executor: the sink is committed (or discarded on abort)
    /// exactly once. On success the new generation has become the dataset's
    /// latest; on any error the previous generation is still the one readers
    /// see.
    pub async fn run(self) -> Result<RunReport, RunError> {
        let span = tracing::info_span!("harvest_run");
        let _enter = span.enter();

        let api = self.api;
        let mut sink = self.sink;

        info!("Fetching store directory");
        let stores = api
            .fetch_all_stores()
            .await
            .map_err(RunError::UpstreamUnavailable)?;
        let stores = dedupe_directory(stores);
        info!(stores = stores.len(), "Store directory ready");

        // Full replace: the new generation starts from this snapshot
        sink.write_stores(&stores)?;

        let mut zip_codes = derive_zip_codes(&stores);
        if let Some(filter) = &self.zip_filter {
            let requested: HashSet<&str> = filter.iter().map(String::as_str).collect();
            for zip in filter {
                if !zip_codes.iter().any(|z| z == zip) {
                    warn!(zip = %zip, "Requested zip code has no store in the directory");
                }
            }
            zip_codes.retain(|z| requested.contains(z.as_str()));
        }
        let estimated = self.config.request_delay * zip_codes.len() as u32;
        info!(
            zip_codes = zip_codes.len(),
            estimated_minutes = estimated.as_secs() / 60,
            "Starting per-zip harvest"
        );

        let progress = if self.show_progress {
            Some(create_progress_bar(zip_codes.len() as u64))
        } else {
            None
        };

        let mut harvester = Harvester::new(
            &api,
            zip_codes,
            self.config.request_delay,
            self.config.flush_threshold,
        );
        if let Some(shutdown) = &self.shutdown {
            harvester = harvester.with_shutdown(shutdown.clone());
        }
        if let Some(pb) = &progress {
            harvester = harvester.with_progress(pb.clone());
        }

        while let Some(batch) = harvester.next_batch().await {
            sink.write_offer_batch(&batch)?;
        }

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        let summary = harvester.into_summary();

        if summary.aborted {
            // The in-progress generation is simply never pointed at
            info!("Run aborted before commit; previous generation remains latest");
            return Err(RunError::Aborted);
        }

        let generation = sink.commit()?;
        metrics::record_run_completed(&summary);

        let report = RunReport {
            generation,
            stores_total: stores.len(),
            summary,
        };
        info!(
            generation = %report.generation,
            unique_stores = report.summary.unique_stores,
            offers = report.summary.offers,
            zips_empty = report.summary.zips_empty,
            zips_failed = report.summary.zips_failed,
            status = report.status(),
            "Harvest run finished"
        );
        Ok(report)
    }
}

/// Per-zip progress bar shown during the harvest loop.
fn create_progress_bar(total_zips: u64) -> ProgressBar {
    let pb = ProgressBar::new(total_zips);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} zips {msg}")
            .expect("hardcoded template is valid")
            .progress_chars("#>-"),
    );
    pb
}
