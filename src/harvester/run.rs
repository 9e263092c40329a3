//! The per-zip harvesting state machine
//!
//! A [`Harvester`] walks the zip-code sequence in order, one upstream request
//! at a time, deduplicating store groups first-seen-wins and accumulating
//! batches. The consumer pulls batches via [`Harvester::next_batch`]; the
//! producer suspends between pulls, so the batch sequence is lazy, finite,
//! and non-restartable.
//!
//! Zip iteration order is fixed up front and determines dedup winners: when
//! the same store is reachable from two overlapping zip catchments, the
//! earlier zip's payload is retained and the later one dropped entirely.
//! Duplicate payloads represent the same store at nearly the same timestamp,
//! so dropping (rather than merging) loses nothing of value.

use indicatif::ProgressBar;
use std::collections::HashSet;
use std::mem;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::fetcher::ClearanceApi;
use crate::metrics;
use crate::shutdown::SharedShutdown;
use crate::{HarvestBatch, StoreOffers};

/// Outcome of one zip-code query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZipOutcome {
    /// The query returned data; counts cover this zip only
    Success {
        /// Store groups first seen via this zip
        new_stores: usize,
        /// Store groups dropped as duplicates of earlier zips
        duplicates: usize,
    },
    /// The query succeeded but no stores participate in this zip
    Empty,
    /// The query failed after exhausting client-level retries
    Failed,
}

impl std::fmt::Display for ZipOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZipOutcome::Success {
                new_stores,
                duplicates,
            } => write!(f, "{new_stores} new stores ({duplicates} duplicates)"),
            ZipOutcome::Empty => write!(f, "no stores"),
            ZipOutcome::Failed => write!(f, "FAILED"),
        }
    }
}

/// Counters accumulated across a harvesting run.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct HarvestSummary {
    /// Zip codes in the iteration sequence
    pub zips_total: usize,
    /// Zip codes that returned at least one store group
    pub zips_with_data: usize,
    /// Zip codes that returned no data
    pub zips_empty: usize,
    /// Zip codes that failed after retries
    pub zips_failed: usize,
    /// The failed zip codes, in iteration order
    pub failed_zips: Vec<String>,
    /// Unique stores retained across the run
    pub unique_stores: u64,
    /// Offers retained across the run
    pub offers: u64,
    /// Store groups dropped as duplicates of earlier zips
    pub duplicate_groups: u64,
    /// Batches emitted to the sink
    pub batches: u32,
    /// Whether the run stopped early on a shutdown request
    pub aborted: bool,
}

impl HarvestSummary {
    /// Whether the run completed but some zip codes failed.
    pub fn has_partial_failures(&self) -> bool {
        !self.aborted && self.zips_failed > 0
    }
}

/// Sequential, rate-limit-paced harvester over an ordered zip-code list.
///
/// Owns the `seen` store-id set and the batch accumulator exclusively; the
/// single driving task means no locking is needed.
pub struct Harvester<'a, C: ClearanceApi> {
    api: &'a C,
    zip_codes: Vec<String>,
    request_delay: Duration,
    flush_threshold: usize,
    position: usize,
    any_request_made: bool,
    seen: HashSet<String>,
    pending: Vec<StoreOffers>,
    next_sequence: u32,
    summary: HarvestSummary,
    shutdown: Option<SharedShutdown>,
    progress: Option<ProgressBar>,
}

impl<'a, C: ClearanceApi> Harvester<'a, C> {
    /// Create a harvester over a fixed zip-code sequence.
    pub fn new(
        api: &'a C,
        zip_codes: Vec<String>,
        request_delay: Duration,
        flush_threshold: usize,
    ) -> Self {
        let summary = HarvestSummary {
            zips_total: zip_codes.len(),
            ..HarvestSummary::default()
        };
        Self {
            api,
            zip_codes,
            request_delay,
            flush_threshold: flush_threshold.max(1),
            position: 0,
            any_request_made: false,
            seen: HashSet::new(),
            pending: Vec::new(),
            next_sequence: 1,
            summary,
            shutdown: None,
            progress: None,
        }
    }

    /// Attach a shutdown handle checked between zip codes.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Attach a progress bar advanced once per zip code.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Counters accumulated so far.
    pub fn summary(&self) -> &HarvestSummary {
        &self.summary
    }

    /// Consume the harvester, yielding the final summary.
    pub fn into_summary(self) -> HarvestSummary {
        self.summary
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }

    /// Pull the next batch, driving zip queries until the flush threshold is
    /// reached or the sequence is exhausted.
    ///
    /// Returns `None` when the sequence is done (after a final remainder
    /// flush) or when shutdown was requested; check
    /// [`HarvestSummary::aborted`] to tell the two apart. Uncommitted pending
    /// groups are discarded on abort; the sink never sees them.
    pub async fn next_batch(&mut self) -> Option<HarvestBatch> {
        if self.summary.aborted {
            return None;
        }

        let mut zips_in_window = 0usize;

        while self.position < self.zip_codes.len() {
            if self.shutdown_requested() {
                return self.abort();
            }

            // Inter-request delay is paid between iterations, skipped before
            // the first request of the run
            if self.any_request_made && !self.request_delay.is_zero() {
                if let Some(shutdown) = &self.shutdown {
                    tokio::select! {
                        _ = tokio::time::sleep(self.request_delay) => {},
                        _ = shutdown.wait_for_shutdown() => return self.abort(),
                    }
                } else {
                    tokio::time::sleep(self.request_delay).await;
                }
            }

            let zip = self.zip_codes[self.position].clone();
            self.position += 1;
            self.any_request_made = true;

            let outcome = self.process_zip(&zip).await;
            if let Some(progress) = &self.progress {
                progress.inc(1);
                progress.set_message(format!("zip {zip}: {outcome}"));
            }
            info!(
                zip,
                position = self.position,
                total = self.zip_codes.len(),
                %outcome,
                "Processed zip code"
            );

            zips_in_window += 1;
            if zips_in_window >= self.flush_threshold {
                if self.pending.is_empty() {
                    zips_in_window = 0;
                } else {
                    return Some(self.flush());
                }
            }
        }

        if self.pending.is_empty() {
            None
        } else {
            Some(self.flush())
        }
    }

    /// Query one zip code; failures are absorbed into the summary.
    async fn process_zip(&mut self, zip: &str) -> ZipOutcome {
        let groups = match self.api.fetch_clearances(zip).await {
            Ok(groups) => groups,
            Err(e) => {
                if e.is_partition_skippable() {
                    warn!(zip, error = %e, "Zip query failed after retries; continuing");
                } else {
                    // A 4xx here means the request itself is bad; the
                    // directory fetch already vetted the token, so this is
                    // almost certainly specific to the zip parameter
                    error!(zip, error = %e, "Zip query rejected upstream; continuing");
                }
                metrics::record_zip_failure(zip);
                self.summary.zips_failed += 1;
                self.summary.failed_zips.push(zip.to_string());
                return ZipOutcome::Failed;
            }
        };

        if groups.is_empty() {
            debug!(zip, "No clearance data");
            self.summary.zips_empty += 1;
            return ZipOutcome::Empty;
        }

        let mut new_stores = 0usize;
        let mut duplicates = 0usize;

        for group in groups {
            // First zip in iteration order wins; later sightings of the same
            // store are dropped entirely, not merged
            if !self.seen.insert(group.store.id.clone()) {
                duplicates += 1;
                continue;
            }
            self.summary.unique_stores += 1;
            self.summary.offers += group.offers.len() as u64;
            self.pending.push(group);
            new_stores += 1;
        }

        self.summary.duplicate_groups += duplicates as u64;
        self.summary.zips_with_data += 1;
        ZipOutcome::Success {
            new_stores,
            duplicates,
        }
    }

    fn flush(&mut self) -> HarvestBatch {
        let batch = HarvestBatch {
            sequence: self.next_sequence,
            groups: mem::take(&mut self.pending),
        };
        self.next_sequence += 1;
        self.summary.batches += 1;
        debug!(
            sequence = batch.sequence,
            stores = batch.store_count(),
            offers = batch.offer_count(),
            "Flushing batch"
        );
        batch
    }

    fn abort(&mut self) -> Option<HarvestBatch> {
        info!(
            position = self.position,
            total = self.zip_codes.len(),
            "Shutdown requested - stopping between zip codes"
        );
        self.summary.aborted = true;
        self.pending.clear();
        None
    }
}
