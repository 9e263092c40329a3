//! Harvest orchestration
//!
//! The harvesting run is a three-stage pipeline:
//!
//! 1. **Directory**: fetch the full store directory (fatal if unavailable)
//! 2. **Enumeration**: derive the ordered zip-code list from the directory
//! 3. **Harvest**: drive one clearance query per zip code through the
//!    rate-limited client, deduplicating stores first-seen-wins and flushing
//!    bounded batches to the sink
//!
//! Per-zip failures are absorbed into the run summary; only directory and
//! persistence failures abort a run.
//!
//! - [`zipcodes`] - pure zip enumeration
//! - [`run`] - the per-zip state machine ([`run::Harvester`])
//! - [`executor`] - end-to-end run driver ([`executor::HarvestExecutor`])

use crate::fetcher::FetchError;
use crate::sink::SinkError;

pub mod executor;
pub mod run;
pub mod zipcodes;

pub use executor::{HarvestExecutor, RunReport};
pub use run::{HarvestSummary, Harvester};

/// Errors that abort a harvesting run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The store directory could not be obtained at all. There is no
    /// meaningful partial directory, so the run cannot proceed.
    #[error("store directory unavailable: {0}")]
    UpstreamUnavailable(#[source] FetchError),

    /// A sink write failed; the previous generation remains the latest.
    #[error("persistence error: {0}")]
    Persistence(#[from] SinkError),

    /// Shutdown was requested between zip codes; nothing was committed.
    #[error("run aborted by shutdown request")]
    Aborted,
}
