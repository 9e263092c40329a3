//! Dataset sinks
//!
//! A sink receives one run's worth of writes as an in-progress dataset
//! generation. The store directory is written once (replace semantics); offer
//! batches append within the same generation; `commit` atomically makes the
//! generation the one readers resolve. Until then (and forever, if the run
//! aborts) readers keep seeing the previously committed generation.

use crate::{HarvestBatch, Store};

pub mod csv;

/// Sink errors. Any of these is fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// CSV write error
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Another process holds the dataset lock
    #[error("lock error: {0}")]
    LockError(String),

    /// Buffer flush error
    #[error("flush error: {0}")]
    FlushError(String),

    /// Write ordering violated (stores must precede offer batches)
    #[error("protocol error: {0}")]
    ProtocolError(String),
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// One run's write surface over a dataset.
pub trait DatasetSink {
    /// Write the full store directory snapshot (replace disposition).
    /// Must be called exactly once, before any offer batch.
    fn write_stores(&mut self, stores: &[Store]) -> SinkResult<()>;

    /// Append one harvested batch to the in-progress generation.
    fn write_offer_batch(&mut self, batch: &HarvestBatch) -> SinkResult<()>;

    /// Finalize the generation and atomically make it the latest.
    /// Returns the committed generation's identifier.
    fn commit(self) -> SinkResult<String>;
}
