//! Generation-versioned CSV dataset sink
//!
//! Layout under the dataset root:
//!
//! ```text
//! <root>/
//!   .lock            advisory lock serializing concurrent runs
//!   LATEST           name of the last fully committed generation
//!   gen-<millis>/
//!     stores.csv
//!     clearances.csv
//! ```
//!
//! Each run writes into a fresh `gen-<millis>` directory. `LATEST` is only
//! updated, via temp file plus rename, after every row of the new generation
//! is flushed and synced, so readers that resolve the pointer never observe
//! a half-written snapshot. Superseded generation directories are left in
//! place for inspection and can be pruned out of band.

use csv::Writer;
use fd_lock::RwLock;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{DatasetSink, SinkError, SinkResult};
use crate::{HarvestBatch, Store};

const STORES_FILE: &str = "stores.csv";
const CLEARANCES_FILE: &str = "clearances.csv";
const LATEST_FILE: &str = "LATEST";
const LOCK_FILE: &str = ".lock";
const BUFFER_SIZE: usize = 8192;

/// Flat CSV row for the store table.
#[derive(Debug, Serialize)]
struct StoreRecord<'a> {
    id: &'a str,
    name: &'a str,
    brand: &'a str,
    street: Option<&'a str>,
    city: Option<&'a str>,
    zip: Option<&'a str>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl<'a> From<&'a Store> for StoreRecord<'a> {
    fn from(store: &'a Store) -> Self {
        Self {
            id: &store.id,
            name: &store.name,
            brand: &store.brand,
            street: store.street.as_deref(),
            city: store.city.as_deref(),
            zip: store.zip.as_deref(),
            latitude: store.latitude,
            longitude: store.longitude,
        }
    }
}

/// Flat CSV row for the clearance table, parent-linked via `store_id`.
#[derive(Debug, Serialize)]
struct OfferRecord {
    store_id: String,
    product_description: String,
    category: Option<String>,
    image_url: Option<String>,
    new_price: String,
    original_price: String,
    percent_discount: String,
    stock: String,
    stock_unit: String,
    end_time: String,
    queried_zip_code: String,
}

/// Advisory lock preventing two runs from writing the same dataset root.
///
/// The flock is held for as long as this value lives: the write guard is
/// forgotten rather than dropped, so the file descriptor stays locked until
/// the owned lock file closes on drop.
struct DatasetLock {
    _lock: RwLock<File>,
}

impl DatasetLock {
    /// Try to acquire without blocking; a held lock means another harvest is
    /// in progress and this run must not proceed.
    fn try_acquire(root: &Path) -> SinkResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(root.join(LOCK_FILE))
            .map_err(|e| SinkError::LockError(format!("failed to open lock file: {e}")))?;

        let mut lock = RwLock::new(file);
        let guard = lock.try_write().map_err(|e| {
            SinkError::LockError(format!(
                "dataset is locked (another harvest in progress?): {e}"
            ))
        })?;
        // The guard cannot be stored alongside the lock it borrows; leak it
        // so the fd remains locked, and let closing the fd release the flock
        std::mem::forget(guard);

        Ok(Self { _lock: lock })
    }
}

enum RunPhase {
    AwaitingStores,
    WritingOffers {
        writer: Option<Writer<BufWriter<File>>>,
    },
    Committed,
}

/// CSV sink writing one dataset generation per run.
pub struct CsvDatasetSink {
    root: PathBuf,
    generation: String,
    gen_dir: PathBuf,
    phase: RunPhase,
    stores_written: u64,
    offers_written: u64,
    _lock: DatasetLock,
}

impl CsvDatasetSink {
    /// Open the dataset root and begin a new in-progress generation.
    pub fn open<P: Into<PathBuf>>(root: P) -> SinkResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| SinkError::IoError(format!("failed to create dataset root: {e}")))?;

        let lock = DatasetLock::try_acquire(&root)?;

        // Disambiguate runs that start within the same millisecond
        let stamp = chrono::Utc::now().timestamp_millis();
        let mut generation = format!("gen-{stamp}");
        let mut gen_dir = root.join(&generation);
        let mut suffix = 1u32;
        while gen_dir.exists() {
            generation = format!("gen-{stamp}-{suffix}");
            gen_dir = root.join(&generation);
            suffix += 1;
        }
        std::fs::create_dir_all(&gen_dir)
            .map_err(|e| SinkError::IoError(format!("failed to create generation dir: {e}")))?;

        info!(root = %root.display(), %generation, "Began new dataset generation");

        Ok(Self {
            root,
            generation,
            gen_dir,
            phase: RunPhase::AwaitingStores,
            stores_written: 0,
            offers_written: 0,
            _lock: lock,
        })
    }

    /// Resolve the last fully committed generation under a dataset root.
    pub fn latest_generation(root: &Path) -> SinkResult<Option<PathBuf>> {
        let pointer = root.join(LATEST_FILE);
        if !pointer.exists() {
            return Ok(None);
        }
        let name = std::fs::read_to_string(&pointer)
            .map_err(|e| SinkError::IoError(format!("failed to read LATEST: {e}")))?;
        let dir = root.join(name.trim());
        if dir.is_dir() {
            Ok(Some(dir))
        } else {
            Err(SinkError::IoError(format!(
                "LATEST points at missing generation {}",
                name.trim()
            )))
        }
    }

    /// Path of the clearance table inside a generation directory.
    pub fn clearances_path(gen_dir: &Path) -> PathBuf {
        gen_dir.join(CLEARANCES_FILE)
    }

    fn create_writer(&self, file_name: &str) -> SinkResult<Writer<BufWriter<File>>> {
        let path = self.gen_dir.join(file_name);
        let file = File::create(&path)
            .map_err(|e| SinkError::IoError(format!("failed to create {file_name}: {e}")))?;
        Ok(Writer::from_writer(BufWriter::with_capacity(
            BUFFER_SIZE,
            file,
        )))
    }

    fn close_writer(writer: Writer<BufWriter<File>>) -> SinkResult<()> {
        let buf_writer = writer
            .into_inner()
            .map_err(|e| SinkError::FlushError(format!("failed to finish CSV stream: {e}")))?;
        let file = buf_writer
            .into_inner()
            .map_err(|e| SinkError::FlushError(format!("failed to flush buffer: {e}")))?;
        file.sync_all()
            .map_err(|e| SinkError::IoError(format!("failed to sync file: {e}")))
    }

    /// Atomic pointer update: write to a temp file, then rename over LATEST.
    fn write_latest_pointer(&self) -> SinkResult<()> {
        let tmp = self.root.join(format!("{LATEST_FILE}.tmp"));
        let mut file = File::create(&tmp)
            .map_err(|e| SinkError::IoError(format!("failed to create pointer temp: {e}")))?;
        writeln!(file, "{}", self.generation)
            .map_err(|e| SinkError::IoError(format!("failed to write pointer: {e}")))?;
        file.sync_all()
            .map_err(|e| SinkError::IoError(format!("failed to sync pointer: {e}")))?;
        std::fs::rename(&tmp, self.root.join(LATEST_FILE))
            .map_err(|e| SinkError::IoError(format!("failed to publish pointer: {e}")))
    }
}

impl DatasetSink for CsvDatasetSink {
    fn write_stores(&mut self, stores: &[Store]) -> SinkResult<()> {
        if !matches!(self.phase, RunPhase::AwaitingStores) {
            return Err(SinkError::ProtocolError(
                "store directory already written for this generation".to_string(),
            ));
        }

        let mut writer = self.create_writer(STORES_FILE)?;
        for store in stores {
            writer
                .serialize(StoreRecord::from(store))
                .map_err(|e| SinkError::CsvError(format!("failed to write store row: {e}")))?;
            self.stores_written += 1;
        }
        Self::close_writer(writer)?;

        debug!(stores = self.stores_written, "Store table written");
        self.phase = RunPhase::WritingOffers { writer: None };
        Ok(())
    }

    fn write_offer_batch(&mut self, batch: &HarvestBatch) -> SinkResult<()> {
        let writer_slot = match &mut self.phase {
            RunPhase::WritingOffers { writer } => writer,
            _ => {
                return Err(SinkError::ProtocolError(
                    "offer batch written before store directory".to_string(),
                ))
            }
        };

        if writer_slot.is_none() {
            let path = self.gen_dir.join(CLEARANCES_FILE);
            let file = File::create(&path).map_err(|e| {
                SinkError::IoError(format!("failed to create {CLEARANCES_FILE}: {e}"))
            })?;
            *writer_slot = Some(Writer::from_writer(BufWriter::with_capacity(
                BUFFER_SIZE,
                file,
            )));
        }
        let writer = writer_slot.as_mut().expect("writer initialized above");

        for group in &batch.groups {
            for offer in &group.offers {
                let record = OfferRecord {
                    store_id: offer.store_id.clone(),
                    product_description: offer.product_description.clone(),
                    category: offer.category.clone(),
                    image_url: offer.image_url.clone(),
                    new_price: offer.new_price.to_string(),
                    original_price: offer.original_price.to_string(),
                    percent_discount: offer.percent_discount.to_string(),
                    stock: offer.stock.to_string(),
                    stock_unit: offer.stock_unit.clone(),
                    end_time: offer.end_time.to_rfc3339(),
                    queried_zip_code: offer.queried_zip_code.clone(),
                };
                writer
                    .serialize(record)
                    .map_err(|e| SinkError::CsvError(format!("failed to write offer row: {e}")))?;
                self.offers_written += 1;
            }
        }

        // Flush after every batch so each flush is a durable checkpoint
        writer
            .flush()
            .map_err(|e| SinkError::FlushError(format!("failed to flush batch: {e}")))?;

        debug!(
            sequence = batch.sequence,
            offers_total = self.offers_written,
            "Offer batch appended"
        );
        Ok(())
    }

    fn commit(mut self) -> SinkResult<String> {
        let writer = match std::mem::replace(&mut self.phase, RunPhase::Committed) {
            RunPhase::AwaitingStores => {
                return Err(SinkError::ProtocolError(
                    "cannot commit before the store directory is written".to_string(),
                ))
            }
            RunPhase::WritingOffers { writer } => writer,
            RunPhase::Committed => unreachable!("commit consumes the sink"),
        };

        // A run with zero offer batches still commits; the clearance table is
        // then absent from the generation
        if let Some(writer) = writer {
            Self::close_writer(writer)?;
        }

        self.write_latest_pointer()?;

        info!(
            generation = %self.generation,
            stores = self.stores_written,
            offers = self.offers_written,
            "Dataset generation committed"
        );
        Ok(self.generation.clone())
    }
}
