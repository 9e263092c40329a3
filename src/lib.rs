//! # Clearance Harvester Library
//!
//! Ingests near-expiry "clearance" offers from the Salling Group public API
//! and persists deduplicated, generation-versioned snapshots of stores and
//! offers for downstream consumers.
//!
//! ## Features
//!
//! - **Two-stage ingestion**: full store directory fetch seeds a per-zip-code
//!   clearance harvest
//! - **Rate-Limit Aware**: fixed inter-request delay plus `Retry-After`-honoring
//!   retry with exponential backoff
//! - **Deterministic Dedup**: overlapping zip-code catchments resolved with
//!   first-seen-wins in zip iteration order
//! - **Atomic Snapshots**: each run writes a fresh dataset generation; readers
//!   only ever see the last fully committed one
//! - **Partial-Failure Tolerant**: one zip code failing never aborts the run
//!
//! ## Quick Start
//!
//! ```no_run
//! use clearance_harvester::config::HarvesterConfig;
//! use clearance_harvester::fetcher::salling::SallingApi;
//! use clearance_harvester::harvester::executor::HarvestExecutor;
//! use clearance_harvester::sink::csv::CsvDatasetSink;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HarvesterConfig::new("my-api-token");
//! let api = SallingApi::new(&config)?;
//! let sink = CsvDatasetSink::open("./data/food_waste")?;
//!
//! let report = HarvestExecutor::new(api, sink, config).run().await?;
//! println!("harvested {} unique stores", report.summary.unique_stores);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`fetcher`] - HTTP access to the Salling Group API with retry/backoff
//! - [`harvester`] - zip enumeration and the per-zip harvesting state machine
//! - [`sink`] - generation-versioned dataset writers
//! - [`images`] - companion product-image downloader (bounded worker pool)
//! - [`cli`] - command implementations
//!
//! ## Data Types
//!
//! - [`Store`] - a physical retail location from the store directory
//! - [`ClearanceOffer`] - one discounted product listing at one store
//! - [`StoreOffers`] - a store together with its current clearance offers
//! - [`HarvestBatch`] - a bounded accumulation of groups handed to the sink

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// CLI command implementations
pub mod cli;

/// Explicit run configuration
pub mod config;

/// Upstream API access
pub mod fetcher;

/// Zip enumeration and the harvesting state machine
pub mod harvester;

/// Companion product-image downloader
pub mod images;

/// Prometheus metrics emission
pub mod metrics;

/// Dataset sinks
pub mod sink;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

pub use config::HarvesterConfig;
pub use fetcher::{ClearanceApi, FetchError, FetchResult};

/// A physical retail location from the store directory.
///
/// The upstream coordinate pair `[longitude, latitude]` is split into scalar
/// fields at the ingestion boundary; the combined field never reaches storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Store {
    /// Stable external identifier, unique across a directory snapshot
    pub id: String,
    /// Display name (e.g., "Netto Østerbro")
    pub name: String,
    /// Chain identifier (e.g., "netto", "foetex", "bilka")
    pub brand: String,
    /// Street address, if reported
    pub street: Option<String>,
    /// City, if reported
    pub city: Option<String>,
    /// Postal code; the harvesting partition key
    pub zip: Option<String>,
    /// Longitude, absent when the source omits coordinates
    pub longitude: Option<f64>,
    /// Latitude, absent when the source omits coordinates
    pub latitude: Option<f64>,
}

impl Store {
    /// Validate store data integrity
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("Store id cannot be empty".to_string());
        }
        if self.name.is_empty() {
            return Err(format!("Store {} has an empty name", self.id));
        }
        Ok(())
    }
}

/// A discounted product listing tied to one store at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClearanceOffer {
    /// Identifier of the store this offer belongs to
    pub store_id: String,
    /// Product description as reported by the store
    pub product_description: String,
    /// Product category (English), if reported
    pub category: Option<String>,
    /// Product image URL; may be absent or stale upstream
    pub image_url: Option<String>,
    /// Discounted price
    pub new_price: Decimal,
    /// Price before discount
    pub original_price: Decimal,
    /// Discount percentage
    pub percent_discount: Decimal,
    /// Remaining stock; fractional for weight-based goods
    pub stock: Decimal,
    /// Unit for `stock` (e.g., "each", "kg")
    pub stock_unit: String,
    /// Offer expiry; drives recency ordering downstream
    pub end_time: DateTime<Utc>,
    /// The zip code whose query produced this offer
    pub queried_zip_code: String,
}

impl ClearanceOffer {
    /// Validate offer data integrity
    pub fn validate(&self) -> Result<(), String> {
        if self.store_id.is_empty() {
            return Err("Offer store_id cannot be empty".to_string());
        }
        if self.product_description.is_empty() {
            return Err(format!(
                "Offer at store {} has an empty product description",
                self.store_id
            ));
        }
        if self.new_price < Decimal::ZERO {
            return Err(format!("Negative new_price: {}", self.new_price));
        }
        if self.original_price < Decimal::ZERO {
            return Err(format!("Negative original_price: {}", self.original_price));
        }
        Ok(())
    }

    /// Whether the offer is still purchasable. Offers with non-positive stock
    /// are written to the dataset as-is; filtering is a read-time concern.
    pub fn is_available(&self) -> bool {
        self.stock > Decimal::ZERO
    }
}

/// A store together with its current clearance offers, as returned by one
/// per-zip query and annotated with the zip code that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreOffers {
    /// The store the offers belong to
    pub store: Store,
    /// The zip code whose query returned this group
    pub queried_zip_code: String,
    /// Offers currently listed at the store
    pub offers: Vec<ClearanceOffer>,
}

/// A transient accumulation of newly harvested groups handed to the sink.
///
/// Exists only during a run; never persisted as its own entity.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestBatch {
    /// 1-based position of this batch within the run
    pub sequence: u32,
    /// Deduplicated store groups accumulated since the last flush
    pub groups: Vec<StoreOffers>,
}

impl HarvestBatch {
    /// Number of distinct stores in this batch
    pub fn store_count(&self) -> usize {
        self.groups.len()
    }

    /// Total offers across all groups in this batch
    pub fn offer_count(&self) -> usize {
        self.groups.iter().map(|g| g.offers.len()).sum()
    }
}
