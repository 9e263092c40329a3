//! Scripted in-memory API for exercising the harvest loop without a network

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use clearance_harvester::fetcher::{ClearanceApi, FetchError, FetchResult};
use clearance_harvester::{ClearanceOffer, Store, StoreOffers};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;

/// What a scripted API returns for one zip code.
pub enum ZipScript {
    /// Return these store groups
    Groups(Vec<StoreOffers>),
    /// Return an empty listing
    Empty,
    /// Fail as if retries were exhausted against a flapping upstream
    Fail,
}

/// [`ClearanceApi`] implementation driven entirely by a per-zip script.
///
/// Retries live inside the HTTP client, below this trait; one scripted
/// failure therefore models a zip whose retry budget was exhausted.
pub struct ScriptedApi {
    stores: Vec<Store>,
    fail_directory: bool,
    scripts: HashMap<String, ZipScript>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedApi {
    pub fn new(stores: Vec<Store>) -> Self {
        Self {
            stores,
            fail_directory: false,
            scripts: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Make `fetch_all_stores` fail, modeling an unreachable directory.
    pub fn with_directory_failure(mut self) -> Self {
        self.fail_directory = true;
        self
    }

    pub fn script(mut self, zip: &str, script: ZipScript) -> Self {
        self.scripts.insert(zip.to_string(), script);
        self
    }

    /// Zip codes queried so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClearanceApi for ScriptedApi {
    async fn fetch_all_stores(&self) -> FetchResult<Vec<Store>> {
        if self.fail_directory {
            return Err(FetchError::ServerError {
                status: 503,
                attempts: 5,
            });
        }
        Ok(self.stores.clone())
    }

    async fn fetch_clearances(&self, zip: &str) -> FetchResult<Vec<StoreOffers>> {
        self.calls.lock().unwrap().push(zip.to_string());
        match self.scripts.get(zip) {
            Some(ZipScript::Groups(groups)) => Ok(groups.clone()),
            Some(ZipScript::Empty) | None => Ok(Vec::new()),
            Some(ZipScript::Fail) => Err(FetchError::RateLimited { attempts: 5 }),
        }
    }
}

/// A directory store in the given zip code.
pub fn make_store(id: &str, zip: &str) -> Store {
    Store {
        id: id.to_string(),
        name: format!("Netto {id}"),
        brand: "netto".to_string(),
        street: Some("Hovedgaden 1".to_string()),
        city: Some("København".to_string()),
        zip: Some(zip.to_string()),
        longitude: Some(12.57),
        latitude: Some(55.68),
    }
}

/// One offer at the given store, annotated with the querying zip code.
pub fn make_offer(store_id: &str, zip: &str, description: &str) -> ClearanceOffer {
    ClearanceOffer {
        store_id: store_id.to_string(),
        product_description: description.to_string(),
        category: Some("Dairy".to_string()),
        image_url: Some(format!("https://img.example/{store_id}/{description}.jpg")),
        new_price: Decimal::from_str("10.00").unwrap(),
        original_price: Decimal::from_str("25.00").unwrap(),
        percent_discount: Decimal::from_str("60.00").unwrap(),
        stock: Decimal::from(3),
        stock_unit: "each".to_string(),
        end_time: Utc::now() + ChronoDuration::hours(12),
        queried_zip_code: zip.to_string(),
    }
}

/// A store group with `offer_count` offers, as one per-zip query returns it.
pub fn make_group(store_id: &str, zip: &str, offer_count: usize) -> StoreOffers {
    let offers = (0..offer_count)
        .map(|i| make_offer(store_id, zip, &format!("item-{i}")))
        .collect();
    StoreOffers {
        store: make_store(store_id, zip),
        queried_zip_code: zip.to_string(),
        offers,
    }
}
