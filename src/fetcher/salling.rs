//! Production [`ClearanceApi`] implementation backed by the Salling Group API.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::HarvesterConfig;
use crate::fetcher::http::SallingHttpClient;
use crate::fetcher::parser::{self, RawClearanceGroup, RawStore};
use crate::fetcher::{ClearanceApi, FetchError, FetchResult};
use crate::{Store, StoreOffers};

/// Cap on directory pagination to guard against a cyclic `Link` chain.
const MAX_DIRECTORY_PAGES: usize = 50;

/// Salling Group API client covering both upstream endpoints.
pub struct SallingApi {
    http: SallingHttpClient,
    stores_url: String,
    food_waste_url: String,
    country: String,
    per_page: u32,
}

impl SallingApi {
    /// Build the API client from the run configuration.
    pub fn new(config: &HarvesterConfig) -> FetchResult<Self> {
        Ok(Self {
            http: SallingHttpClient::new(config)?,
            stores_url: config.stores_url(),
            food_waste_url: config.food_waste_url(),
            country: config.country.clone(),
            per_page: config.per_page,
        })
    }
}

#[async_trait]
impl ClearanceApi for SallingApi {
    /// One logical bulk fetch of the directory; a single page normally covers
    /// the observed volume, but `Link: rel="next"` headers are followed when
    /// the upstream caps the page size.
    async fn fetch_all_stores(&self) -> FetchResult<Vec<Store>> {
        let params = [
            ("per_page", self.per_page.to_string()),
            ("country", self.country.clone()),
        ];

        let mut stores = Vec::new();
        let mut quarantined = 0usize;
        let mut next_url: Option<String> = None;
        let mut pages = 0usize;

        loop {
            if pages >= MAX_DIRECTORY_PAGES {
                return Err(FetchError::ParseError(format!(
                    "directory pagination exceeded {MAX_DIRECTORY_PAGES} pages; \
                     aborting to avoid a link cycle"
                )));
            }
            pages += 1;

            let (raw_page, next) = match &next_url {
                // Pagination links already carry the query string
                Some(url) => self.http.get_page::<Vec<RawStore>>(url, &[]).await?,
                None => {
                    self.http
                        .get_page::<Vec<RawStore>>(&self.stores_url, &params)
                        .await?
                }
            };

            debug!(page = pages, stores = raw_page.len(), "Fetched directory page");

            for raw in raw_page {
                match parser::parse_store(raw) {
                    Ok(store) => stores.push(store),
                    Err(reason) => {
                        warn!(%reason, "Quarantined store record");
                        quarantined += 1;
                    }
                }
            }

            match next {
                Some(url) => next_url = Some(url),
                None => break,
            }
        }

        info!(
            stores = stores.len(),
            quarantined, pages, "Store directory fetched"
        );
        Ok(stores)
    }

    async fn fetch_clearances(&self, zip: &str) -> FetchResult<Vec<StoreOffers>> {
        let params = [("zip", zip.to_string())];
        let raw_groups: Vec<RawClearanceGroup> =
            self.http.get(&self.food_waste_url, &params).await?;

        let mut groups = Vec::with_capacity(raw_groups.len());
        let mut quarantined_offers = 0usize;

        for raw in raw_groups {
            match parser::parse_group(raw, zip) {
                Ok((group, quarantined)) => {
                    quarantined_offers += quarantined;
                    groups.push(group);
                }
                Err(reason) => {
                    warn!(zip, %reason, "Quarantined clearance group");
                }
            }
        }

        if quarantined_offers > 0 {
            debug!(zip, quarantined_offers, "Dropped incomplete listings");
        }
        Ok(groups)
    }
}
