//! Wire-format parsing for Salling Group API payloads
//!
//! Upstream JSON is deserialized into explicit raw structs and converted to
//! domain types at this boundary. Records missing required fields are
//! rejected here (callers quarantine them with a warning) rather than letting
//! loosely-typed payloads propagate downstream. The two-element
//! `[longitude, latitude]` coordinate array becomes scalar fields; the
//! combined form never leaves this module.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use std::str::FromStr;

use crate::{ClearanceOffer, Store, StoreOffers};

/// A number the upstream serializes as either a JSON number or a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Num(f64),
    Str(String),
}

fn lenient_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<NumberOrString>::deserialize(deserializer)?;
    Ok(match value {
        Some(NumberOrString::Num(f)) => Decimal::try_from(f).ok(),
        Some(NumberOrString::Str(s)) => Decimal::from_str(s.trim()).ok(),
        None => None,
    })
}

/// Nested address object shared by both endpoints.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawAddress {
    /// Street line
    pub street: Option<String>,
    /// City name
    pub city: Option<String>,
    /// Postal code
    pub zip: Option<String>,
}

/// Store object as both endpoints report it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawStore {
    /// Stable identifier
    pub id: Option<String>,
    /// Display name
    pub name: Option<String>,
    /// Chain identifier
    pub brand: Option<String>,
    /// Nested address
    #[serde(default)]
    pub address: RawAddress,
    /// Two-element `[longitude, latitude]` pair
    pub coordinates: Option<Vec<f64>>,
}

/// One clearance listing inside a food-waste group.
#[derive(Debug, Clone, Deserialize)]
pub struct RawClearance {
    /// Pricing and stock details
    pub offer: RawOffer,
    /// Product details
    pub product: RawProduct,
}

/// Offer half of a clearance listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOffer {
    /// Discounted price
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub new_price: Option<Decimal>,
    /// Price before discount
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub original_price: Option<Decimal>,
    /// Discount percentage; arrives as number or string in the wild
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub percent_discount: Option<Decimal>,
    /// Remaining stock; fractional for weight-based goods
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub stock: Option<Decimal>,
    /// Unit for `stock`
    pub stock_unit: Option<String>,
    /// Offer expiry timestamp (RFC 3339)
    pub end_time: Option<String>,
}

/// Product half of a clearance listing.
#[derive(Debug, Clone, Deserialize)]
pub struct RawProduct {
    /// Product description
    pub description: Option<String>,
    /// Image URL
    pub image: Option<String>,
    /// Localized category names
    #[serde(default)]
    pub categories: RawCategories,
}

/// Localized category names.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawCategories {
    /// English category path
    pub en: Option<String>,
}

/// One element of the food-waste response: a store plus its clearances.
#[derive(Debug, Clone, Deserialize)]
pub struct RawClearanceGroup {
    /// The store the listings belong to
    pub store: RawStore,
    /// Current clearance listings
    #[serde(default)]
    pub clearances: Vec<RawClearance>,
}

/// Convert a raw store, splitting the coordinate pair into scalar fields.
///
/// Returns a description of the missing field when the record is unusable.
pub fn parse_store(raw: RawStore) -> Result<Store, String> {
    let id = raw
        .id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "store record missing id".to_string())?;
    let name = raw
        .name
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("store {id} missing name"))?;
    let brand = raw.brand.unwrap_or_else(|| "unknown".to_string());

    let (longitude, latitude) = split_coordinates(raw.coordinates.as_deref());

    Ok(Store {
        id,
        name,
        brand,
        street: raw.address.street,
        city: raw.address.city,
        zip: raw.address.zip,
        longitude,
        latitude,
    })
}

/// Convert a raw food-waste group, annotating it with the zip code that
/// produced it.
///
/// Listings missing required fields are dropped individually; the returned
/// count says how many were quarantined. The group itself fails only when
/// the embedded store identity is unusable.
pub fn parse_group(raw: RawClearanceGroup, zip: &str) -> Result<(StoreOffers, usize), String> {
    let store = parse_store(raw.store)?;

    let mut offers = Vec::with_capacity(raw.clearances.len());
    let mut quarantined = 0usize;

    for clearance in raw.clearances {
        match parse_clearance(clearance, &store.id, zip) {
            Ok(offer) => offers.push(offer),
            Err(_) => quarantined += 1,
        }
    }

    Ok((
        StoreOffers {
            store,
            queried_zip_code: zip.to_string(),
            offers,
        },
        quarantined,
    ))
}

fn parse_clearance(raw: RawClearance, store_id: &str, zip: &str) -> Result<ClearanceOffer, String> {
    let product_description = raw
        .product
        .description
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("clearance at store {store_id} missing description"))?;
    let new_price = raw
        .offer
        .new_price
        .ok_or_else(|| format!("clearance '{product_description}' missing newPrice"))?;
    let original_price = raw
        .offer
        .original_price
        .ok_or_else(|| format!("clearance '{product_description}' missing originalPrice"))?;
    let end_time = parse_end_time(raw.offer.end_time.as_deref())
        .ok_or_else(|| format!("clearance '{product_description}' has unusable endTime"))?;

    // Upstream occasionally omits percentDiscount; derive it from the prices
    let percent_discount = raw.offer.percent_discount.unwrap_or_else(|| {
        if original_price > Decimal::ZERO {
            ((original_price - new_price) / original_price * Decimal::ONE_HUNDRED).round_dp(2)
        } else {
            Decimal::ZERO
        }
    });

    Ok(ClearanceOffer {
        store_id: store_id.to_string(),
        product_description,
        category: raw.product.categories.en,
        image_url: raw.product.image.filter(|s| !s.is_empty()),
        new_price,
        original_price,
        percent_discount,
        stock: raw.offer.stock.unwrap_or(Decimal::ZERO),
        stock_unit: raw.offer.stock_unit.unwrap_or_else(|| "each".to_string()),
        end_time,
        queried_zip_code: zip.to_string(),
    })
}

fn parse_end_time(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Split a `[longitude, latitude]` pair into scalars; anything shorter than
/// two elements yields neither.
fn split_coordinates(coords: Option<&[f64]>) -> (Option<f64>, Option<f64>) {
    match coords {
        Some([lon, lat, ..]) => (Some(*lon), Some(*lat)),
        _ => (None, None),
    }
}
