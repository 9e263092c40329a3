//! Zip-code enumeration
//!
//! Decouples "where stores are" from "what to query": the harvest iterates
//! the distinct zip codes of the directory snapshot, not the stores
//! themselves.

use crate::Store;
use std::collections::BTreeSet;

/// Derive the ordered set of zip codes to query from a directory snapshot.
///
/// Deduplicated, ascending lexicographic order (diff-friendly across runs);
/// null and empty zips are omitted. Pure function, no network access.
pub fn derive_zip_codes(stores: &[Store]) -> Vec<String> {
    stores
        .iter()
        .filter_map(|s| s.zip.as_deref())
        .filter(|z| !z.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
