//! Unit tests for zip-code enumeration over directory snapshots

use clearance_harvester::harvester::zipcodes::derive_zip_codes;

use crate::common::mock_api::make_store;

#[test]
fn test_zip_order_is_stable_across_directory_order() {
    // The query sequence must not depend on how the directory happens to be
    // ordered upstream
    let a = derive_zip_codes(&[
        make_store("s1", "8000"),
        make_store("s2", "2100"),
        make_store("s3", "0500"),
    ]);
    let b = derive_zip_codes(&[
        make_store("s3", "0500"),
        make_store("s1", "8000"),
        make_store("s2", "2100"),
    ]);
    assert_eq!(a, b);
    assert_eq!(a, vec!["0500", "2100", "8000"]);
}

#[test]
fn test_zip_codes_sort_lexicographically() {
    // Danish zips are zero-padded strings; "0500" sorts before "2100"
    let zips = derive_zip_codes(&[make_store("s1", "2100"), make_store("s2", "0500")]);
    assert_eq!(zips, vec!["0500", "2100"]);
}

#[test]
fn test_many_stores_one_zip() {
    let stores: Vec<_> = (0..50).map(|i| make_store(&format!("s{i}"), "2100")).collect();
    assert_eq!(derive_zip_codes(&stores), vec!["2100"]);
}
