//! Integration tests for batch accumulation and flush thresholds

use clearance_harvester::harvester::Harvester;
use std::time::Duration;

use crate::common::mock_api::{make_group, ScriptedApi, ZipScript};

/// An API where every zip in `zips` returns one single-offer store group.
fn uniform_api(zips: &[String]) -> ScriptedApi {
    let mut api = ScriptedApi::new(Vec::new());
    for zip in zips {
        let store_id = format!("store-{zip}");
        api = api.script(zip, ZipScript::Groups(vec![make_group(&store_id, zip, 1)]));
    }
    api
}

#[tokio::test]
async fn test_45_zips_threshold_20_yields_3_batches() {
    let zips: Vec<String> = (1..=45).map(|i| format!("{i:04}")).collect();
    let api = uniform_api(&zips);

    let mut harvester = Harvester::new(&api, zips, Duration::ZERO, 20);

    let mut sizes = Vec::new();
    let mut sequences = Vec::new();
    while let Some(batch) = harvester.next_batch().await {
        sizes.push(batch.store_count());
        sequences.push(batch.sequence);
    }

    assert_eq!(sizes, vec![20, 20, 5]);
    assert_eq!(sequences, vec![1, 2, 3]);
    assert_eq!(harvester.summary().batches, 3);
}

#[tokio::test]
async fn test_exact_multiple_yields_no_empty_remainder() {
    let zips: Vec<String> = (1..=40).map(|i| format!("{i:04}")).collect();
    let api = uniform_api(&zips);

    let mut harvester = Harvester::new(&api, zips, Duration::ZERO, 20);

    let mut sizes = Vec::new();
    while let Some(batch) = harvester.next_batch().await {
        sizes.push(batch.store_count());
    }
    assert_eq!(sizes, vec![20, 20]);
}

#[tokio::test]
async fn test_empty_window_extends_instead_of_flushing_nothing() {
    // Two empty zips fill a whole window; no empty batch may be emitted
    let api = ScriptedApi::new(Vec::new())
        .script("0001", ZipScript::Empty)
        .script("0002", ZipScript::Empty)
        .script("0003", ZipScript::Groups(vec![make_group("s3", "0003", 1)]));

    let zips = vec!["0001".into(), "0002".into(), "0003".into()];
    let mut harvester = Harvester::new(&api, zips, Duration::ZERO, 2);

    let mut batches = Vec::new();
    while let Some(batch) = harvester.next_batch().await {
        batches.push(batch);
    }

    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].store_count(), 1);
    assert_eq!(harvester.summary().zips_empty, 2);
}

#[tokio::test]
async fn test_all_zips_empty_yields_no_batches() {
    let api = ScriptedApi::new(Vec::new());
    let zips: Vec<String> = (1..=5).map(|i| format!("{i:04}")).collect();

    let mut harvester = Harvester::new(&api, zips, Duration::ZERO, 2);
    assert!(harvester.next_batch().await.is_none());

    let summary = harvester.into_summary();
    assert_eq!(summary.zips_empty, 5);
    assert_eq!(summary.batches, 0);
    assert!(!summary.aborted);
}
