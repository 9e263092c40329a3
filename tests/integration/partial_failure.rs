//! Integration tests for failure tolerance: skippable zips vs fatal errors

use clearance_harvester::config::HarvesterConfig;
use clearance_harvester::harvester::{HarvestExecutor, RunError};
use clearance_harvester::sink::csv::CsvDatasetSink;
use std::time::Duration;

use crate::common::mock_api::{make_group, make_store, ScriptedApi, ZipScript};

fn test_config() -> HarvesterConfig {
    HarvesterConfig::new("test-token").with_request_delay(Duration::ZERO)
}

#[tokio::test]
async fn test_failed_zip_skipped_run_continues() {
    let dir = tempfile::TempDir::new().unwrap();

    let api = ScriptedApi::new(vec![make_store("s1", "0500"), make_store("s2", "0600")])
        .script("0500", ZipScript::Fail)
        .script("0600", ZipScript::Groups(vec![make_group("s2", "0600", 2)]));
    let sink = CsvDatasetSink::open(dir.path()).unwrap();

    let report = HarvestExecutor::new(api, sink, test_config())
        .run()
        .await
        .unwrap();

    assert_eq!(report.status(), "completed with partial failures");
    assert_eq!(report.summary.zips_failed, 1);
    assert_eq!(report.summary.failed_zips, vec!["0500"]);
    assert_eq!(report.summary.unique_stores, 1);
    assert_eq!(report.summary.offers, 2);

    // A partially failed run still commits what it harvested
    let latest = CsvDatasetSink::latest_generation(dir.path())
        .unwrap()
        .unwrap();
    assert!(CsvDatasetSink::clearances_path(&latest).exists());
}

#[tokio::test]
async fn test_all_zips_failed_still_commits_empty_harvest() {
    let dir = tempfile::TempDir::new().unwrap();

    let api = ScriptedApi::new(vec![make_store("s1", "0500"), make_store("s2", "0600")])
        .script("0500", ZipScript::Fail)
        .script("0600", ZipScript::Fail);
    let sink = CsvDatasetSink::open(dir.path()).unwrap();

    let report = HarvestExecutor::new(api, sink, test_config())
        .run()
        .await
        .unwrap();

    assert_eq!(report.summary.zips_failed, 2);
    assert_eq!(report.summary.offers, 0);
    // The directory snapshot alone is still a valid generation
    let latest = CsvDatasetSink::latest_generation(dir.path())
        .unwrap()
        .unwrap();
    assert!(latest.join("stores.csv").exists());
}

#[tokio::test]
async fn test_directory_failure_is_fatal() {
    let dir = tempfile::TempDir::new().unwrap();

    let api = ScriptedApi::new(vec![make_store("s1", "0500")]).with_directory_failure();
    let sink = CsvDatasetSink::open(dir.path()).unwrap();

    let result = HarvestExecutor::new(api, sink, test_config()).run().await;

    assert!(matches!(result, Err(RunError::UpstreamUnavailable(_))));
    // Nothing was committed
    assert!(CsvDatasetSink::latest_generation(dir.path())
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_failed_zip_does_not_poison_dedup() {
    // s1's home zip fails, but s1 is also visible from the neighbouring zip;
    // it must still be harvested there
    let dir = tempfile::TempDir::new().unwrap();

    let api = ScriptedApi::new(vec![make_store("s1", "0500"), make_store("s2", "0600")])
        .script("0500", ZipScript::Fail)
        .script(
            "0600",
            ZipScript::Groups(vec![make_group("s2", "0600", 1), make_group("s1", "0600", 1)]),
        );
    let sink = CsvDatasetSink::open(dir.path()).unwrap();

    let report = HarvestExecutor::new(api, sink, test_config())
        .run()
        .await
        .unwrap();

    assert_eq!(report.summary.unique_stores, 2);
    assert!(report.summary.has_partial_failures());
}
