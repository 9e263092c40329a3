//! Integration tests for generation-versioned persistence and abort safety

use clearance_harvester::config::HarvesterConfig;
use clearance_harvester::harvester::{HarvestExecutor, RunError};
use clearance_harvester::shutdown::ShutdownCoordinator;
use clearance_harvester::sink::csv::CsvDatasetSink;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::common::mock_api::{make_group, make_store, ScriptedApi, ZipScript};

fn test_config() -> HarvesterConfig {
    HarvesterConfig::new("test-token").with_request_delay(Duration::ZERO)
}

fn two_zip_api() -> ScriptedApi {
    ScriptedApi::new(vec![make_store("s1", "2100"), make_store("s2", "8000")])
        .script("2100", ZipScript::Groups(vec![make_group("s1", "2100", 2)]))
        .script("8000", ZipScript::Groups(vec![make_group("s2", "8000", 1)]))
}

fn read_column(path: &Path, column: &str) -> Vec<String> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let headers = reader.headers().unwrap().clone();
    let idx = headers.iter().position(|h| h == column).unwrap();
    reader
        .records()
        .map(|r| r.unwrap().get(idx).unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_commit_publishes_generation() {
    let dir = tempfile::TempDir::new().unwrap();
    let sink = CsvDatasetSink::open(dir.path()).unwrap();

    let report = HarvestExecutor::new(two_zip_api(), sink, test_config())
        .run()
        .await
        .unwrap();

    let latest = CsvDatasetSink::latest_generation(dir.path())
        .unwrap()
        .unwrap();
    assert_eq!(
        latest.file_name().unwrap().to_str().unwrap(),
        report.generation
    );

    let store_ids = read_column(&latest.join("stores.csv"), "id");
    assert_eq!(store_ids, vec!["s1", "s2"]);

    let offer_zips = read_column(&CsvDatasetSink::clearances_path(&latest), "queried_zip_code");
    assert_eq!(offer_zips, vec!["2100", "2100", "8000"]);
}

#[tokio::test]
async fn test_second_run_supersedes_first() {
    let dir = tempfile::TempDir::new().unwrap();

    let sink = CsvDatasetSink::open(dir.path()).unwrap();
    let first = HarvestExecutor::new(two_zip_api(), sink, test_config())
        .run()
        .await
        .unwrap();

    let sink = CsvDatasetSink::open(dir.path()).unwrap();
    let second = HarvestExecutor::new(two_zip_api(), sink, test_config())
        .run()
        .await
        .unwrap();

    assert_ne!(first.generation, second.generation);

    let latest = CsvDatasetSink::latest_generation(dir.path())
        .unwrap()
        .unwrap();
    assert_eq!(
        latest.file_name().unwrap().to_str().unwrap(),
        second.generation
    );
    // The superseded generation stays on disk for inspection
    assert!(dir.path().join(&first.generation).is_dir());
}

#[tokio::test]
async fn test_aborted_run_never_commits() {
    let dir = tempfile::TempDir::new().unwrap();

    // Publish a first generation, then abort a second run before it starts
    let sink = CsvDatasetSink::open(dir.path()).unwrap();
    let first = HarvestExecutor::new(two_zip_api(), sink, test_config())
        .run()
        .await
        .unwrap();

    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();

    let sink = CsvDatasetSink::open(dir.path()).unwrap();
    let result = HarvestExecutor::new(two_zip_api(), sink, test_config())
        .with_shutdown(shutdown)
        .run()
        .await;
    assert!(matches!(result, Err(RunError::Aborted)));

    // Readers still resolve the previously committed generation
    let latest = CsvDatasetSink::latest_generation(dir.path())
        .unwrap()
        .unwrap();
    assert_eq!(
        latest.file_name().unwrap().to_str().unwrap(),
        first.generation
    );
}

#[tokio::test]
async fn test_no_duplicate_store_ids_in_clearance_table() {
    let dir = tempfile::TempDir::new().unwrap();

    // s1 shows up from both zips; only its first sighting may reach storage
    let api = ScriptedApi::new(vec![make_store("s1", "2100"), make_store("s2", "8000")])
        .script("2100", ZipScript::Groups(vec![make_group("s1", "2100", 1)]))
        .script(
            "8000",
            ZipScript::Groups(vec![make_group("s1", "8000", 1), make_group("s2", "8000", 1)]),
        );
    let sink = CsvDatasetSink::open(dir.path()).unwrap();
    HarvestExecutor::new(api, sink, test_config())
        .run()
        .await
        .unwrap();

    let latest = CsvDatasetSink::latest_generation(dir.path())
        .unwrap()
        .unwrap();
    let store_ids = read_column(&CsvDatasetSink::clearances_path(&latest), "store_id");
    let distinct: HashSet<&String> = store_ids.iter().collect();
    assert_eq!(store_ids.len(), distinct.len());
}

#[tokio::test]
async fn test_zip_filter_restricts_run() {
    let dir = tempfile::TempDir::new().unwrap();
    let sink = CsvDatasetSink::open(dir.path()).unwrap();

    let report = HarvestExecutor::new(two_zip_api(), sink, test_config())
        .with_zip_filter(vec!["8000".to_string()])
        .run()
        .await
        .unwrap();

    assert_eq!(report.summary.zips_total, 1);
    assert_eq!(report.summary.unique_stores, 1);
    assert_eq!(report.summary.offers, 1);
}
