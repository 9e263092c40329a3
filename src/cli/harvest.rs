//! Harvest command implementation
//!
//! Defines the top-level CLI surface ([`Cli`], [`Commands`]) and the
//! `harvest` command, which drives a full directory-fetch / per-zip-harvest /
//! commit cycle against a generation-versioned CSV dataset.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::config::HarvesterConfig;
use crate::fetcher::salling::SallingApi;
use crate::harvester::{HarvestExecutor, RunReport};
use crate::metrics;
use crate::shutdown::SharedShutdown;
use crate::sink::csv::CsvDatasetSink;

use super::CliError;

/// Default environment variable holding the API bearer token.
const DEFAULT_TOKEN_ENV: &str = "SALLING_API_TOKEN";

/// Clearance harvester CLI
#[derive(Parser, Debug)]
#[command(name = "clearance-harvester")]
#[command(about = "Harvest food-waste clearance offers from the Salling Group API", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Environment variable to read the API bearer token from
    #[arg(long, global = true, default_value = DEFAULT_TOKEN_ENV)]
    pub token_env: String,

    /// Override the API base URL (e.g. for a local stub)
    #[arg(long, global = true)]
    pub api_base: Option<String>,

    /// Delay between consecutive upstream requests, in milliseconds
    #[arg(long, global = true)]
    pub delay_ms: Option<u64>,

    /// Maximum number of attempts for failed requests (default: 5, range: 1-20)
    #[arg(long, global = true, default_value = "5", value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_retries: u32,

    /// Zip codes accumulated per batch before flushing to the sink
    #[arg(long, global = true)]
    pub flush_threshold: Option<usize>,

    /// Expose Prometheus metrics on this address (e.g. 127.0.0.1:9090)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,

    /// Dataset root directory (default: "data/food_waste")
    #[arg(long, global = true, default_value = "data/food_waste")]
    pub output_dir: PathBuf,

    /// Show a per-zip progress bar
    #[arg(long, global = true, default_value_t = false)]
    pub progress: bool,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a full harvest and commit a new dataset generation
    Harvest(HarvestArgs),

    /// Fetch and summarize the store directory without harvesting
    Stores(super::StoresCommand),

    /// Mirror product images for the latest committed generation
    Images(super::ImagesCommand),
}

/// Harvest command arguments
#[derive(Parser, Debug)]
pub struct HarvestArgs {
    /// Restrict the harvest to these zip codes (repeatable); default is every
    /// zip code present in the store directory
    #[arg(long = "zip")]
    pub zips: Vec<String>,
}

/// Output format options
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

/// Resolve the bearer token from the configured environment variable.
pub(super) fn resolve_token(token_env: &str) -> Result<String, CliError> {
    match std::env::var(token_env) {
        Ok(token) if !token.trim().is_empty() => Ok(token),
        _ => Err(CliError::ConfigurationError(format!(
            "API token not found: set the {token_env} environment variable"
        ))),
    }
}

/// Build a [`HarvesterConfig`] from the token and the global CLI overrides.
pub(super) fn build_config(cli: &Cli) -> Result<HarvesterConfig, CliError> {
    let token = resolve_token(&cli.token_env)?;
    let mut config = HarvesterConfig::new(token).with_max_attempts(cli.max_retries);

    if let Some(base) = &cli.api_base {
        config = config.with_api_base(base.clone());
    }
    if let Some(delay_ms) = cli.delay_ms {
        config = config.with_request_delay(Duration::from_millis(delay_ms));
    }
    if let Some(threshold) = cli.flush_threshold {
        config = config.with_flush_threshold(threshold);
    }

    Ok(config)
}

/// Install the metrics exporter when `--metrics-addr` is given.
pub(super) async fn maybe_init_metrics(cli: &Cli) -> Result<(), CliError> {
    if let Some(addr) = cli.metrics_addr {
        metrics::init_metrics(addr)
            .await
            .map_err(|e| CliError::ConfigurationError(e.to_string()))?;
    }
    Ok(())
}

fn output_human(report: &RunReport) {
    let summary = &report.summary;
    println!("Harvest {}", report.status());
    println!("  Generation:    {}", report.generation);
    println!("  Stores:        {}", report.stores_total);
    println!(
        "  Zip codes:     {} total ({} with data, {} empty, {} failed)",
        summary.zips_total, summary.zips_with_data, summary.zips_empty, summary.zips_failed
    );
    println!("  Unique stores: {}", summary.unique_stores);
    println!("  Offers:        {}", summary.offers);
    println!("  Batches:       {}", summary.batches);
    if !summary.failed_zips.is_empty() {
        println!("  Failed zips:   {}", summary.failed_zips.join(", "));
    }
}

fn output_json(report: &RunReport) {
    let payload = serde_json::json!({
        "status": report.status(),
        "generation": report.generation,
        "stores_total": report.stores_total,
        "summary": report.summary,
    });
    println!("{payload}");
}

impl HarvestArgs {
    /// Execute the harvest command.
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        maybe_init_metrics(cli).await?;

        let config = build_config(cli)?;
        let api = SallingApi::new(&config)?;
        let sink = CsvDatasetSink::open(&cli.output_dir)?;

        info!(
            "Starting harvest into {} ({} attempts max per request)",
            cli.output_dir.display(),
            config.max_attempts
        );

        let mut executor = HarvestExecutor::new(api, sink, config)
            .with_shutdown(shutdown)
            .with_progress(cli.progress);
        if !self.zips.is_empty() {
            executor = executor.with_zip_filter(self.zips.clone());
        }

        let report = executor.run().await?;

        match cli.output_format {
            OutputFormat::Human => output_human(&report),
            OutputFormat::Json => output_json(&report),
        }

        Ok(())
    }
}
