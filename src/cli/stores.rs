//! Stores command implementation
//!
//! Fetches the store directory and prints a summary without running a
//! harvest. Useful for checking the token and previewing how many zip codes
//! a full run would cover.

use clap::Parser;
use std::collections::BTreeMap;
use tracing::info;

use crate::fetcher::salling::SallingApi;
use crate::fetcher::ClearanceApi;
use crate::harvester::executor::dedupe_directory;
use crate::harvester::zipcodes::derive_zip_codes;

use super::harvest::{build_config, maybe_init_metrics, Cli, OutputFormat};
use super::CliError;

/// Stores command arguments
#[derive(Parser, Debug)]
pub struct StoresCommand {
    /// Only count stores of this brand (e.g. netto, foetex, bilka)
    #[arg(long)]
    pub brand: Option<String>,
}

impl StoresCommand {
    /// Execute the stores command.
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        maybe_init_metrics(cli).await?;

        let config = build_config(cli)?;
        let api = SallingApi::new(&config)?;

        info!("Fetching store directory");
        let stores = dedupe_directory(api.fetch_all_stores().await?);

        let stores: Vec<_> = match &self.brand {
            Some(brand) => stores
                .into_iter()
                .filter(|s| s.brand.eq_ignore_ascii_case(brand))
                .collect(),
            None => stores,
        };

        let zip_codes = derive_zip_codes(&stores);
        let mut by_brand: BTreeMap<&str, usize> = BTreeMap::new();
        for store in &stores {
            *by_brand.entry(store.brand.as_str()).or_default() += 1;
        }

        match cli.output_format {
            OutputFormat::Human => {
                println!("Stores:    {}", stores.len());
                println!("Zip codes: {}", zip_codes.len());
                println!("Brands:");
                for (brand, count) in &by_brand {
                    println!("  {brand:<12} {count}");
                }
            }
            OutputFormat::Json => {
                let payload = serde_json::json!({
                    "stores": stores.len(),
                    "zip_codes": zip_codes.len(),
                    "brands": by_brand,
                });
                println!("{payload}");
            }
        }

        Ok(())
    }
}
