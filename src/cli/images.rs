//! Images command implementation
//!
//! Mirrors the product images referenced by the latest committed dataset
//! generation into a local cache directory.

use clap::Parser;
use std::path::PathBuf;

use crate::images::download_images;

use super::harvest::{Cli, OutputFormat};
use super::CliError;

/// Images command arguments
#[derive(Parser, Debug)]
pub struct ImagesCommand {
    /// Directory to mirror images into (default: "<output-dir>/images")
    #[arg(long)]
    pub image_dir: Option<PathBuf>,
}

impl ImagesCommand {
    /// Execute the images command.
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let image_dir = self
            .image_dir
            .clone()
            .unwrap_or_else(|| cli.output_dir.join("images"));

        let report = download_images(&cli.output_dir, &image_dir).await?;

        match cli.output_format {
            OutputFormat::Human => {
                println!("Image mirror complete");
                println!("  Total URLs:  {}", report.total);
                println!("  Downloaded:  {}", report.downloaded);
                println!("  Cached:      {}", report.cached);
                println!("  Failed:      {}", report.failed);
            }
            OutputFormat::Json => {
                let payload = serde_json::json!({
                    "total": report.total,
                    "downloaded": report.downloaded,
                    "cached": report.cached,
                    "failed": report.failed,
                });
                println!("{payload}");
            }
        }

        Ok(())
    }
}
