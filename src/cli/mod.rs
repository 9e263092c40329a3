//! CLI command implementations

pub mod error;
pub mod harvest;
pub mod images;
pub mod stores;

pub use error::CliError;
pub use harvest::{Cli, Commands, HarvestArgs, OutputFormat};
pub use images::ImagesCommand;
pub use stores::StoresCommand;
