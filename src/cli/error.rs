//! CLI error types and conversions

use crate::fetcher::FetchError;
use crate::harvester::RunError;
use crate::sink::SinkError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Upstream fetch error
    #[error("fetch error: {0}")]
    FetchError(#[from] FetchError),

    /// Harvest run error
    #[error("harvest error: {0}")]
    RunError(#[from] RunError),

    /// Dataset sink error
    #[error("sink error: {0}")]
    SinkError(#[from] SinkError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}
