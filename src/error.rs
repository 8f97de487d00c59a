use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ExplorerError {
    #[error("API key rejected or missing: {0}")]
    #[diagnostic(help("check the key at data.fingrid.fi or set FGAPIKEY"))]
    Auth(String),

    #[error("Fingrid request failed: {0}")]
    Network(String),

    #[error("Fingrid returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to decode Fingrid response: {0}")]
    Decode(String),

    #[error("no label for category code: {0}")]
    MappingGap(String),

    #[error("invalid dataset id: {0}")]
    InvalidDatasetId(String),

    #[error("invalid date range: {0}")]
    InvalidRange(String),

    #[error("invalid granularity: {0}")]
    InvalidGranularity(String),

    #[error("cannot {action} while session is {state}")]
    InvalidTransition { action: String, state: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("table operation failed: {0}")]
    Frame(#[from] polars::prelude::PolarsError),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
