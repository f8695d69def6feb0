use std::path::PathBuf;
use thiserror::Error;

/// Errors that stop a batch before the first company is processed.
#[derive(Error, Debug)]
pub enum FinderError {
    #[error("Missing credential: {0} must be provided")]
    MissingCredential(&'static str),

    #[error("Input is missing required column '{column}' (found: {found})")]
    MissingInputColumn { column: String, found: String },

    #[error("Failed to read input '{path}': {source}")]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse CSV input: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to parse spreadsheet input: {0}")]
    Spreadsheet(String),

    #[error("Input contains no company names")]
    EmptyInput,

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Failed to export results: {0}")]
    Export(String),
}

/// A failed search-provider query.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("request failed: {0}")]
    Http(reqwest::Error),

    #[error("provider returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("provider error: {0}")]
    Provider(String),

    #[error("could not decode provider response: {0}")]
    Decode(#[from] serde_json::Error),
}

// Provider URLs carry the API key in the query string, so it is dropped
// before the error can reach a record, the export or a log line.
impl From<reqwest::Error> for SearchError {
    fn from(e: reqwest::Error) -> Self {
        SearchError::Http(e.without_url())
    }
}

/// A failed website fetch or parse.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("site unreachable: {0}")]
    SiteUnreachable(reqwest::Error),

    #[error("could not read response body: {0}")]
    Body(reqwest::Error),

    #[error("could not parse page: {0}")]
    Parse(String),
}
