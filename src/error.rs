//! Error types shared across the scraping, storage and configuration layers.
//!
//! Command handlers in `main` still return `Box<dyn Error>`; these enums exist
//! so the seams between modules can be matched on and tested.

use thiserror::Error;

/// Failure to retrieve a listing page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("{0} is blacklisted as a venue source")]
    Blacklisted(String),
    #[error("no page found at {0}")]
    NotFound(String),
    #[error("every candidate URL failed ({attempted} tried)")]
    Exhausted { attempted: usize },
}

/// Failure to read or persist the event collection.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("store {path} is not a JSON array of events: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize collection: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure to load or validate the venue registry.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing venue registry: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid venue registry: {0}")]
    Invalid(String),
}
