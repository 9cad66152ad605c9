use crate::http::error::FetchError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegionError {
    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    #[error("Could not geocode '{query}': {reason}")]
    GeocodingUnavailable { query: String, reason: String },

    #[error("Unsupported CRS '{0}'")]
    UnsupportedCrs(String),

    #[error("Failed to read geometry file '{0}'")]
    SourceRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse geometries from {origin}: {reason}")]
    SourceParse { origin: String, reason: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),
}
