use crate::http::error::FetchError;
use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LocateStationError {
    #[error("Station catalog has no column '{0}'")]
    MissingColumn(String),

    #[error("Unexpected station catalog payload: {0}")]
    Payload(String),

    #[error("Failed to read GeoJSON station catalog")]
    GeoJson(#[source] Box<geojson::Error>),

    #[error(transparent)]
    Polars(#[from] PolarsError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}
