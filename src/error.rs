use crate::cache::error::CacheError;
use crate::http::error::FetchError;
use crate::region::error::RegionError;
use crate::stations::error::LocateStationError;
use crate::variables::error::VariableError;
use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeteostationsError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Region(#[from] RegionError),

    #[error(transparent)]
    Variable(#[from] VariableError),

    #[error(transparent)]
    LocateStation(#[from] LocateStationError),

    #[error("Failed to determine cache directory")]
    CacheDirResolution(#[source] std::io::Error),

    #[error("Unexpected time series payload: {0}")]
    TimeSeries(String),

    #[error(transparent)]
    Polars(#[from] PolarsError),
}
