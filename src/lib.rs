//! Uniform access to weather-station web APIs: the stations inside a region
//! and time series of named variables at those stations.
//!
//! A [`Client`] pairs a provider (see [`providers`]) with a region. Regions can
//! be place names, bounding boxes, geometries or GeoJSON/shapefile sources and
//! are reprojected into the provider's CRS. Every HTTP response is cached on
//! disk, keyed by the canonical request URL.

pub mod cache;
mod client;
mod error;
pub mod http;
pub mod providers;
pub mod region;
mod settings;
pub mod stations;
pub mod table;
mod utils;
pub mod variables;

#[cfg(test)]
mod test_support;

pub use client::Client;
pub use error::MeteostationsError;
pub use settings::*;

pub use cache::error::CacheError;
pub use cache::store::{fingerprint, CacheEntry, CacheStore};
pub use http::error::FetchError;
pub use http::fetcher::{HttpFetcher, JsonResponse, TextResponse};

pub use region::crs::Crs;
pub use region::error::RegionError;
pub use region::geocode::{Geocoder, NoGeocoder, Nominatim};
pub use region::model::{GeometrySource, Region, RegionSpec};
pub use region::resolver::resolve_region;

pub use stations::catalog::{StationCatalog, StationCatalogSource, StationFormat};
pub use stations::error::LocateStationError;
pub use stations::locate_station::{locate_stations, StationSet};
pub use stations::spatial_join::{JoinHow, SpatialJoin, SpatialPredicate};

pub use variables::catalog::{ResolvedVariable, VariableCatalog, VariableCatalogSource};
pub use variables::error::VariableError;
pub use variables::token::{VariableCode, VariableToken, ECVS};
