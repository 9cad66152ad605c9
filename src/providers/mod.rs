//! Per-provider glue: endpoints, column names, authentication and payload shaping.
//!
//! A provider implements [`Provider`] plus whichever capability traits its API
//! supports. Capabilities are declared as strategy values
//! ([`StationCatalogSource`], [`VariableCatalogSource`]) that the generic
//! [`crate::Client`] knows how to load.

pub mod aemet;
pub mod agrometeo;
pub mod iem;
pub mod meteocat;
pub mod metoffice;
pub mod series;

use crate::http::request::{Headers, QueryParams};
use crate::region::crs::Crs;
use crate::stations::catalog::StationCatalogSource;
use crate::variables::catalog::VariableCatalogSource;

pub use aemet::Aemet;
pub use agrometeo::Agrometeo;
pub use iem::{Iem, IemNetwork};
pub use meteocat::Meteocat;
pub use metoffice::MetOffice;

/// A weather-station web API.
pub trait Provider: Send + Sync {
    /// Short lowercase name used in log messages.
    fn name(&self) -> &'static str;

    /// CRS of the station coordinates, and therefore of the client's region.
    fn crs(&self) -> Crs;

    /// Query parameters sent with every request to this provider.
    fn request_params(&self) -> QueryParams {
        QueryParams::new()
    }

    fn request_headers(&self) -> Headers {
        Headers::new()
    }
}

/// How an API key travels with each request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiKeyAuth {
    Header { name: &'static str, key: String },
    Param { name: &'static str, key: String },
}

impl ApiKeyAuth {
    pub fn params(&self) -> QueryParams {
        match self {
            ApiKeyAuth::Param { name, key } => QueryParams::from([(name.to_string(), key.clone())]),
            ApiKeyAuth::Header { .. } => QueryParams::new(),
        }
    }

    pub fn headers(&self) -> Headers {
        match self {
            ApiKeyAuth::Header { name, key } => Headers::from([(name.to_string(), key.clone())]),
            ApiKeyAuth::Param { .. } => Headers::new(),
        }
    }
}

pub trait HasApiKeyAuth: Provider {
    fn api_key_auth(&self) -> ApiKeyAuth;
}

/// Providers whose stations can be listed.
pub trait HasStationCatalog: Provider {
    fn station_catalog(&self) -> StationCatalogSource;
}

/// Providers whose variables can be resolved from codes, names and ECVs.
pub trait HasVariableCatalog: Provider {
    fn variable_catalog(&self) -> VariableCatalogSource;

    /// `(ECV, native display name or code)` pairs.
    fn ecv(&self) -> &'static [(&'static str, &'static str)];
}
