//! [AEMET OpenData](https://opendata.aemet.es), the Spanish state meteorological agency.
//!
//! Every endpoint answers with a small document whose `datos` member links to
//! the actual data (and `metadatos` to its field descriptions). The links
//! expire after a few minutes, so nothing behind them is cached.

use crate::client::Client;
use crate::error::MeteostationsError;
use crate::http::request::{Headers, QueryParams};
use crate::providers::series::{parse_time, SeriesBuilder};
use crate::providers::{
    ApiKeyAuth, HasApiKeyAuth, HasStationCatalog, HasVariableCatalog, Provider,
};
use crate::region::crs::Crs;
use crate::stations::catalog::{StationCatalogSource, StationFormat};
use crate::table::value_to_f64;
use crate::variables::catalog::VariableCatalogSource;
use crate::variables::token::VariableToken;
use bon::bon;
use log::{debug, info};
use polars::prelude::DataFrame;
use serde_json::Value;
use std::collections::HashSet;

pub const BASE_URL: &str = "https://opendata.aemet.es/opendata/api";
const API_KEY_PARAM: &str = "api_key";
const DATA_LINK: &str = "datos";
const METADATA_LINK: &str = "metadatos";
// "indicativo" in the inventory, "idema" in the observations
const STATION_ID_COL: &str = "indicativo";
const OBSERVATION_STATION_KEY: &str = "idema";
const TIME_KEY: &str = "fint";

pub const ECV: &[(&str, &str)] = &[
    ("precipitation", "prec"),
    ("pressure", "pres"),
    ("surface_wind_speed", "vv"),
    ("surface_wind_direction", "dv"),
    ("temperature", "ta"),
    ("water_vapour", "hr"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct Aemet {
    api_key: String,
    base_url: String,
}

impl Aemet {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn observations_url(&self) -> String {
        format!("{}/observacion/convencional/todas", self.base_url)
    }
}

impl Provider for Aemet {
    fn name(&self) -> &'static str {
        "aemet"
    }

    fn crs(&self) -> Crs {
        Crs::Wgs84
    }

    fn request_params(&self) -> QueryParams {
        self.api_key_auth().params()
    }

    fn request_headers(&self) -> Headers {
        Headers::from([("cache-control".to_string(), "no-cache".to_string())])
    }
}

impl HasApiKeyAuth for Aemet {
    fn api_key_auth(&self) -> ApiKeyAuth {
        ApiKeyAuth::Param {
            name: API_KEY_PARAM,
            key: self.api_key.clone(),
        }
    }
}

impl HasStationCatalog for Aemet {
    /// The climatological station inventory, with coordinates such as `411734N`.
    fn station_catalog(&self) -> StationCatalogSource {
        StationCatalogSource {
            url: format!(
                "{}/valores/climatologicos/inventarioestaciones/todasestaciones",
                self.base_url
            ),
            format: StationFormat::Records {
                pointer: "".into(),
                x_col: "longitud".into(),
                y_col: "latitud".into(),
            },
            crs: Crs::Wgs84,
            id_col: STATION_ID_COL.into(),
            params: QueryParams::new(),
            link: Some(DATA_LINK.into()),
        }
    }
}

impl HasVariableCatalog for Aemet {
    /// The fields described in the metadata of the conventional observations.
    fn variable_catalog(&self) -> VariableCatalogSource {
        VariableCatalogSource::Endpoint {
            url: self.observations_url(),
            pointer: "/campos".into(),
            code_col: "id".into(),
            name_col: "descripcion".into(),
            link: Some(METADATA_LINK.into()),
        }
    }

    fn ecv(&self) -> &'static [(&'static str, &'static str)] {
        ECV
    }
}

#[bon]
impl Client<Aemet> {
    /// The last 24 hours of conventional observations of `variables` at the
    /// stations in the region.
    ///
    /// Returns a long frame with `station` (the station `indicativo`), `time`
    /// and one column per variable.
    #[builder]
    pub async fn time_series(
        &self,
        variables: Vec<VariableToken>,
    ) -> Result<DataFrame, MeteostationsError> {
        let resolved = self.resolve_variable_codes(variables).await?;
        let stations: HashSet<String> = self.stations().await?.ids()?.into_iter().collect();
        let mut series = SeriesBuilder::new(resolved.iter().map(|v| v.label.clone()).collect());

        let url = self.provider().observations_url();
        let response = self
            .fetcher()
            .fetch_json()
            .url(url.as_str())
            .use_cache(false)
            .call()
            .await?;
        check_status(&url, response.status)?;
        let data_url = response
            .link(DATA_LINK)
            .ok_or_else(|| {
                MeteostationsError::TimeSeries(format!("no '{DATA_LINK}' link in {url}"))
            })?
            .to_string();
        let response = self
            .fetcher()
            .fetch_json()
            .url(data_url.as_str())
            .use_cache(false)
            .call()
            .await?;
        check_status(&data_url, response.status)?;

        let records = response.payload.as_array().ok_or_else(|| {
            MeteostationsError::TimeSeries("expected a list of observations".to_string())
        })?;
        for record in records {
            let Some(station) = record.get(OBSERVATION_STATION_KEY).and_then(Value::as_str) else {
                continue;
            };
            if !stations.contains(station) {
                continue;
            }
            let Some(time) = record
                .get(TIME_KEY)
                .and_then(Value::as_str)
                .and_then(parse_time)
            else {
                debug!("Skipping AEMET observation without a time at {}", station);
                continue;
            };
            for (column, variable) in resolved.iter().enumerate() {
                let value = record.get(variable.code.to_string()).and_then(value_to_f64);
                series.insert(station, time, column, value);
            }
        }

        let df = series.finish()?;
        info!("Got {} AEMET observations", df.height());
        Ok(df)
    }
}

fn check_status(url: &str, status: u16) -> Result<(), MeteostationsError> {
    if status == 200 {
        Ok(())
    } else {
        Err(MeteostationsError::TimeSeries(format!(
            "AEMET responded with status {status} for {url}"
        )))
    }
}
