//! The UK Met Office DataPoint observations service.

use crate::client::Client;
use crate::error::MeteostationsError;
use crate::http::request::{params, QueryParams};
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
use chrono::TimeDelta;
use log::{debug, info};
use polars::prelude::DataFrame;
use serde_json::Value;
use std::collections::HashSet;

pub const BASE_URL: &str = "http://datapoint.metoffice.gov.uk/public/data";
const API_KEY_PARAM: &str = "key";

// DataPoint publishes no precipitation observations.
pub const ECV: &[(&str, &str)] = &[
    ("pressure", "P"),
    ("surface_wind_speed", "S"),
    ("surface_wind_direction", "D"),
    ("temperature", "T"),
    ("water_vapour", "H"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct MetOffice {
    api_key: String,
    resolution: String,
    base_url: String,
}

impl MetOffice {
    /// Hourly observations.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            resolution: "hourly".to_string(),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_resolution(mut self, resolution: impl Into<String>) -> Self {
        self.resolution = resolution.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn observations_url(&self) -> String {
        format!("{}/val/wxobs/all/json/all", self.base_url)
    }
}

impl Provider for MetOffice {
    fn name(&self) -> &'static str {
        "metoffice"
    }

    fn crs(&self) -> Crs {
        Crs::Wgs84
    }

    fn request_params(&self) -> QueryParams {
        self.api_key_auth().params()
    }
}

impl HasApiKeyAuth for MetOffice {
    fn api_key_auth(&self) -> ApiKeyAuth {
        ApiKeyAuth::Param {
            name: API_KEY_PARAM,
            key: self.api_key.clone(),
        }
    }
}

impl HasStationCatalog for MetOffice {
    fn station_catalog(&self) -> StationCatalogSource {
        StationCatalogSource {
            url: format!("{}/val/wxobs/all/json/sitelist", self.base_url),
            format: StationFormat::Records {
                pointer: "/Locations/Location".into(),
                x_col: "longitude".into(),
                y_col: "latitude".into(),
            },
            crs: Crs::Wgs84,
            id_col: "id".into(),
            params: QueryParams::new(),
            link: None,
        }
    }
}

impl HasVariableCatalog for MetOffice {
    /// Parameters listed in the observations document; `$` holds the description.
    fn variable_catalog(&self) -> VariableCatalogSource {
        VariableCatalogSource::Endpoint {
            url: format!("{}?res={}", self.observations_url(), self.resolution),
            pointer: "/SiteRep/Wx/Param".into(),
            code_col: "name".into(),
            name_col: "$".into(),
            link: None,
        }
    }

    fn ecv(&self) -> &'static [(&'static str, &'static str)] {
        ECV
    }
}

#[bon]
impl Client<MetOffice> {
    /// The last 24 hours of `variables` at the stations in the region.
    ///
    /// Always fetched from the network, as the document changes every hour.
    /// Returns a long frame with `station` (the site id), `time` and one column
    /// per variable.
    #[builder]
    pub async fn time_series(
        &self,
        variables: Vec<VariableToken>,
    ) -> Result<DataFrame, MeteostationsError> {
        let resolved = self.resolve_variable_codes(variables).await?;
        let stations: HashSet<String> = self.stations().await?.ids()?.into_iter().collect();
        let mut series = SeriesBuilder::new(resolved.iter().map(|v| v.label.clone()).collect());

        let response = self
            .fetcher()
            .fetch_json()
            .url(self.provider().observations_url())
            .params(params([("res", self.provider().resolution.as_str())]))
            .use_cache(false)
            .call()
            .await?;
        if response.status != 200 {
            return Err(MeteostationsError::TimeSeries(format!(
                "Met Office responded with status {}",
                response.status
            )));
        }
        let locations = response
            .payload
            .pointer("/SiteRep/DV/Location")
            .ok_or_else(|| MeteostationsError::TimeSeries("no observation sites".to_string()))?;

        for location in one_or_many(locations) {
            let Some(station) = location.get("i").and_then(Value::as_str) else {
                continue;
            };
            if !stations.contains(station) {
                continue;
            }
            for period in location.get("Period").map(one_or_many).unwrap_or_default() {
                // "2024-01-10Z"; each report's "$" counts minutes since midnight
                let Some(day) = period
                    .get("value")
                    .and_then(Value::as_str)
                    .and_then(parse_time)
                else {
                    debug!("Skipping Met Office period without a date at {}", station);
                    continue;
                };
                for report in period.get("Rep").map(one_or_many).unwrap_or_default() {
                    let Some(minutes) = report.get("$").and_then(value_to_f64) else {
                        continue;
                    };
                    let Some(time) = TimeDelta::try_minutes(minutes as i64)
                        .and_then(|offset| day.checked_add_signed(offset))
                    else {
                        debug!("Skipping Met Office report at {} minutes in {}", minutes, station);
                        continue;
                    };
                    for (column, variable) in resolved.iter().enumerate() {
                        let value = report
                            .get(variable.code.to_string())
                            .and_then(value_to_f64);
                        series.insert(station, time, column, value);
                    }
                }
            }
        }

        let df = series.finish()?;
        info!("Got {} Met Office observations", df.height());
        Ok(df)
    }
}

/// DataPoint sends a lone object where a list has a single element.
fn one_or_many(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::series::{STATION_COL, TIME_COL};
    use crate::region::geocode::NoGeocoder;
    use crate::test_support::{test_settings, MockResponse, MockServer};
    use crate::variables::token::VariableCode;
    use chrono::NaiveDate;
    use serde_json::json;

    fn observations() -> Value {
        json!({"SiteRep": {
            "Wx": {"Param": [
                {"name": "T", "units": "C", "$": "Temperature"},
                {"name": "H", "units": "%", "$": "Screen Relative Humidity"},
                {"name": "D", "units": "compass", "$": "Wind Direction"}
            ]},
            "DV": {
                "dataDate": "2024-01-11T09:00:00Z",
                "type": "Obs",
                "Location": [
                    {"i": "3002", "name": "BALTASOUND", "Period": [
                        {"type": "Day", "value": "2024-01-10Z", "Rep": [
                            {"D": "SW", "H": "85.2", "T": "7.3", "$": "1380"}
                        ]},
                        {"type": "Day", "value": "2024-01-11Z", "Rep": {"D": "W", "H": "80.0", "T": "6.9", "$": "60"}}
                    ]},
                    {"i": "3772", "name": "HEATHROW", "Period": {"type": "Day", "value": "2024-01-11Z", "Rep": [
                        {"H": "90.1", "T": "2.0", "$": "60"}
                    ]}}
                ]
            }
        }})
    }

    async fn shetland(server: &MockServer, dir: &std::path::Path) -> Client<MetOffice> {
        server.route(
            "/val/wxobs/all/json/sitelist",
            vec![MockResponse::json(
                200,
                json!({"Locations": {"Location": [
                    {"id": "3002", "name": "BALTASOUND", "latitude": "60.749", "longitude": "-0.854"},
                    {"id": "3772", "name": "HEATHROW", "latitude": "51.479", "longitude": "-0.449"}
                ]}}),
            )],
        );
        server.route("/val/wxobs/all/json/all", vec![MockResponse::json(200, observations())]);
        Client::with_geocoder(
            MetOffice::new("secret").with_base_url(server.url("")),
            [-2.0, 59.5, 0.0, 61.0],
            test_settings(dir),
            &NoGeocoder,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn last_day_of_observations() -> Result<(), MeteostationsError> {
        let server = MockServer::start().await;
        let tmp = tempfile::tempdir().unwrap();
        let client = shetland(&server, tmp.path()).await;

        assert_eq!(client.resolve_variable_code("temperature").await?, VariableCode::from("T"));
        assert_eq!(
            client.resolve_variable_code("Screen Relative Humidity").await?,
            VariableCode::from("H")
        );

        let df = client
            .time_series()
            .variables(vec!["temperature".into(), "H".into()])
            .call()
            .await?;
        assert_eq!(df.height(), 2);
        let stations: Vec<Option<&str>> = df.column(STATION_COL)?.str()?.into_iter().collect();
        assert_eq!(stations, [Some("3002"), Some("3002")]);
        let temperature: Vec<Option<f64>> = df.column("temperature")?.f64()?.into_iter().collect();
        assert_eq!(temperature, [Some(7.3), Some(6.9)]);
        let humidity: Vec<Option<f64>> = df.column("H")?.f64()?.into_iter().collect();
        assert_eq!(humidity, [Some(85.2), Some(80.0)]);

        let first = NaiveDate::from_ymd_opt(2024, 1, 10)
            .unwrap()
            .and_hms_opt(23, 0, 0)
            .unwrap();
        let first_ms = df.column(TIME_COL)?.datetime()?.into_iter().next().flatten();
        assert_eq!(first_ms, Some(first.and_utc().timestamp_millis()));
        Ok(())
    }

    #[tokio::test]
    async fn key_is_a_query_parameter_and_observations_bypass_cache() -> Result<(), MeteostationsError> {
        let server = MockServer::start().await;
        let tmp = tempfile::tempdir().unwrap();
        let client = shetland(&server, tmp.path()).await;

        for _ in 0..2 {
            client.time_series().variables(vec!["T".into()]).call().await?;
        }

        assert!(server.requests().iter().all(|r| r.contains("key=secret")));
        // one catalog request, then two observation pulls
        assert_eq!(server.hits("/val/wxobs/all/json/all"), 3);
        assert_eq!(server.hits("/val/wxobs/all/json/sitelist"), 1);
        Ok(())
    }

    #[tokio::test]
    async fn reports_past_the_calendar_are_skipped() -> Result<(), MeteostationsError> {
        let server = MockServer::start().await;
        let tmp = tempfile::tempdir().unwrap();
        let client = shetland(&server, tmp.path()).await;
        let mut payload = observations();
        payload["SiteRep"]["DV"]["Location"][0]["Period"][0]["Rep"] = json!([
            {"T": "7.3", "$": "1e300"},
            {"T": "7.0", "$": "1320"}
        ]);
        server.route("/val/wxobs/all/json/all", vec![MockResponse::json(200, payload)]);

        let df = client.time_series().variables(vec!["T".into()]).call().await?;
        let temperature: Vec<Option<f64>> = df.column("T")?.f64()?.into_iter().collect();
        assert_eq!(temperature, [Some(7.0), Some(6.9)]);
        Ok(())
    }
}
