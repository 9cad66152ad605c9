//! [Meteocat](https://apidocs.meteocat.gencat.cat), the Catalan weather service's XEMA network.

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
use chrono::{Datelike, NaiveDate};
use bon::bon;
use log::{debug, info};
use polars::prelude::DataFrame;
use serde_json::Value;
use std::collections::HashSet;

pub const BASE_URL: &str = "https://api.meteo.cat/xema/v1";
const API_KEY_HEADER: &str = "X-API-KEY";

pub const ECV: &[(&str, &str)] = &[
    ("precipitation", "Precipitació"),
    ("pressure", "Pressió atmosfèrica"),
    ("surface_radiation_shortwave", "Irradiància solar global"),
    ("surface_wind_speed", "Velocitat del vent a 10 m (esc.)"),
    ("surface_wind_direction", "Direcció de vent 10 m (m. 1)"),
    ("temperature", "Temperatura"),
    ("water_vapour", "Humitat relativa"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct Meteocat {
    api_key: String,
    base_url: String,
}

impl Meteocat {
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
}

impl Provider for Meteocat {
    fn name(&self) -> &'static str {
        "meteocat"
    }

    fn crs(&self) -> Crs {
        Crs::Wgs84
    }

    fn request_params(&self) -> QueryParams {
        self.api_key_auth().params()
    }

    fn request_headers(&self) -> Headers {
        self.api_key_auth().headers()
    }
}

impl HasApiKeyAuth for Meteocat {
    fn api_key_auth(&self) -> ApiKeyAuth {
        ApiKeyAuth::Header {
            name: API_KEY_HEADER,
            key: self.api_key.clone(),
        }
    }
}

impl HasStationCatalog for Meteocat {
    fn station_catalog(&self) -> StationCatalogSource {
        StationCatalogSource {
            url: format!("{}/estacions/metadades", self.base_url),
            format: StationFormat::Records {
                pointer: "".into(),
                x_col: "coordenades.longitud".into(),
                y_col: "coordenades.latitud".into(),
            },
            crs: Crs::Wgs84,
            id_col: "codi".into(),
            params: QueryParams::new(),
            link: None,
        }
    }
}

impl HasVariableCatalog for Meteocat {
    fn variable_catalog(&self) -> VariableCatalogSource {
        VariableCatalogSource::Endpoint {
            url: format!("{}/variables/mesurades/metadades", self.base_url),
            pointer: "".into(),
            code_col: "codi".into(),
            name_col: "nom".into(),
            link: None,
        }
    }

    fn ecv(&self) -> &'static [(&'static str, &'static str)] {
        ECV
    }
}

#[bon]
impl Client<Meteocat> {
    /// Readings of `variables` at the stations in the region, from `start` to
    /// `end` inclusive.
    ///
    /// The API serves one variable for one day per request, so a period of `d`
    /// days and `v` variables costs `d * v` requests, each paced and cached.
    /// Returns a long frame with `station` (the station code), `time` and one
    /// column per variable.
    #[builder]
    pub async fn time_series(
        &self,
        variables: Vec<VariableToken>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<DataFrame, MeteostationsError> {
        if start > end {
            return Err(MeteostationsError::TimeSeries(format!(
                "start {start} is after end {end}"
            )));
        }
        let resolved = self.resolve_variable_codes(variables).await?;
        let stations: HashSet<String> = self.stations().await?.ids()?.into_iter().collect();
        let mut series = SeriesBuilder::new(resolved.iter().map(|v| v.label.clone()).collect());

        for day in start.iter_days().take_while(|day| *day <= end) {
            for (column, variable) in resolved.iter().enumerate() {
                let url = format!(
                    "{}/variables/mesurades/{}/{}/{:02}/{:02}",
                    self.provider().base_url,
                    variable.code,
                    day.year(),
                    day.month(),
                    day.day()
                );
                let response = self.fetcher().fetch_json().url(url).call().await?;
                if response.status != 200 {
                    return Err(MeteostationsError::TimeSeries(format!(
                        "Meteocat responded with status {} for {} on {}",
                        response.status, variable.code, day
                    )));
                }
                read_day(&response.payload, &stations, column, &mut series)?;
            }
        }

        let df = series.finish()?;
        info!("Got {} Meteocat observations", df.height());
        Ok(df)
    }
}

/// Adds one day of one variable: `[{codi, variables: [{codi, lectures: [{data, valor}]}]}]`.
fn read_day(
    payload: &Value,
    stations: &HashSet<String>,
    column: usize,
    series: &mut SeriesBuilder,
) -> Result<(), MeteostationsError> {
    let records = payload
        .as_array()
        .ok_or_else(|| MeteostationsError::TimeSeries("expected a list of stations".to_string()))?;
    for record in records {
        let Some(station) = record.get("codi").and_then(Value::as_str) else {
            continue;
        };
        if !stations.contains(station) {
            continue;
        }
        let readings = record
            .get("variables")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|v| v.get("lectures").and_then(Value::as_array))
            .flatten();
        for reading in readings {
            let Some(time) = reading
                .get("data")
                .and_then(Value::as_str)
                .and_then(parse_time)
            else {
                debug!(
                    "Skipping Meteocat reading without a readable time at {}",
                    station
                );
                continue;
            };
            let value = reading.get("valor").and_then(value_to_f64);
            series.insert(station, time, column, value);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::series::STATION_COL;
    use crate::region::geocode::NoGeocoder;
    use crate::test_support::{test_settings, MockResponse, MockServer};
    use serde_json::json;

    fn day(station: &str, code: i64, date: &str, values: [f64; 2]) -> Value {
        json!([{
            "codi": station,
            "variables": [{
                "codi": code,
                "lectures": [
                    {"data": format!("{date}T00:00Z"), "valor": values[0], "estat": "V", "baseHoraria": "SH"},
                    {"data": format!("{date}T00:30Z"), "valor": values[1], "estat": "V", "baseHoraria": "SH"}
                ]
            }]
        }, {
            "codi": "Z9",
            "variables": [{"codi": code, "lectures": [{"data": format!("{date}T00:00Z"), "valor": 1.0}]}]
        }])
    }

    async fn barcelona(server: &MockServer, dir: &std::path::Path) -> Client<Meteocat> {
        server.route(
            "/estacions/metadades",
            vec![MockResponse::json(
                200,
                json!([
                    {"codi": "X4", "nom": "Barcelona - el Raval", "coordenades": {"latitud": 41.38, "longitud": 2.17}},
                    {"codi": "Z9", "nom": "Port Ainé", "coordenades": {"latitud": 42.42, "longitud": 1.19}}
                ]),
            )],
        );
        server.route(
            "/variables/mesurades/metadades",
            vec![MockResponse::json(
                200,
                json!([
                    {"codi": 32, "nom": "Temperatura", "unitat": "°C"},
                    {"codi": 35, "nom": "Precipitació", "unitat": "mm"}
                ]),
            )],
        );
        Client::with_geocoder(
            Meteocat::new("secret").with_base_url(server.url("")),
            [2.0, 41.2, 2.4, 41.6],
            test_settings(dir),
            &NoGeocoder,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn one_request_per_day_and_variable() -> Result<(), MeteostationsError> {
        let server = MockServer::start().await;
        let tmp = tempfile::tempdir().unwrap();
        let client = barcelona(&server, tmp.path()).await;
        server.route(
            "/variables/mesurades/32/2017/03/27",
            vec![MockResponse::json(200, day("X4", 32, "2017-03-27", [8.1, 8.4]))],
        );
        server.route(
            "/variables/mesurades/32/2017/03/28",
            vec![MockResponse::json(200, day("X4", 32, "2017-03-28", [9.0, 9.2]))],
        );
        server.route(
            "/variables/mesurades/35/2017/03/27",
            vec![MockResponse::json(200, day("X4", 35, "2017-03-27", [0.0, 0.3]))],
        );
        server.route(
            "/variables/mesurades/35/2017/03/28",
            vec![MockResponse::json(200, day("X4", 35, "2017-03-28", [0.0, 0.0]))],
        );

        let df = client
            .time_series()
            .variables(vec!["temperature".into(), "Precipitació".into()])
            .start(NaiveDate::from_ymd_opt(2017, 3, 27).unwrap())
            .end(NaiveDate::from_ymd_opt(2017, 3, 28).unwrap())
            .call()
            .await?;

        assert_eq!(df.height(), 4);
        let stations: Vec<Option<&str>> = df.column(STATION_COL)?.str()?.into_iter().collect();
        assert!(stations.iter().all(|s| *s == Some("X4")));
        let temperature: Vec<Option<f64>> = df.column("temperature")?.f64()?.into_iter().collect();
        assert_eq!(temperature, [Some(8.1), Some(8.4), Some(9.0), Some(9.2)]);
        let precipitation: Vec<Option<f64>> = df.column("Precipitació")?.f64()?.into_iter().collect();
        assert_eq!(precipitation, [Some(0.0), Some(0.3), Some(0.0), Some(0.0)]);

        let data_requests = server
            .requests()
            .iter()
            .filter(|r| r.starts_with("/variables/mesurades/3"))
            .count();
        assert_eq!(data_requests, 4);
        Ok(())
    }

    #[tokio::test]
    async fn api_key_is_a_header() {
        let server = MockServer::start().await;
        let tmp = tempfile::tempdir().unwrap();
        let client = barcelona(&server, tmp.path()).await;
        assert!(client.provider().request_params().is_empty());
        assert_eq!(
            client.provider().request_headers().get(API_KEY_HEADER).map(String::as_str),
            Some("secret")
        );
    }

    #[tokio::test]
    async fn unexpected_day_payload() {
        let server = MockServer::start().await;
        let tmp = tempfile::tempdir().unwrap();
        let client = barcelona(&server, tmp.path()).await;
        server.route(
            "/variables/mesurades/32/2017/03/27",
            vec![MockResponse::json(200, json!({"message": "no data"}))],
        );
        let result = client
            .time_series()
            .variables(vec![32.into()])
            .start(NaiveDate::from_ymd_opt(2017, 3, 27).unwrap())
            .end(NaiveDate::from_ymd_opt(2017, 3, 27).unwrap())
            .call()
            .await;
        assert!(matches!(result, Err(MeteostationsError::TimeSeries(_))));
    }
}
