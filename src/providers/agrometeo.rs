//! [Agrometeo](https://agrometeo.ch), the Swiss agro-meteorological network.

use crate::client::Client;
use crate::error::MeteostationsError;
use crate::http::request::{params, QueryParams};
use crate::providers::series::{attach_points, columns_by_code, parse_time, SeriesBuilder};
use crate::providers::{HasStationCatalog, HasVariableCatalog, Provider};
use crate::region::crs::Crs;
use crate::region::error::RegionError;
use crate::stations::catalog::{StationCatalogSource, StationFormat};
use crate::stations::locate_station::StationSet;
use crate::table::{records_at, value_to_f64};
use crate::variables::catalog::VariableCatalogSource;
use crate::variables::token::VariableToken;
use bon::bon;
use chrono::NaiveDate;
use geo::Point;
use log::{debug, info, warn};
use polars::prelude::*;
use std::collections::HashMap;
use std::fmt;

pub const BASE_URL: &str = "https://agrometeo.ch/backend/api";
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_KEY: &str = "date";
/// Station column used to label time series.
const STATION_LABEL_COL: &str = "name";

pub const ECV: &[(&str, &str)] = &[
    ("precipitation", "Precipitation"),
    ("pressure", "Real air pressure"),
    ("surface_radiation_shortwave", "Solar radiation"),
    ("surface_wind_speed", "Avg. wind speed"),
    ("surface_wind_direction", "Wind direction"),
    ("temperature", "Temperature 2m above ground"),
    ("water_vapour", "Relative humidity"),
];

/// Temporal aggregation of the measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scale {
    /// Raw ten-minute values.
    #[default]
    None,
    Hour,
    Day,
    Month,
    Year,
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scale::None => "none",
            Scale::Hour => "hour",
            Scale::Day => "day",
            Scale::Month => "month",
            Scale::Year => "year",
        })
    }
}

/// Which value of each aggregation period is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Measurement {
    Min,
    #[default]
    Avg,
    Max,
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Measurement::Min => "min",
            Measurement::Avg => "avg",
            Measurement::Max => "max",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Agrometeo {
    crs: Crs,
    base_url: String,
}

impl Default for Agrometeo {
    fn default() -> Self {
        Self::new()
    }
}

impl Agrometeo {
    /// Agrometeo with Swiss LV03 coordinates.
    pub fn new() -> Self {
        Self {
            crs: Crs::SwissLv03,
            base_url: BASE_URL.to_string(),
        }
    }

    /// Agrometeo with coordinates in `crs`, which must be LV03 or WGS84.
    pub fn with_crs(crs: Crs) -> Result<Self, RegionError> {
        match crs {
            Crs::SwissLv03 | Crs::Wgs84 => Ok(Self {
                crs,
                ..Self::new()
            }),
            other => Err(RegionError::UnsupportedCrs(format!(
                "Agrometeo publishes EPSG:21781 and EPSG:4326 coordinates, not {other}"
            ))),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// X and Y columns for the CRS. The API swaps the LV03 column names.
    fn coordinate_cols(&self) -> (&'static str, &'static str) {
        match self.crs {
            Crs::Wgs84 => ("long_dec", "lat_dec"),
            _ => ("lat_ch", "long_ch"),
        }
    }
}

impl Provider for Agrometeo {
    fn name(&self) -> &'static str {
        "agrometeo"
    }

    fn crs(&self) -> Crs {
        self.crs
    }
}

impl HasStationCatalog for Agrometeo {
    fn station_catalog(&self) -> StationCatalogSource {
        let (x_col, y_col) = self.coordinate_cols();
        StationCatalogSource {
            url: format!("{}/stations", self.base_url),
            format: StationFormat::Records {
                pointer: "/data".into(),
                x_col: x_col.into(),
                y_col: y_col.into(),
            },
            crs: self.crs,
            id_col: "id".into(),
            params: QueryParams::new(),
            link: None,
        }
    }
}

impl HasVariableCatalog for Agrometeo {
    fn variable_catalog(&self) -> VariableCatalogSource {
        VariableCatalogSource::Endpoint {
            url: format!("{}/sensors", self.base_url),
            pointer: "/data".into(),
            code_col: "id".into(),
            name_col: "name.en".into(),
            link: None,
        }
    }

    fn ecv(&self) -> &'static [(&'static str, &'static str)] {
        ECV
    }
}

#[bon]
impl Client<Agrometeo> {
    /// Measurements of `variables` at every station in the region.
    ///
    /// Returns a long frame with `station` (the station name), `time` and one
    /// column per variable, labelled as the variable was given, sorted by
    /// station and time.
    ///
    /// # Arguments
    ///
    /// * `variables` - Agrometeo sensor ids, sensor names or ECVs.
    /// * `start`, `end` - First and last day, inclusive.
    /// * `scale` - Optional. Defaults to [`Scale::None`], the raw ten-minute values.
    /// * `measurement` - Optional. Defaults to [`Measurement::Avg`]. Ignored by
    ///   the API for [`Scale::None`].
    ///
    /// # Errors
    ///
    /// Returns [`MeteostationsError::Variable`] if a variable cannot be resolved
    /// and [`MeteostationsError::TimeSeries`] if the response is not shaped as expected.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use meteostations::{Client, MeteostationsError};
    /// # use meteostations::providers::Agrometeo;
    /// use chrono::NaiveDate;
    ///
    /// # async fn run() -> Result<(), MeteostationsError> {
    /// let client = Client::builder()
    ///     .provider(Agrometeo::new())
    ///     .region("Pully, Switzerland")
    ///     .build()
    ///     .await?;
    /// let df = client
    ///     .time_series()
    ///     .variables(vec!["temperature".into(), "water_vapour".into()])
    ///     .start(NaiveDate::from_ymd_opt(2022, 3, 22).unwrap())
    ///     .end(NaiveDate::from_ymd_opt(2022, 3, 23).unwrap())
    ///     .call()
    ///     .await?;
    /// println!("{df}");
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub async fn time_series(
        &self,
        variables: Vec<VariableToken>,
        start: NaiveDate,
        end: NaiveDate,
        #[builder(default)] scale: Scale,
        #[builder(default)] measurement: Measurement,
    ) -> Result<DataFrame, MeteostationsError> {
        if start > end {
            return Err(MeteostationsError::TimeSeries(format!(
                "start {start} is after end {end}"
            )));
        }
        let resolved = self.resolve_variable_codes(variables).await?;
        let stations = self.stations().await?;
        let labels: Vec<String> = resolved.iter().map(|v| v.label.clone()).collect();
        let mut series = SeriesBuilder::new(labels);

        let ids = stations.ids()?;
        if ids.is_empty() || resolved.is_empty() {
            warn!("No Agrometeo stations or variables to request");
            return Ok(series.finish()?);
        }

        let groups = columns_by_code(&resolved);
        let sensors = groups
            .iter()
            .map(|(code, _)| format!("{code}:{measurement}"))
            .collect::<Vec<_>>()
            .join(",");
        let columns: HashMap<String, Vec<usize>> = groups.into_iter().collect();
        let query = params([
            ("from", start.format(DATE_FORMAT).to_string()),
            ("to", end.format(DATE_FORMAT).to_string()),
            ("scale", scale.to_string()),
            ("sensors", sensors),
            ("stations", ids.join(",")),
        ]);
        let url = format!("{}/meteo/data", self.provider().base_url);
        let response = self.fetcher().fetch_json().url(url).params(query).call().await?;
        if response.status != 200 {
            return Err(MeteostationsError::TimeSeries(format!(
                "Agrometeo responded with status {}",
                response.status
            )));
        }
        let records = records_at(&response.payload, "/data").ok_or_else(|| {
            MeteostationsError::TimeSeries("no records at '/data'".to_string())
        })?;

        let names: HashMap<String, String> = station_labels(stations)?
            .into_iter()
            .map(|(id, label, _)| (id, label))
            .collect();
        for record in records {
            let Some(fields) = record.as_object() else {
                continue;
            };
            let Some(time) = fields
                .get(TIME_KEY)
                .and_then(|t| t.as_str())
                .and_then(parse_time)
            else {
                debug!("Skipping Agrometeo record without a readable date");
                continue;
            };
            for (key, value) in fields {
                if key == TIME_KEY {
                    continue;
                }
                // "{station}_{sensor}_{measurement}"
                let mut parts = key.rsplitn(3, '_');
                let (Some(_), Some(code), Some(station)) = (parts.next(), parts.next(), parts.next())
                else {
                    continue;
                };
                let Some(targets) = columns.get(code) else {
                    continue;
                };
                let label = names.get(station).map(String::as_str).unwrap_or(station);
                let value = value_to_f64(value);
                for &column in targets {
                    series.insert(label, time, column, value);
                }
            }
        }

        let df = series.finish()?;
        info!("Got {} Agrometeo observations", df.height());
        Ok(df)
    }

    /// [`Client::time_series`] with the location of each row's station in
    /// `x` and `y` columns, in the provider's CRS.
    ///
    /// Takes the same arguments as [`Client::time_series`].
    #[builder]
    pub async fn time_series_with_points(
        &self,
        variables: Vec<VariableToken>,
        start: NaiveDate,
        end: NaiveDate,
        #[builder(default)] scale: Scale,
        #[builder(default)] measurement: Measurement,
    ) -> Result<DataFrame, MeteostationsError> {
        let df = self
            .time_series()
            .variables(variables)
            .start(start)
            .end(end)
            .scale(scale)
            .measurement(measurement)
            .call()
            .await?;
        let points: HashMap<String, Point<f64>> = station_labels(self.stations().await?)?
            .into_iter()
            .filter_map(|(_, label, point)| Some((label, point?)))
            .collect();
        Ok(attach_points(df, &points)?)
    }
}

/// Station id, station name (falling back to the id) and location of each
/// catalog row.
fn station_labels(
    stations: &StationSet,
) -> Result<Vec<(String, String, Option<Point<f64>>)>, MeteostationsError> {
    let frame = stations.frame();
    let ids = frame.column(stations.id_col())?.cast(&DataType::String)?;
    let names = match frame.column(STATION_LABEL_COL) {
        Ok(names) => names.cast(&DataType::String)?,
        Err(_) => ids.clone(),
    };
    Ok(ids
        .str()?
        .into_iter()
        .zip(names.str()?)
        .zip(stations.points())
        .filter_map(|((id, name), point)| {
            let id = id?;
            Some((id.to_string(), name.unwrap_or(id).to_string(), *point))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::series::{STATION_COL, TIME_COL, X_COL, Y_COL};
    use crate::region::geocode::NoGeocoder;
    use crate::test_support::{test_settings, MockResponse, MockServer};
    use serde_json::json;

    fn serve_agrometeo(server: &MockServer) {
        server.route(
            "/stations",
            vec![MockResponse::json(
                200,
                json!({"data": [
                    {"id": 1, "name": "PULLY", "lat_ch": 540_500.0, "long_ch": 151_500.0, "long_dec": 6.66, "lat_dec": 46.51},
                    {"id": 2, "name": "NYON", "lat_ch": 507_500.0, "long_ch": 137_500.0, "long_dec": 6.23, "lat_dec": 46.38},
                    {"id": 3, "name": "SION", "lat_ch": 593_000.0, "long_ch": 118_500.0, "long_dec": 7.33, "lat_dec": 46.22}
                ]}),
            )],
        );
        server.route(
            "/sensors",
            vec![MockResponse::json(
                200,
                json!({"data": [
                    {"id": 1, "name": {"en": "Temperature 2m above ground ", "de": "Temperatur 2m"}},
                    {"id": 4, "name": {"en": "Relative humidity", "de": "Relative Luftfeuchtigkeit"}},
                    {"id": 6, "name": {"en": "Precipitation", "de": "Niederschlag"}}
                ]}),
            )],
        );
        server.route(
            "/meteo/data",
            vec![MockResponse::json(
                200,
                json!({"data": [
                    {"date": "2022-03-22T01:00:00.000Z", "1_1_avg": "4.2", "2_1_avg": "5.1", "1_6_avg": "0", "2_6_avg": null},
                    {"date": "2022-03-22T00:00:00.000Z", "1_1_avg": "3.9", "2_1_avg": "4.8", "1_6_avg": "0.2", "2_6_avg": "0"}
                ]}),
            )],
        );
    }

    async fn lake_geneva_client(server: &MockServer, dir: &std::path::Path) -> Client<Agrometeo> {
        Client::with_geocoder(
            Agrometeo::new().with_base_url(server.url("")),
            [500_000.0, 130_000.0, 560_000.0, 160_000.0],
            test_settings(dir),
            &NoGeocoder,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn time_series_is_long_and_labelled() -> Result<(), MeteostationsError> {
        let server = MockServer::start().await;
        serve_agrometeo(&server);
        let tmp = tempfile::tempdir().unwrap();
        let client = lake_geneva_client(&server, tmp.path()).await;

        let df = client
            .time_series()
            .variables(vec!["temperature".into(), 6.into()])
            .start(NaiveDate::from_ymd_opt(2022, 3, 22).unwrap())
            .end(NaiveDate::from_ymd_opt(2022, 3, 22).unwrap())
            .call()
            .await?;

        let names: Vec<&str> = df.get_column_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(names, [STATION_COL, TIME_COL, "temperature", "6"]);
        let stations: Vec<Option<&str>> = df.column(STATION_COL)?.str()?.into_iter().collect();
        assert_eq!(
            stations,
            [Some("NYON"), Some("NYON"), Some("PULLY"), Some("PULLY")]
        );
        let temperature: Vec<Option<f64>> = df.column("temperature")?.f64()?.into_iter().collect();
        assert_eq!(temperature, [Some(4.8), Some(5.1), Some(3.9), Some(4.2)]);
        let precipitation: Vec<Option<f64>> = df.column("6")?.f64()?.into_iter().collect();
        assert_eq!(precipitation, [Some(0.0), None, Some(0.2), Some(0.0)]);

        let request = server
            .requests()
            .into_iter()
            .find(|r| r.starts_with("/meteo/data"))
            .unwrap();
        assert_eq!(
            request,
            "/meteo/data?from=2022-03-22&scale=none&sensors=1%3Aavg%2C6%3Aavg&stations=1%2C2&to=2022-03-22"
        );
        Ok(())
    }

    #[tokio::test]
    async fn repeated_sensor_fills_every_label() -> Result<(), MeteostationsError> {
        let server = MockServer::start().await;
        serve_agrometeo(&server);
        let tmp = tempfile::tempdir().unwrap();
        let client = lake_geneva_client(&server, tmp.path()).await;

        let df = client
            .time_series()
            .variables(vec!["temperature".into(), 1.into()])
            .start(NaiveDate::from_ymd_opt(2022, 3, 22).unwrap())
            .end(NaiveDate::from_ymd_opt(2022, 3, 22).unwrap())
            .call()
            .await?;

        let names: Vec<&str> = df.get_column_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(names, [STATION_COL, TIME_COL, "temperature", "1"]);
        let expected = [Some(4.8), Some(5.1), Some(3.9), Some(4.2)];
        let temperature: Vec<Option<f64>> = df.column("temperature")?.f64()?.into_iter().collect();
        assert_eq!(temperature, expected);
        let sensor: Vec<Option<f64>> = df.column("1")?.f64()?.into_iter().collect();
        assert_eq!(sensor, expected);

        let request = server
            .requests()
            .into_iter()
            .find(|r| r.starts_with("/meteo/data"))
            .unwrap();
        assert!(request.contains("sensors=1%3Aavg&"), "{request}");
        Ok(())
    }

    #[tokio::test]
    async fn located_time_series_carries_station_points() -> Result<(), MeteostationsError> {
        let server = MockServer::start().await;
        serve_agrometeo(&server);
        let tmp = tempfile::tempdir().unwrap();
        let client = lake_geneva_client(&server, tmp.path()).await;

        let df = client
            .time_series_with_points()
            .variables(vec!["temperature".into()])
            .start(NaiveDate::from_ymd_opt(2022, 3, 22).unwrap())
            .end(NaiveDate::from_ymd_opt(2022, 3, 22).unwrap())
            .scale(Scale::Hour)
            .call()
            .await?;

        let names: Vec<&str> = df.get_column_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(names, [STATION_COL, TIME_COL, "temperature", X_COL, Y_COL]);
        let xs: Vec<Option<f64>> = df.column(X_COL)?.f64()?.into_iter().collect();
        assert_eq!(
            xs,
            [Some(507_500.0), Some(507_500.0), Some(540_500.0), Some(540_500.0)]
        );
        let ys: Vec<Option<f64>> = df.column(Y_COL)?.f64()?.into_iter().collect();
        assert_eq!(
            ys,
            [Some(137_500.0), Some(137_500.0), Some(151_500.0), Some(151_500.0)]
        );
        assert!(server
            .requests()
            .iter()
            .any(|r| r.starts_with("/meteo/data") && r.contains("scale=hour")));
        Ok(())
    }

    #[tokio::test]
    async fn wgs84_uses_decimal_columns() -> Result<(), MeteostationsError> {
        let server = MockServer::start().await;
        serve_agrometeo(&server);
        let tmp = tempfile::tempdir().unwrap();
        let client = Client::with_geocoder(
            Agrometeo::with_crs(Crs::Wgs84)?.with_base_url(server.url("")),
            [7.0, 46.0, 7.5, 46.5],
            test_settings(tmp.path()),
            &NoGeocoder,
        )
        .await?;
        assert_eq!(client.stations().await?.ids()?, ["3"]);
        Ok(())
    }

    #[test]
    fn only_swiss_grid_or_wgs84() {
        assert!(Agrometeo::with_crs(Crs::SwissLv95).is_err());
        assert_eq!(Agrometeo::new().crs(), Crs::SwissLv03);
    }

    #[tokio::test]
    async fn reversed_period_is_rejected() {
        let server = MockServer::start().await;
        serve_agrometeo(&server);
        let tmp = tempfile::tempdir().unwrap();
        let client = lake_geneva_client(&server, tmp.path()).await;
        let result = client
            .time_series()
            .variables(vec!["temperature".into()])
            .start(NaiveDate::from_ymd_opt(2022, 3, 23).unwrap())
            .end(NaiveDate::from_ymd_opt(2022, 3, 22).unwrap())
            .call()
            .await;
        assert!(matches!(result, Err(MeteostationsError::TimeSeries(_))));
        assert_eq!(server.hits("/meteo/data"), 0);
    }
}
