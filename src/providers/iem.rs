//! The [Iowa Environmental Mesonet](https://mesonet.agron.iastate.edu) ASOS networks.
//!
//! Station catalogs are GeoJSON, the variables are a fixed list and the data
//! services answer in CSV, with `M` for missing values.

use crate::client::Client;
use crate::error::MeteostationsError;
use crate::http::request::{params, QueryParams};
use crate::providers::series::{columns_by_code, parse_time, SeriesBuilder};
use crate::providers::{HasStationCatalog, HasVariableCatalog, Provider};
use crate::region::crs::Crs;
use crate::stations::catalog::{StationCatalogSource, StationFormat};
use crate::variables::catalog::VariableCatalogSource;
use crate::variables::token::VariableToken;
use bon::bon;
use chrono::{Datelike, NaiveDate};
use log::{debug, info, warn};
use polars::prelude::*;
use std::io::Cursor;

pub const BASE_URL: &str = "https://mesonet.agron.iastate.edu";
const STATION_KEY: &str = "station";
const MISSING_VALUE: &str = "M";

const METAR_VARIABLES: &[(&str, &str)] = &[
    ("tmpf", "Air Temperature"),
    ("dwpf", "Dew Point Temperature"),
    ("relh", "Relative Humidity"),
    ("sknt", "Wind Speed"),
    ("drct", "Wind Direction"),
    ("mslp", "Sea Level Pressure in millibar"),
    ("p01i", "1 minute precip"),
];

const METAR_ECV: &[(&str, &str)] = &[
    ("precipitation", "p01i"),
    ("pressure", "mslp"),
    ("surface_wind_speed", "sknt"),
    ("surface_wind_direction", "drct"),
    ("temperature", "tmpf"),
    ("water_vapour", "relh"),
];

const ASOS_1MIN_VARIABLES: &[(&str, &str)] = &[
    ("tmpf", "Air Temperature"),
    ("dwpf", "Dew Point Temperature"),
    ("sknt", "Wind Speed"),
    ("drct", "Wind Direction"),
    ("pres1", "Sensor 1 Station Pressure"),
    ("precip", "1 minute precip"),
];

const ASOS_1MIN_ECV: &[(&str, &str)] = &[
    ("precipitation", "precip"),
    ("pressure", "pres1"),
    ("surface_wind_speed", "sknt"),
    ("surface_wind_direction", "drct"),
    ("temperature", "tmpf"),
];

/// Which IEM network to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IemNetwork {
    /// Hourly METAR/ASOS reports.
    #[default]
    Metar,
    /// One-minute ASOS observations.
    Asos1Min,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Iem {
    network: IemNetwork,
    base_url: String,
}

impl Iem {
    pub fn new(network: IemNetwork) -> Self {
        Self {
            network,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn metar() -> Self {
        Self::new(IemNetwork::Metar)
    }

    pub fn asos_1min() -> Self {
        Self::new(IemNetwork::Asos1Min)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn network(&self) -> IemNetwork {
        self.network
    }

    fn time_series_url(&self) -> String {
        match self.network {
            IemNetwork::Metar => format!("{}/cgi-bin/request/asos.py", self.base_url),
            IemNetwork::Asos1Min => format!("{}/cgi-bin/request/asos1min.py", self.base_url),
        }
    }

    /// Query parameter listing the requested variables.
    fn variables_param(&self) -> &'static str {
        match self.network {
            IemNetwork::Metar => "data",
            IemNetwork::Asos1Min => "vars",
        }
    }

    fn time_key(&self) -> &'static str {
        match self.network {
            IemNetwork::Metar => "valid",
            IemNetwork::Asos1Min => "valid(UTC)",
        }
    }
}

impl Provider for Iem {
    fn name(&self) -> &'static str {
        "iem"
    }

    fn crs(&self) -> Crs {
        Crs::Wgs84
    }
}

impl HasStationCatalog for Iem {
    fn station_catalog(&self) -> StationCatalogSource {
        let (network, params) = match self.network {
            IemNetwork::Metar => ("AZOS", QueryParams::new()),
            IemNetwork::Asos1Min => ("ASOS1MIN", params([("only_online", "0")])),
        };
        StationCatalogSource {
            url: format!("{}/geojson/network/{}.geojson", self.base_url, network),
            format: StationFormat::GeoJson,
            crs: Crs::Wgs84,
            id_col: "id".into(),
            params,
            link: None,
        }
    }
}

impl HasVariableCatalog for Iem {
    fn variable_catalog(&self) -> VariableCatalogSource {
        VariableCatalogSource::Hardcoded(match self.network {
            IemNetwork::Metar => METAR_VARIABLES,
            IemNetwork::Asos1Min => ASOS_1MIN_VARIABLES,
        })
    }

    fn ecv(&self) -> &'static [(&'static str, &'static str)] {
        match self.network {
            IemNetwork::Metar => METAR_ECV,
            IemNetwork::Asos1Min => ASOS_1MIN_ECV,
        }
    }
}

#[bon]
impl Client<Iem> {
    /// Observations of `variables` at every station in the region.
    ///
    /// Returns a long frame with `station` (the IEM station id), `time` and
    /// one column per variable, labelled as the variable was given. Rows
    /// repeated for a station and time are merged, keeping the first value
    /// that is not missing.
    ///
    /// # Arguments
    ///
    /// * `variables` - IEM variable codes, names or ECVs.
    /// * `start`, `end` - First and last day, as the service's `day1` and `day2`.
    ///
    /// # Errors
    ///
    /// Returns [`MeteostationsError::TimeSeries`] if the CSV lacks the station
    /// or time column and [`MeteostationsError::Polars`] if it cannot be read.
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
        let ids = self.stations().await?.ids()?;
        let mut series = SeriesBuilder::new(resolved.iter().map(|v| v.label.clone()).collect());
        if ids.is_empty() || resolved.is_empty() {
            warn!("No IEM stations or variables to request");
            return Ok(series.finish()?);
        }

        let provider = self.provider();
        let groups = columns_by_code(&resolved);
        let codes: Vec<&str> = groups.iter().map(|(code, _)| code.as_str()).collect();
        let query = params([
            ("year1", start.year().to_string()),
            ("month1", start.month().to_string()),
            ("day1", start.day().to_string()),
            ("year2", end.year().to_string()),
            ("month2", end.month().to_string()),
            ("day2", end.day().to_string()),
            (provider.variables_param(), codes.join(",")),
            (STATION_KEY, ids.join(",")),
        ]);
        let response = self
            .fetcher()
            .fetch_text()
            .url(provider.time_series_url())
            .params(query)
            .call()
            .await?;

        let df = read_csv(response.body)?;
        let stations = text_column(&df, STATION_KEY)?;
        let times = text_column(&df, provider.time_key())?;
        let mut values = Vec::with_capacity(groups.len());
        for (code, columns) in &groups {
            match df.column(code) {
                Ok(column) => {
                    let column = column.cast(&DataType::Float64)?;
                    values.push((column.f64()?.clone(), columns));
                }
                Err(_) => warn!("IEM returned no '{}' column", code),
            }
        }

        for row in 0..df.height() {
            let (Some(station), Some(time)) = (
                stations.get(row),
                times.get(row).and_then(parse_time),
            ) else {
                debug!("Skipping IEM row {} without a station or time", row);
                continue;
            };
            for (column, targets) in &values {
                let value = column.get(row);
                for &target in targets.iter() {
                    series.insert(station, time, target, value);
                }
            }
        }

        let df = series.finish()?;
        info!("Got {} IEM observations", df.height());
        Ok(df)
    }
}

fn read_csv(body: String) -> PolarsResult<DataFrame> {
    let parse_options = CsvParseOptions::default()
        .with_null_values(Some(NullValues::AllColumnsSingle(MISSING_VALUE.into())));
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .with_parse_options(parse_options)
        .into_reader_with_file_handle(Cursor::new(body.into_bytes()))
        .finish()
}

fn text_column(df: &DataFrame, name: &str) -> Result<StringChunked, MeteostationsError> {
    let column = df.column(name).map_err(|_| {
        MeteostationsError::TimeSeries(format!("no '{name}' column in the IEM response"))
    })?;
    Ok(column.cast(&DataType::String)?.str()?.clone())
}
