use crate::http::fetcher::HttpFetcher;
use crate::http::request::QueryParams;
use crate::region::crs::Crs;
use crate::stations::error::LocateStationError;
use crate::table::{json_normalize, records_at};
use geo::{Geometry, Point};
use geojson::GeoJson;
use log::{debug, info};
use polars::prelude::*;
use serde_json::{Map, Value};

/// Shape of a station catalog payload.
#[derive(Debug, Clone, PartialEq)]
pub enum StationFormat {
    /// JSON records at `pointer` with coordinates in `x_col` and `y_col`.
    Records {
        pointer: String,
        x_col: String,
        y_col: String,
    },
    /// A GeoJSON FeatureCollection of points, always WGS84.
    GeoJson,
}

/// Where a provider's station catalog comes from and how to read it.
#[derive(Debug, Clone, PartialEq)]
pub struct StationCatalogSource {
    pub url: String,
    pub format: StationFormat,
    pub crs: Crs,
    pub id_col: String,
    pub params: QueryParams,
    /// Member of the response holding the URL of the actual catalog. Such
    /// links expire, so neither document is cached.
    pub link: Option<String>,
}

impl StationCatalogSource {
    pub async fn load(&self, fetcher: &HttpFetcher) -> Result<StationCatalog, LocateStationError> {
        let use_cache = self.link.is_none();
        let mut response = fetcher
            .fetch_json()
            .url(self.url.as_str())
            .params(self.params.clone())
            .use_cache(use_cache)
            .call()
            .await?;
        check_status(&self.url, response.status)?;
        if let Some(link) = &self.link {
            let url = response.link(link).ok_or_else(|| {
                LocateStationError::Payload(format!("no '{link}' link in {}", self.url))
            })?;
            debug!("Following station catalog link to {}", url);
            let url = url.to_string();
            response = fetcher
                .fetch_json()
                .url(url.as_str())
                .use_cache(false)
                .call()
                .await?;
            check_status(&url, response.status)?;
        }

        let catalog = match &self.format {
            StationFormat::GeoJson => StationCatalog::from_geojson(&response.payload)?,
            StationFormat::Records {
                pointer,
                x_col,
                y_col,
            } => {
                let records = records_at(&response.payload, pointer).ok_or_else(|| {
                    LocateStationError::Payload(format!("no station records at '{pointer}'"))
                })?;
                StationCatalog::from_frame(json_normalize(records)?, x_col, y_col, self.crs)?
            }
        };
        info!(
            "Loaded catalog of {} stations from {}",
            catalog.len(),
            self.url
        );
        Ok(catalog.with_id_col(self.id_col.as_str()))
    }
}

/// Every station a provider knows, as a frame plus one point per row.
#[derive(Debug, Clone)]
pub struct StationCatalog {
    frame: DataFrame,
    points: Vec<Option<Point<f64>>>,
    crs: Crs,
    id_col: String,
}

impl StationCatalog {
    /// Reads station coordinates from `x_col` and `y_col`, cast to `f64`.
    /// Rows with a missing or unparsable coordinate get no point.
    pub fn from_frame(
        frame: DataFrame,
        x_col: &str,
        y_col: &str,
        crs: Crs,
    ) -> Result<Self, LocateStationError> {
        let xs = coordinate(&frame, x_col)?;
        let ys = coordinate(&frame, y_col)?;
        let points = xs
            .f64()?
            .into_iter()
            .zip(ys.f64()?)
            .map(|(x, y)| match (x, y) {
                (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some(Point::new(x, y)),
                _ => None,
            })
            .collect();
        Ok(Self {
            frame,
            points,
            crs,
            id_col: "id".to_string(),
        })
    }

    /// Reads a GeoJSON FeatureCollection of points, one row per feature. The
    /// feature `id` and the flattened properties become the columns.
    pub fn from_geojson(value: &Value) -> Result<Self, LocateStationError> {
        let collection = match GeoJson::from_json_value(value.clone())
            .map_err(|e| LocateStationError::GeoJson(Box::new(e)))?
        {
            GeoJson::FeatureCollection(collection) => collection,
            _ => {
                return Err(LocateStationError::Payload(
                    "expected a GeoJSON FeatureCollection".to_string(),
                ))
            }
        };

        let mut records = Vec::with_capacity(collection.features.len());
        let mut points = Vec::with_capacity(collection.features.len());
        for feature in collection.features {
            let mut record = Map::new();
            if let Some(id) = feature.id {
                let id = match id {
                    geojson::feature::Id::String(s) => Value::String(s),
                    geojson::feature::Id::Number(n) => Value::Number(n),
                };
                record.insert("id".to_string(), id);
            }
            for (key, value) in feature.properties.unwrap_or_default() {
                record.entry(key).or_insert(value);
            }
            // keeps a row for features with neither id nor properties
            record.entry("id").or_insert(Value::Null);
            records.push(Value::Object(record));

            let point = feature
                .geometry
                .and_then(|g| Geometry::<f64>::try_from(g).ok())
                .and_then(|g| match g {
                    Geometry::Point(p) => Some(p),
                    _ => None,
                });
            points.push(point);
        }
        debug!("Read {} GeoJSON station features", records.len());

        Ok(Self {
            frame: json_normalize(&records)?,
            points,
            crs: Crs::Wgs84,
            id_col: "id".to_string(),
        })
    }

    /// Names the column holding station ids (`"id"` unless set).
    pub fn with_id_col(mut self, id_col: impl Into<String>) -> Self {
        self.id_col = id_col.into();
        self
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn points(&self) -> &[Option<Point<f64>>] {
        &self.points
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn id_col(&self) -> &str {
        &self.id_col
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

fn check_status(url: &str, status: u16) -> Result<(), LocateStationError> {
    if status == 200 {
        Ok(())
    } else {
        Err(LocateStationError::Payload(format!(
            "{url} responded with status {status}"
        )))
    }
}

fn coordinate(frame: &DataFrame, name: &str) -> Result<Column, LocateStationError> {
    let column = frame
        .column(name)
        .map_err(|_| LocateStationError::MissingColumn(name.to_string()))?;
    match column.dtype() {
        DataType::String => {
            let values: Float64Chunked = column
                .str()?
                .into_iter()
                .map(|v| v.and_then(parse_coordinate))
                .collect();
            Ok(values.with_name(name.into()).into_series().into())
        }
        _ => Ok(column.cast(&DataType::Float64)?),
    }
}

/// Decimal degrees, or packed degrees, minutes and seconds followed by the
/// hemisphere (`413515N`, `0025309W`).
fn parse_coordinate(text: &str) -> Option<f64> {
    let text = text.trim();
    if let Ok(value) = text.parse::<f64>() {
        return Some(value);
    }
    let sign = match text.chars().last()? {
        'N' | 'E' => 1.0,
        'S' | 'W' => -1.0,
        _ => return None,
    };
    let digits = &text[..text.len() - 1];
    if digits.len() < 5 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (rest, seconds) = digits.split_at(digits.len() - 2);
    let (degrees, minutes) = rest.split_at(rest.len() - 2);
    let degrees: f64 = degrees.parse().ok()?;
    let minutes: f64 = minutes.parse().ok()?;
    let seconds: f64 = seconds.parse().ok()?;
    Some(sign * (degrees + minutes / 60.0 + seconds / 3600.0))
}
