//! Reading region geometries from GeoJSON and ESRI shapefile content.

use crate::http::fetcher::HttpFetcher;
use crate::region::crs::Crs;
use crate::region::error::RegionError;
use crate::region::model::GeometrySource;
use geo::{Coord, Geometry, LineString, MultiLineString, MultiPolygon, Point, Polygon};
use geojson::GeoJson;
use log::{debug, warn};
use serde_json::Value;
use shapefile::PolygonRing;
use std::io::Cursor;

/// File code 9994, big endian, opening every `.shp` file.
const SHAPEFILE_MAGIC: [u8; 4] = [0x00, 0x00, 0x27, 0x0A];

#[derive(Debug)]
pub(crate) struct LoadedGeometries {
    pub geometries: Vec<Geometry<f64>>,
    /// `None` when the content carries no CRS and the caller's CRS applies.
    pub crs: Option<Crs>,
}

pub(crate) async fn load(
    source: &GeometrySource,
    fetcher: &HttpFetcher,
) -> Result<LoadedGeometries, RegionError> {
    match source {
        GeometrySource::Path(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| RegionError::SourceRead(path.clone(), e))?;
            parse_bytes(&bytes, &path.display().to_string())
        }
        GeometrySource::Bytes(bytes) => parse_bytes(bytes, "in-memory bytes"),
        GeometrySource::Url(url) => {
            let response = fetcher.fetch_json().url(url.as_str()).call().await?;
            if response.status != 200 {
                return Err(RegionError::SourceParse {
                    origin: url.clone(),
                    reason: format!("server responded with status {}", response.status),
                });
            }
            parse_geojson(response.payload, url)
        }
    }
}

pub(crate) fn parse_bytes(bytes: &[u8], origin: &str) -> Result<LoadedGeometries, RegionError> {
    if bytes.starts_with(&SHAPEFILE_MAGIC) {
        debug!("Reading {} as a shapefile", origin);
        return parse_shapefile(bytes, origin);
    }
    let value = serde_json::from_slice::<Value>(bytes).map_err(|e| RegionError::SourceParse {
        origin: origin.to_string(),
        reason: e.to_string(),
    })?;
    parse_geojson(value, origin)
}

/// Features, feature collections and bare geometries. A legacy `crs` member
/// overrides the WGS84 default.
pub(crate) fn parse_geojson(value: Value, origin: &str) -> Result<LoadedGeometries, RegionError> {
    let crs = match value.pointer("/crs/properties/name").and_then(Value::as_str) {
        Some(name) => name.parse::<Crs>()?,
        None => Crs::Wgs84,
    };

    let parse_error = |reason: String| RegionError::SourceParse {
        origin: origin.to_string(),
        reason,
    };
    let geojson = GeoJson::from_json_value(value).map_err(|e| parse_error(e.to_string()))?;
    let raw: Vec<geojson::Geometry> = match geojson {
        GeoJson::FeatureCollection(fc) => fc
            .features
            .into_iter()
            .filter_map(|feature| feature.geometry)
            .collect(),
        GeoJson::Feature(feature) => feature.geometry.into_iter().collect(),
        GeoJson::Geometry(geometry) => vec![geometry],
    };

    let geometries = raw
        .into_iter()
        .map(Geometry::<f64>::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| parse_error(e.to_string()))?;
    if geometries.is_empty() {
        return Err(parse_error("no geometries found".to_string()));
    }

    Ok(LoadedGeometries {
        geometries,
        crs: Some(crs),
    })
}

fn parse_shapefile(bytes: &[u8], origin: &str) -> Result<LoadedGeometries, RegionError> {
    let parse_error = |reason: String| RegionError::SourceParse {
        origin: origin.to_string(),
        reason,
    };
    let mut reader = shapefile::ShapeReader::new(Cursor::new(bytes))
        .map_err(|e| parse_error(format!("Failed to read shapefile: {}", e)))?;

    let mut geometries = Vec::new();
    for result in reader.iter_shapes() {
        let shape = result.map_err(|e| parse_error(format!("Failed to read shape: {}", e)))?;
        match convert_shape(&shape) {
            Some(geometry) => geometries.push(geometry),
            None => warn!("Skipping unsupported shape in {}", origin),
        }
    }
    if geometries.is_empty() {
        return Err(parse_error("no geometries found".to_string()));
    }

    // .shp files carry no CRS; the .prj sidecar is not read.
    Ok(LoadedGeometries {
        geometries,
        crs: None,
    })
}

fn to_coords(points: &[shapefile::Point]) -> Vec<Coord<f64>> {
    points.iter().map(|p| Coord { x: p.x, y: p.y }).collect()
}

fn convert_shape(shape: &shapefile::Shape) -> Option<Geometry<f64>> {
    match shape {
        shapefile::Shape::Point(p) => Some(Point::new(p.x, p.y).into()),
        shapefile::Shape::Polyline(pl) => {
            let lines = pl
                .parts()
                .iter()
                .map(|part| LineString::new(to_coords(part)))
                .collect::<Vec<_>>();
            Some(MultiLineString::new(lines).into())
        }
        shapefile::Shape::Polygon(poly) => {
            // Inner rings follow the outer ring they belong to.
            let mut polygons: Vec<(LineString<f64>, Vec<LineString<f64>>)> = Vec::new();
            for ring in poly.rings() {
                let line = LineString::new(to_coords(ring.points()));
                match ring {
                    PolygonRing::Outer(_) => polygons.push((line, Vec::new())),
                    PolygonRing::Inner(_) => match polygons.last_mut() {
                        Some((_, holes)) => holes.push(line),
                        None => polygons.push((line, Vec::new())),
                    },
                }
            }
            let mut polygons = polygons
                .into_iter()
                .map(|(exterior, holes)| Polygon::new(exterior, holes))
                .collect::<Vec<_>>();
            match polygons.len() {
                0 => None,
                1 => polygons.pop().map(Geometry::from),
                _ => Some(MultiPolygon::new(polygons).into()),
            }
        }
        _ => None,
    }
}
