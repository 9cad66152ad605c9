use crate::http::error::FetchError;
use crate::http::fetcher::HttpFetcher;
use crate::region::crs::Crs;
use crate::region::error::RegionError;
use crate::region::geocode::Geocoder;
use crate::region::model::{GeometrySource, Region, RegionSpec};
use crate::region::source;
use log::{debug, info};
use std::path::PathBuf;

/// Normalizes any region description into a [`Region`] in `target` CRS.
///
/// Bounding boxes and bare geometries are taken to be in `target` already.
/// Geocoded places are WGS84 and file content carries its own CRS (WGS84 for
/// GeoJSON without a `crs` member, `target` for shapefiles).
pub async fn resolve_region<G: Geocoder>(
    spec: RegionSpec,
    target: Crs,
    fetcher: &HttpFetcher,
    geocoder: &G,
) -> Result<Region, RegionError> {
    let region = match spec {
        RegionSpec::Prebuilt(region) => region,
        RegionSpec::BoundingBox(bbox) => Region::from_bbox(bbox, target)?,
        RegionSpec::Geometry(geometry) => Region::new(vec![geometry], target)?,
        RegionSpec::Geometries(geometries) => Region::new(geometries, target)?,
        RegionSpec::File(source) => load_source(&source, target, fetcher).await?,
        RegionSpec::Query(query) => geocode_region(&query, geocoder).await?,
        RegionSpec::Place(place) => resolve_place(&place, target, fetcher, geocoder).await?,
    };
    debug!(
        "Resolved region with {} geometries from {}",
        region.geometries().len(),
        region.crs()
    );
    Ok(region.to_crs(target))
}

async fn load_source(
    source: &GeometrySource,
    target: Crs,
    fetcher: &HttpFetcher,
) -> Result<Region, RegionError> {
    let loaded = source::load(source, fetcher).await?;
    Region::new(loaded.geometries, loaded.crs.unwrap_or(target))
}

async fn geocode_region<G: Geocoder>(query: &str, geocoder: &G) -> Result<Region, RegionError> {
    let first = geocoder
        .geocode(query)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| RegionError::InvalidRegion(format!("no place found for '{query}'")))?;
    Region::new(vec![first], Crs::Wgs84)
}

async fn resolve_place<G: Geocoder>(
    place: &str,
    target: Crs,
    fetcher: &HttpFetcher,
    geocoder: &G,
) -> Result<Region, RegionError> {
    let source = if place.starts_with("http://") || place.starts_with("https://") {
        Some(GeometrySource::Url(place.to_string()))
    } else if tokio::fs::try_exists(place).await.unwrap_or(false) {
        Some(GeometrySource::Path(PathBuf::from(place)))
    } else {
        None
    };

    let Some(source) = source else {
        return geocode_region(place, geocoder).await;
    };
    match load_source(&source, target, fetcher).await {
        Err(e) if is_unreadable_source(&e) => {
            info!("'{}' is not a geometry source ({}), geocoding it", place, e);
            geocode_region(place, geocoder).await
        }
        other => other,
    }
}

fn is_unreadable_source(error: &RegionError) -> bool {
    matches!(
        error,
        RegionError::SourceRead(..)
            | RegionError::SourceParse { .. }
            | RegionError::Fetch(FetchError::UnhandledResponse { .. })
    )
}
