use crate::http::error::FetchError;
use crate::http::fetcher::HttpFetcher;
use crate::http::request::params;
use crate::region::error::RegionError;
use crate::settings::Settings;
use geo::{coord, Geometry, Rect};
use log::{info, warn};
use serde_json::Value;
use std::future::Future;

/// Turns a free-text place name into candidate WGS84 geometries, best match first.
pub trait Geocoder: Send + Sync {
    fn geocode(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<Vec<Geometry<f64>>, RegionError>> + Send;
}

/// Geocoder backed by the OpenStreetMap Nominatim search API.
#[derive(Debug, Clone)]
pub struct Nominatim {
    fetcher: HttpFetcher,
    endpoint: String,
}

impl Nominatim {
    pub const ENDPOINT: &'static str = "https://nominatim.openstreetmap.org/search";

    pub fn new(settings: &Settings) -> Result<Self, FetchError> {
        Ok(Self {
            fetcher: HttpFetcher::builder().settings(settings.clone()).build()?,
            endpoint: Self::ENDPOINT.to_string(),
        })
    }

    /// Points the geocoder at another Nominatim instance.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl Geocoder for Nominatim {
    async fn geocode(&self, query: &str) -> Result<Vec<Geometry<f64>>, RegionError> {
        let unavailable = |reason: String| RegionError::GeocodingUnavailable {
            query: query.to_string(),
            reason,
        };
        let response = self
            .fetcher
            .fetch_json()
            .url(self.endpoint.as_str())
            .params(params([
                ("q", query),
                ("format", "json"),
                ("polygon_geojson", "1"),
            ]))
            .call()
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        if response.status != 200 {
            return Err(unavailable(format!(
                "Nominatim responded with status {}",
                response.status
            )));
        }

        let candidates: Vec<Geometry<f64>> = response
            .payload
            .as_array()
            .map(|places| places.iter().filter_map(place_geometry).collect())
            .unwrap_or_default();
        info!("Geocoded '{}' to {} candidates", query, candidates.len());
        Ok(candidates)
    }
}

/// The outline of a search result, or its bounding box when it has none.
fn place_geometry(place: &Value) -> Option<Geometry<f64>> {
    if let Some(outline) = place.get("geojson") {
        match geojson::Geometry::from_json_value(outline.clone())
            .map_err(|e| e.to_string())
            .and_then(|g| Geometry::<f64>::try_from(g).map_err(|e| e.to_string()))
        {
            Ok(geometry) => return Some(geometry),
            Err(e) => warn!("Ignoring unreadable place outline: {}", e),
        }
    }

    // ["south", "north", "west", "east"], as strings
    let bbox = place
        .get("boundingbox")?
        .as_array()?
        .iter()
        .map(|v| match v {
            Value::String(s) => s.parse::<f64>().ok(),
            other => other.as_f64(),
        })
        .collect::<Option<Vec<f64>>>()?;
    match bbox.as_slice() {
        [south, north, west, east] => Some(
            Rect::new(coord! { x: *west, y: *south }, coord! { x: *east, y: *north })
                .to_polygon()
                .into(),
        ),
        _ => None,
    }
}

/// Refuses every query; for offline use where only explicit geometries are expected.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeocoder;

impl Geocoder for NoGeocoder {
    async fn geocode(&self, query: &str) -> Result<Vec<Geometry<f64>>, RegionError> {
        Err(RegionError::GeocodingUnavailable {
            query: query.to_string(),
            reason: "geocoding is disabled".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_settings, MockResponse, MockServer};
    use geo::BoundingRect;
    use serde_json::json;

    #[tokio::test]
    async fn prefers_outline_over_bounding_box() -> Result<(), RegionError> {
        let server = MockServer::start().await;
        server.route(
            "/search",
            vec![MockResponse::json(
                200,
                json!([
                    {
                        "display_name": "Pully, District de Lavaux-Oron, Vaud, Schweiz",
                        "boundingbox": ["46.49", "46.53", "6.64", "6.69"],
                        "geojson": {"type": "Polygon", "coordinates": [[
                            [6.64, 46.49], [6.69, 46.49], [6.69, 46.53], [6.64, 46.53], [6.64, 46.49]
                        ]]}
                    },
                    {
                        "display_name": "Pully, Ain, France",
                        "boundingbox": ["45.90", "45.95", "5.10", "5.20"]
                    }
                ]),
            )],
        );
        let tmp = tempfile::tempdir().unwrap();
        let geocoder =
            Nominatim::new(&test_settings(tmp.path()))?.with_endpoint(server.url("/search"));

        let candidates = geocoder.geocode("Pully").await?;
        assert_eq!(candidates.len(), 2);
        assert!(matches!(candidates[0], Geometry::Polygon(_)));
        let fallback = candidates[1].bounding_rect().unwrap();
        assert_eq!(fallback.min(), coord! { x: 5.10, y: 45.90 });
        assert_eq!(fallback.max(), coord! { x: 5.20, y: 45.95 });

        let request = &server.requests()[0];
        assert!(request.contains("q=Pully"));
        assert!(request.contains("polygon_geojson=1"));
        Ok(())
    }

    #[tokio::test]
    async fn network_failure_is_geocoding_unavailable() {
        let server = MockServer::start().await;
        server.route("/search", vec![MockResponse::text(503, "maintenance")]);
        let tmp = tempfile::tempdir().unwrap();
        let geocoder = Nominatim::new(&test_settings(tmp.path()))
            .unwrap()
            .with_endpoint(server.url("/search"));

        let result = geocoder.geocode("Pully").await;
        assert!(matches!(
            result,
            Err(RegionError::GeocodingUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn disabled_geocoder_refuses() {
        let result = NoGeocoder.geocode("Lausanne").await;
        assert!(matches!(
            result,
            Err(RegionError::GeocodingUnavailable { .. })
        ));
    }
}
