use crate::region::crs::Crs;
use crate::region::error::RegionError;
use geo::{coord, BoundingRect, Geometry, MapCoords, Polygon, Rect};
use std::path::PathBuf;

/// Geometries in a single, known CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    geometries: Vec<Geometry<f64>>,
    crs: Crs,
}

impl Region {
    pub fn new(geometries: Vec<Geometry<f64>>, crs: Crs) -> Result<Self, RegionError> {
        if geometries.is_empty() {
            return Err(RegionError::InvalidRegion(
                "a region needs at least one geometry".to_string(),
            ));
        }
        Ok(Self { geometries, crs })
    }

    /// A single rectangle from `[west, south, east, north]`.
    pub fn from_bbox(bbox: [f64; 4], crs: Crs) -> Result<Self, RegionError> {
        let [west, south, east, north] = bbox;
        if bbox.iter().any(|v| !v.is_finite()) || west > east || south > north {
            return Err(RegionError::InvalidRegion(format!(
                "bounding box {bbox:?} is not [west, south, east, north]"
            )));
        }
        let rect = Rect::new(coord! { x: west, y: south }, coord! { x: east, y: north });
        Self::new(vec![rect.to_polygon().into()], crs)
    }

    pub fn geometries(&self) -> &[Geometry<f64>] {
        &self.geometries
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    /// Reprojects every geometry into `target`.
    pub fn to_crs(self, target: Crs) -> Region {
        if self.crs == target {
            return self;
        }
        let source = self.crs;
        let geometries = self
            .geometries
            .iter()
            .map(|g| g.map_coords(|c| source.transform(c, target)))
            .collect();
        Region {
            geometries,
            crs: target,
        }
    }

    /// Union of the bounding rectangles of all geometries.
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        self.geometries
            .iter()
            .filter_map(|g| g.bounding_rect())
            .reduce(|a, b| {
                Rect::new(
                    coord! { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
                    coord! { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
                )
            })
    }
}

/// Where geometry file content comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometrySource {
    Path(PathBuf),
    Url(String),
    /// GeoJSON text or the content of a `.shp` file.
    Bytes(Vec<u8>),
}

/// The ways a region can be described.
///
/// Plain strings convert to [`RegionSpec::Place`], which loads URLs and
/// existing files and geocodes anything else.
///
/// ```
/// use meteostations::RegionSpec;
///
/// assert!(matches!(RegionSpec::from("Pully, Switzerland"), RegionSpec::Place(_)));
/// assert!(matches!(
///     RegionSpec::from([6.6, 46.5, 6.7, 46.6]),
///     RegionSpec::BoundingBox(_)
/// ));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RegionSpec {
    /// Place name resolved by the geocoder.
    Query(String),
    /// URL, path or place name, decided at resolution time.
    Place(String),
    /// `[west, south, east, north]` in the target CRS.
    BoundingBox([f64; 4]),
    /// A geometry in the target CRS.
    Geometry(Geometry<f64>),
    /// Geometries in the target CRS.
    Geometries(Vec<Geometry<f64>>),
    File(GeometrySource),
    Prebuilt(Region),
}

impl From<&str> for RegionSpec {
    fn from(value: &str) -> Self {
        RegionSpec::Place(value.to_string())
    }
}

impl From<String> for RegionSpec {
    fn from(value: String) -> Self {
        RegionSpec::Place(value)
    }
}

impl From<[f64; 4]> for RegionSpec {
    fn from(value: [f64; 4]) -> Self {
        RegionSpec::BoundingBox(value)
    }
}

impl From<Geometry<f64>> for RegionSpec {
    fn from(value: Geometry<f64>) -> Self {
        RegionSpec::Geometry(value)
    }
}

impl From<Polygon<f64>> for RegionSpec {
    fn from(value: Polygon<f64>) -> Self {
        RegionSpec::Geometry(value.into())
    }
}

impl From<Vec<Geometry<f64>>> for RegionSpec {
    fn from(value: Vec<Geometry<f64>>) -> Self {
        RegionSpec::Geometries(value)
    }
}

impl From<GeometrySource> for RegionSpec {
    fn from(value: GeometrySource) -> Self {
        RegionSpec::File(value)
    }
}

impl From<Region> for RegionSpec {
    fn from(value: Region) -> Self {
        RegionSpec::Prebuilt(value)
    }
}
