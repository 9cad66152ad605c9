use crate::region::crs::Crs;
use crate::region::model::Region;
use crate::stations::catalog::StationCatalog;
use crate::stations::error::LocateStationError;
use crate::stations::spatial_join::{JoinHow, SpatialJoin};
use geo::{BoundingRect, Point};
use log::{debug, info};
use polars::prelude::*;
use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};

/// Name of the column added by a left join.
pub const IN_REGION_COL: &str = "in_region";

type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// The catalog rows kept by a spatial join, in catalog order.
#[derive(Debug, Clone)]
pub struct StationSet {
    frame: DataFrame,
    points: Vec<Option<Point<f64>>>,
    in_region: Vec<bool>,
    crs: Crs,
    id_col: String,
}

impl StationSet {
    /// All catalog columns of the kept rows (plus [`IN_REGION_COL`] for left joins).
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Station locations in [`StationSet::crs`].
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
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// Ids of the stations inside the region, as text.
    pub fn ids(&self) -> Result<Vec<String>, LocateStationError> {
        let ids = self
            .frame
            .column(&self.id_col)
            .map_err(|_| LocateStationError::MissingColumn(self.id_col.clone()))?
            .cast(&DataType::String)?;
        Ok(ids
            .str()?
            .into_iter()
            .zip(&self.in_region)
            .filter(|(_, inside)| **inside)
            .filter_map(|(id, _)| id.map(str::to_string))
            .collect())
    }
}

/// Joins `catalog` with `region`.
///
/// Station points are moved into the region's CRS, pre-filtered against the
/// bounding rectangle of each region geometry and then tested with the join
/// predicate. A station inside several geometries is kept once.
///
/// # Errors
///
/// Returns [`LocateStationError::Polars`] if the catalog frame cannot be filtered.
pub fn locate_stations(
    catalog: &StationCatalog,
    region: &Region,
    join: SpatialJoin,
) -> Result<StationSet, LocateStationError> {
    let target = region.crs();
    let points: Vec<Option<Point<f64>>> = if catalog.crs() == target {
        catalog.points().to_vec()
    } else {
        debug!("Reprojecting stations from {} to {}", catalog.crs(), target);
        catalog
            .points()
            .iter()
            .map(|p| p.map(|p| Point::from(catalog.crs().transform(p.0, target))))
            .collect()
    };

    let tree: RTree<IndexedPoint> = RTree::bulk_load(
        points
            .iter()
            .enumerate()
            .filter_map(|(row, p)| p.map(|p| GeomWithData::new([p.x(), p.y()], row)))
            .collect(),
    );

    let mut in_region = vec![false; points.len()];
    for geometry in region.geometries() {
        let Some(rect) = geometry.bounding_rect() else {
            continue;
        };
        let envelope = AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);
        for candidate in tree.locate_in_envelope_intersecting(&envelope) {
            let row = candidate.data;
            if in_region[row] {
                continue;
            }
            if let Some(point) = &points[row] {
                in_region[row] = join.predicate.evaluate(point, geometry);
            }
        }
    }
    let matched = in_region.iter().filter(|inside| **inside).count();
    info!(
        "Located {} of {} stations with predicate '{}'",
        matched,
        points.len(),
        join.predicate
    );

    let (frame, points, in_region) = match join.how {
        JoinHow::Inner => {
            let mask = BooleanChunked::from_slice("mask".into(), &in_region);
            let kept = points
                .into_iter()
                .zip(&in_region)
                .filter_map(|(p, inside)| inside.then_some(p))
                .collect();
            (catalog.frame().filter(&mask)?, kept, vec![true; matched])
        }
        JoinHow::Left => {
            let mut frame = catalog.frame().clone();
            frame.with_column(Column::new(IN_REGION_COL.into(), in_region.as_slice()))?;
            (frame, points, in_region)
        }
    };

    Ok(StationSet {
        frame,
        points,
        in_region,
        crs: target,
        id_col: catalog.id_col().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stations::spatial_join::SpatialPredicate;
    use crate::table::json_normalize;
    use geo::{polygon, Geometry};
    use serde_json::json;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry<f64> {
        polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
            (x: x0, y: y0),
        ]
        .into()
    }

    /// Ten stations on a diagonal; ids 3 to 8 fall inside [2.5, 8.5]².
    fn diagonal_catalog() -> StationCatalog {
        let records: Vec<_> = (0..10)
            .map(|i| json!({"id": i, "name": format!("station {i}"), "x": i as f64, "y": i as f64}))
            .collect();
        StationCatalog::from_frame(json_normalize(&records).unwrap(), "x", "y", Crs::Wgs84).unwrap()
    }

    #[test]
    fn keeps_inside_rows_in_catalog_order() -> Result<(), LocateStationError> {
        let region = Region::new(vec![square(2.5, 2.5, 8.5, 8.5)], Crs::Wgs84).unwrap();
        let stations = locate_stations(&diagonal_catalog(), &region, SpatialJoin::default())?;

        assert_eq!(stations.len(), 6);
        assert_eq!(stations.ids()?, ["3", "4", "5", "6", "7", "8"]);
        let names: Vec<&str> = stations
            .frame()
            .get_column_names()
            .iter()
            .map(|n| n.as_str())
            .collect();
        assert_eq!(names, ["id", "name", "x", "y"]);
        assert_eq!(stations.points().len(), 6);
        Ok(())
    }

    #[test]
    fn overlapping_geometries_do_not_duplicate() -> Result<(), LocateStationError> {
        let region = Region::new(
            vec![square(2.5, 2.5, 6.5, 6.5), square(4.5, 4.5, 8.5, 8.5)],
            Crs::Wgs84,
        )
        .unwrap();
        let stations = locate_stations(&diagonal_catalog(), &region, SpatialJoin::default())?;
        assert_eq!(stations.ids()?, ["3", "4", "5", "6", "7", "8"]);
        Ok(())
    }

    #[test]
    fn boundary_points_depend_on_predicate() -> Result<(), LocateStationError> {
        let region = Region::new(vec![square(3.0, 3.0, 5.0, 5.0)], Crs::Wgs84).unwrap();
        let catalog = diagonal_catalog();

        let touching = locate_stations(&catalog, &region, SpatialJoin::default())?;
        assert_eq!(touching.ids()?, ["3", "4", "5"]);

        let within = SpatialJoin::new(SpatialPredicate::Within, JoinHow::Inner);
        let inside = locate_stations(&catalog, &region, within)?;
        assert_eq!(inside.ids()?, ["4"]);
        Ok(())
    }

    #[test]
    fn left_join_keeps_every_row() -> Result<(), LocateStationError> {
        let region = Region::new(vec![square(2.5, 2.5, 8.5, 8.5)], Crs::Wgs84).unwrap();
        let join = SpatialJoin::new(SpatialPredicate::Intersects, JoinHow::Left);
        let stations = locate_stations(&diagonal_catalog(), &region, join)?;

        assert_eq!(stations.len(), 10);
        let flags: Vec<Option<bool>> = stations
            .frame()
            .column(IN_REGION_COL)?
            .bool()?
            .into_iter()
            .collect();
        assert_eq!(flags.iter().filter(|f| **f == Some(true)).count(), 6);
        assert_eq!(flags[0], Some(false));
        assert_eq!(stations.ids()?.len(), 6);
        Ok(())
    }

    #[test]
    fn stations_without_coordinates_never_match() -> Result<(), LocateStationError> {
        let frame = json_normalize(&[
            json!({"id": "a", "x": 1.0, "y": 1.0}),
            json!({"id": "b", "x": null, "y": 1.0}),
        ])?;
        let catalog = StationCatalog::from_frame(frame, "x", "y", Crs::Wgs84)?;
        let region = Region::new(vec![square(0.0, 0.0, 2.0, 2.0)], Crs::Wgs84).unwrap();
        let stations = locate_stations(&catalog, &region, SpatialJoin::default())?;
        assert_eq!(stations.ids()?, ["a"]);
        Ok(())
    }

    #[test]
    fn catalog_points_are_reprojected_to_region_crs() -> Result<(), LocateStationError> {
        // Pully and Zürich, in LV03 as agrometeo publishes them
        let frame = json_normalize(&[
            json!({"id": 1, "name": "Pully", "lat_ch": 540_500.0, "long_ch": 151_500.0}),
            json!({"id": 2, "name": "Zürich", "lat_ch": 683_000.0, "long_ch": 248_000.0}),
        ])?;
        let catalog = StationCatalog::from_frame(frame, "lat_ch", "long_ch", Crs::SwissLv03)?;
        let lake_geneva = Region::from_bbox([6.4, 46.3, 6.8, 46.6], Crs::Wgs84).unwrap();

        let stations = locate_stations(&catalog, &lake_geneva, SpatialJoin::default())?;
        assert_eq!(stations.ids()?, ["1"]);
        assert_eq!(stations.crs(), Crs::Wgs84);
        let pully = stations.points()[0].unwrap();
        assert!((pully.x() - 6.66).abs() < 0.05 && (pully.y() - 46.51).abs() < 0.05);
        Ok(())
    }

    #[test]
    fn empty_catalog_gives_empty_set() -> Result<(), LocateStationError> {
        let frame = DataFrame::new(vec![
            Column::new("id".into(), Vec::<i64>::new()),
            Column::new("x".into(), Vec::<f64>::new()),
            Column::new("y".into(), Vec::<f64>::new()),
        ])?;
        let catalog = StationCatalog::from_frame(frame, "x", "y", Crs::Wgs84)?;
        let region = Region::from_bbox([0.0, 0.0, 1.0, 1.0], Crs::Wgs84).unwrap();
        let stations = locate_stations(&catalog, &region, SpatialJoin::default())?;
        assert!(stations.is_empty());
        assert!(stations.ids()?.is_empty());
        Ok(())
    }
}
