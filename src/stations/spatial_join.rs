//! Spatial join options used when intersecting a station catalog with a region.

use geo::{Geometry, Intersects, Point, Within};
use std::fmt;
use std::str::FromStr;

/// Geometric relation a station point must have with a region geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SpatialPredicate {
    /// The point touches the geometry anywhere, boundary included.
    #[default]
    Intersects,
    /// The point lies in the interior of the geometry (boundary excluded).
    Within,
}

impl SpatialPredicate {
    pub fn evaluate(&self, point: &Point<f64>, geometry: &Geometry<f64>) -> bool {
        match self {
            SpatialPredicate::Intersects => point.intersects(geometry),
            SpatialPredicate::Within => point.is_within(geometry),
        }
    }
}

impl fmt::Display for SpatialPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpatialPredicate::Intersects => write!(f, "intersects"),
            SpatialPredicate::Within => write!(f, "within"),
        }
    }
}

impl FromStr for SpatialPredicate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "intersects" => Ok(SpatialPredicate::Intersects),
            "within" => Ok(SpatialPredicate::Within),
            other => Err(format!("unsupported spatial predicate '{other}'")),
        }
    }
}

/// Which catalog rows survive the join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JoinHow {
    /// Only rows matching the predicate.
    #[default]
    Inner,
    /// Every catalog row, matching or not.
    Left,
}

/// Predicate and join type, the only parameters of the station join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SpatialJoin {
    pub predicate: SpatialPredicate,
    pub how: JoinHow,
}

impl SpatialJoin {
    pub fn new(predicate: SpatialPredicate, how: JoinHow) -> Self {
        Self { predicate, how }
    }
}
