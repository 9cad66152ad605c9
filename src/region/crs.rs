//! Coordinate reference systems used by the supported providers.
//!
//! All conversions go through WGS84. The Swiss grids use swisstopo's
//! approximate formulas, accurate to about a metre within Switzerland.

use crate::region::error::RegionError;
use geo::Coord;
use std::f64::consts::FRAC_PI_4;
use std::fmt;
use std::str::FromStr;

const EARTH_RADIUS_M: f64 = 6_378_137.0;
const LV95_EAST_OFFSET: f64 = 2_000_000.0;
const LV95_NORTH_OFFSET: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Crs {
    /// EPSG:4326, x = longitude, y = latitude.
    #[default]
    Wgs84,
    /// EPSG:3857
    WebMercator,
    /// EPSG:21781, CH1903 / LV03
    SwissLv03,
    /// EPSG:2056, CH1903+ / LV95
    SwissLv95,
}

impl Crs {
    pub fn epsg(self) -> u32 {
        match self {
            Crs::Wgs84 => 4326,
            Crs::WebMercator => 3857,
            Crs::SwissLv03 => 21781,
            Crs::SwissLv95 => 2056,
        }
    }

    pub fn from_epsg(code: u32) -> Result<Self, RegionError> {
        match code {
            4326 => Ok(Crs::Wgs84),
            3857 | 900913 => Ok(Crs::WebMercator),
            21781 => Ok(Crs::SwissLv03),
            2056 => Ok(Crs::SwissLv95),
            other => Err(RegionError::UnsupportedCrs(format!("EPSG:{other}"))),
        }
    }

    /// Converts a coordinate in this CRS to WGS84 longitude/latitude.
    pub fn unproject(self, coord: Coord<f64>) -> Coord<f64> {
        match self {
            Crs::Wgs84 => coord,
            Crs::WebMercator => Coord {
                x: (coord.x / EARTH_RADIUS_M).to_degrees(),
                y: (2.0 * (coord.y / EARTH_RADIUS_M).exp().atan() - 2.0 * FRAC_PI_4)
                    .to_degrees(),
            },
            Crs::SwissLv03 => lv03_to_wgs84(coord),
            Crs::SwissLv95 => lv03_to_wgs84(Coord {
                x: coord.x - LV95_EAST_OFFSET,
                y: coord.y - LV95_NORTH_OFFSET,
            }),
        }
    }

    /// Converts a WGS84 longitude/latitude into this CRS.
    pub fn project(self, coord: Coord<f64>) -> Coord<f64> {
        match self {
            Crs::Wgs84 => coord,
            Crs::WebMercator => Coord {
                x: EARTH_RADIUS_M * coord.x.to_radians(),
                y: EARTH_RADIUS_M * (FRAC_PI_4 + coord.y.to_radians() / 2.0).tan().ln(),
            },
            Crs::SwissLv03 => wgs84_to_lv03(coord),
            Crs::SwissLv95 => {
                let lv03 = wgs84_to_lv03(coord);
                Coord {
                    x: lv03.x + LV95_EAST_OFFSET,
                    y: lv03.y + LV95_NORTH_OFFSET,
                }
            }
        }
    }

    /// Converts a coordinate expressed in `self` into `target`.
    pub fn transform(self, coord: Coord<f64>, target: Crs) -> Coord<f64> {
        if self == target {
            return coord;
        }
        target.project(self.unproject(coord))
    }
}

fn wgs84_to_lv03(coord: Coord<f64>) -> Coord<f64> {
    // auxiliary values in units of 10000"
    let phi = (coord.y * 3600.0 - 169_028.66) / 10_000.0;
    let lambda = (coord.x * 3600.0 - 26_782.5) / 10_000.0;

    let east = 600_072.37 + 211_455.93 * lambda
        - 10_938.51 * lambda * phi
        - 0.36 * lambda * phi.powi(2)
        - 44.54 * lambda.powi(3);
    let north = 200_147.07 + 308_807.95 * phi + 3_745.25 * lambda.powi(2) + 76.63 * phi.powi(2)
        - 194.56 * lambda.powi(2) * phi
        + 119.79 * phi.powi(3);
    Coord { x: east, y: north }
}

fn lv03_to_wgs84(coord: Coord<f64>) -> Coord<f64> {
    let y = (coord.x - 600_000.0) / 1_000_000.0;
    let x = (coord.y - 200_000.0) / 1_000_000.0;

    let lambda = 2.677_909_4 + 4.728_982 * y + 0.791_484 * y * x + 0.130_6 * y * x.powi(2)
        - 0.043_6 * y.powi(3);
    let phi = 16.902_389_2 + 3.238_272 * x
        - 0.270_978 * y.powi(2)
        - 0.002_528 * x.powi(2)
        - 0.044_7 * y.powi(2) * x
        - 0.014_0 * x.powi(3);
    Coord {
        x: lambda * 100.0 / 36.0,
        y: phi * 100.0 / 36.0,
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl FromStr for Crs {
    type Err = RegionError;

    /// Accepts `EPSG:n`, `urn:ogc:def:crs:EPSG::n` and the OGC CRS84 URN.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if lower.ends_with("crs84") {
            return Ok(Crs::Wgs84);
        }
        if lower.starts_with("epsg:") || lower.starts_with("urn:ogc:def:crs:epsg:") {
            if let Some(Ok(code)) = lower.rsplit(':').next().map(str::parse::<u32>) {
                return Crs::from_epsg(code);
            }
        }
        Err(RegionError::UnsupportedCrs(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dms(d: f64, m: f64, s: f64) -> f64 {
        d + m / 60.0 + s / 3600.0
    }

    #[test]
    fn swisstopo_reference_point() {
        let wgs = Coord {
            x: dms(8.0, 43.0, 49.79),
            y: dms(46.0, 2.0, 38.87),
        };
        let lv03 = Crs::Wgs84.transform(wgs, Crs::SwissLv03);
        assert!((lv03.x - 700_000.0).abs() < 1.0, "east was {}", lv03.x);
        assert!((lv03.y - 100_000.0).abs() < 1.0, "north was {}", lv03.y);

        let lv95 = Crs::Wgs84.transform(wgs, Crs::SwissLv95);
        assert!((lv95.x - 2_700_000.0).abs() < 1.0);
        assert!((lv95.y - 1_100_000.0).abs() < 1.0);
    }

    #[test]
    fn swiss_round_trip_stays_close() {
        let pully = Coord { x: 6.6669, y: 46.5118 };
        let back = Crs::SwissLv03
            .transform(Crs::Wgs84.transform(pully, Crs::SwissLv03), Crs::Wgs84);
        assert!((back.x - pully.x).abs() < 1e-4);
        assert!((back.y - pully.y).abs() < 1e-4);
    }

    #[test]
    fn web_mercator_round_trip() {
        let coord = Coord { x: -93.65, y: 42.03 };
        let merc = Crs::Wgs84.transform(coord, Crs::WebMercator);
        let back = Crs::WebMercator.transform(merc, Crs::Wgs84);
        assert!((back.x - coord.x).abs() < 1e-9);
        assert!((back.y - coord.y).abs() < 1e-9);
        let origin = Crs::Wgs84.transform(Coord { x: 0.0, y: 0.0 }, Crs::WebMercator);
        assert!(origin.x.abs() < 1e-6 && origin.y.abs() < 1e-6);
    }

    #[test]
    fn parses_crs_identifiers() {
        assert_eq!("EPSG:21781".parse::<Crs>().unwrap(), Crs::SwissLv03);
        assert_eq!("epsg:4326".parse::<Crs>().unwrap(), Crs::Wgs84);
        assert_eq!(
            "urn:ogc:def:crs:EPSG::2056".parse::<Crs>().unwrap(),
            Crs::SwissLv95
        );
        assert_eq!(
            "urn:ogc:def:crs:OGC:1.3:CRS84".parse::<Crs>().unwrap(),
            Crs::Wgs84
        );
        assert!(matches!(
            "EPSG:32632".parse::<Crs>(),
            Err(RegionError::UnsupportedCrs(_))
        ));
        assert!("lv03".parse::<Crs>().is_err());
        assert_eq!(Crs::SwissLv95.to_string(), "EPSG:2056");
    }
}
