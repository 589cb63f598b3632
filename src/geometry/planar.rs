//! Planar polygon engine backed by `geo`
//!
//! Allowed areas are polygons or multipolygons. Intersection and union are
//! exact boolean operations in the plane of the reference system, so a union
//! of disjoint areas stays a multipolygon. Reprojection supports
//! EPSG:4326 <-> EPSG:3857 (spherical mercator) vertex by vertex.

use crate::error::GeometryError;
use crate::geometry::{Geometry, GeometryEngine};
use geo::{BooleanOps, Coord, MapCoords, MultiPolygon};
use std::f64::consts::PI;
use wkt::{ToWkt, TryFromWkt};

pub const WGS84: u32 = 4326;
pub const WEB_MERCATOR: u32 = 3857;

const EARTH_RADIUS: f64 = 6_378_137.0;
const EMPTY_POLYGON: &str = "POLYGON EMPTY";

#[derive(Debug, Clone, Copy, Default)]
pub struct PlanarEngine;

impl PlanarEngine {
    pub fn new() -> Self {
        Self
    }

    fn check_srid(a: &Geometry, b: &Geometry) -> Result<(), GeometryError> {
        if a.srid != b.srid {
            return Err(GeometryError::SridMismatch {
                left: a.srid,
                right: b.srid,
            });
        }
        Ok(())
    }
}

impl GeometryEngine for PlanarEngine {
    fn parse(&self, text: &str) -> Result<Geometry, GeometryError> {
        let raw: Geometry = text.parse()?;
        Ok(from_shape(raw.srid, to_shape(&raw.wkt)?))
    }

    fn intersect(&self, a: &Geometry, b: &Geometry) -> Result<Geometry, GeometryError> {
        Self::check_srid(a, b)?;
        let shape = to_shape(&a.wkt)?.intersection(&to_shape(&b.wkt)?);
        Ok(from_shape(a.srid, shape))
    }

    fn union(&self, a: &Geometry, b: &Geometry) -> Result<Geometry, GeometryError> {
        Self::check_srid(a, b)?;
        let shape = to_shape(&a.wkt)?.union(&to_shape(&b.wkt)?);
        Ok(from_shape(a.srid, shape))
    }

    fn reproject(&self, geometry: &Geometry, srid: u32) -> Result<Geometry, GeometryError> {
        if geometry.srid == srid {
            return Ok(geometry.clone());
        }
        let transform: fn(f64, f64) -> (f64, f64) = match (geometry.srid, srid) {
            (WGS84, WEB_MERCATOR) => to_mercator,
            (WEB_MERCATOR, WGS84) => from_mercator,
            (from, to) => return Err(GeometryError::UnsupportedTransform { from, to }),
        };
        let shape = to_shape(&geometry.wkt)?.map_coords(|Coord { x, y }| {
            let (x, y) = transform(x, y);
            Coord { x, y }
        });
        Ok(from_shape(srid, shape))
    }
}

/// Parse polygonal WKT. Any `... EMPTY` geometry is the empty area.
fn to_shape(wkt: &str) -> Result<MultiPolygon<f64>, GeometryError> {
    let parse_err = |reason: String| GeometryError::Parse {
        input: wkt.to_string(),
        reason,
    };

    let trimmed = wkt.trim();
    if trimmed.to_ascii_uppercase().ends_with("EMPTY") {
        return Ok(MultiPolygon::new(Vec::new()));
    }
    let shape =
        geo::Geometry::<f64>::try_from_wkt_str(trimmed).map_err(|e| parse_err(e.to_string()))?;
    match shape {
        geo::Geometry::Polygon(polygon) => Ok(MultiPolygon::new(vec![polygon])),
        geo::Geometry::MultiPolygon(multi) => Ok(multi),
        geo::Geometry::Rect(rect) => Ok(MultiPolygon::new(vec![rect.to_polygon()])),
        geo::Geometry::Triangle(tri) => Ok(MultiPolygon::new(vec![tri.to_polygon()])),
        _ => Err(parse_err("areas must be POLYGON or MULTIPOLYGON".to_string())),
    }
}

fn from_shape(srid: u32, shape: MultiPolygon<f64>) -> Geometry {
    let wkt = match shape.0.as_slice() {
        [] => EMPTY_POLYGON.to_string(),
        [single] => single.wkt_string(),
        _ => shape.wkt_string(),
    };
    Geometry::new(srid, wkt)
}

fn to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let x = lon.to_radians() * EARTH_RADIUS;
    let y = (PI / 4.0 + lat.to_radians() / 2.0).tan().ln() * EARTH_RADIUS;
    (x, y)
}

fn from_mercator(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}
