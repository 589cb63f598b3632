//! Geometry engine contract
//!
//! Geometries are carried as WKT text tagged with a spatial reference id.
//! The heavy lifting (parsing, intersection, union, reprojection) is done by
//! an injected [`GeometryEngine`]; [`PlanarEngine`] is the built-in one.
//! Binary operations require both operands in the same reference system.
//! Inside the crate the `*_aligned` helpers reproject the second operand first.

pub mod planar;

pub use planar::PlanarEngine;

use crate::error::GeometryError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reference system assumed when EWKT input carries no `SRID=` prefix
pub const DEFAULT_SRID: u32 = 4326;

/// A geometry in a known spatial reference system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Geometry {
    pub srid: u32,
    pub wkt: String,
}

impl Geometry {
    pub fn new(srid: u32, wkt: impl Into<String>) -> Self {
        Self {
            srid,
            wkt: wkt.into(),
        }
    }

    /// Render as EWKT (`SRID=4326;POLYGON(...)`)
    pub fn to_ewkt(&self) -> String {
        format!("SRID={};{}", self.srid, self.wkt)
    }
}

impl FromStr for Geometry {
    type Err = GeometryError;

    /// Split EWKT into reference id and WKT without validating the WKT
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let Some(rest) = trimmed.strip_prefix("SRID=") else {
            return Ok(Geometry::new(DEFAULT_SRID, trimmed));
        };
        let (srid, wkt) = rest.split_once(';').ok_or_else(|| GeometryError::Parse {
            input: trimmed.to_string(),
            reason: "missing ';' after SRID".to_string(),
        })?;
        let srid = srid.trim().parse().map_err(|_| GeometryError::Parse {
            input: trimmed.to_string(),
            reason: format!("invalid SRID '{}'", srid),
        })?;
        Ok(Geometry::new(srid, wkt.trim()))
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_ewkt())
    }
}

/// Geometry operations the resolver depends on
pub trait GeometryEngine: Send + Sync {
    /// Parse WKT or EWKT into a normalized geometry
    fn parse(&self, text: &str) -> Result<Geometry, GeometryError>;

    /// Intersection; operands must share a reference system
    fn intersect(&self, a: &Geometry, b: &Geometry) -> Result<Geometry, GeometryError>;

    /// Union; operands must share a reference system
    fn union(&self, a: &Geometry, b: &Geometry) -> Result<Geometry, GeometryError>;

    /// Transform into `srid`. Reprojecting to the current reference system is
    /// the identity.
    fn reproject(&self, geometry: &Geometry, srid: u32) -> Result<Geometry, GeometryError>;

    /// Render as EWKT
    fn serialize(&self, geometry: &Geometry) -> String {
        geometry.to_ewkt()
    }
}

/// Intersect after bringing `b` into `a`'s reference system
pub(crate) fn intersect_aligned(
    engine: &dyn GeometryEngine,
    a: &Geometry,
    b: &Geometry,
) -> Result<Geometry, GeometryError> {
    let b = engine.reproject(b, a.srid)?;
    engine.intersect(a, &b)
}

/// Union after bringing `b` into `a`'s reference system
pub(crate) fn union_aligned(
    engine: &dyn GeometryEngine,
    a: &Geometry,
    b: &Geometry,
) -> Result<Geometry, GeometryError> {
    let b = engine.reproject(b, a.srid)?;
    engine.union(a, &b)
}

/// Intersect two optional areas; an absent area does not restrict.
pub fn intersect_optional(
    engine: &dyn GeometryEngine,
    a: Option<Geometry>,
    b: Option<&Geometry>,
) -> Result<Option<Geometry>, GeometryError> {
    match (a, b) {
        (Some(a), Some(b)) => intersect_aligned(engine, &a, b).map(Some),
        (Some(a), None) => Ok(Some(a)),
        (None, b) => Ok(b.cloned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ewkt() {
        let g: Geometry = "SRID=3857;POINT(1 2)".parse().unwrap();
        assert_eq!(g.srid, 3857);
        assert_eq!(g.wkt, "POINT(1 2)");
    }

    #[test]
    fn test_plain_wkt_defaults_to_wgs84() {
        let g: Geometry = "POINT(1 2)".parse().unwrap();
        assert_eq!(g.srid, DEFAULT_SRID);
    }

    #[test]
    fn test_bad_srid() {
        assert!("SRID=abc;POINT(1 2)".parse::<Geometry>().is_err());
        assert!("SRID=4326 POINT(1 2)".parse::<Geometry>().is_err());
    }

    #[test]
    fn test_to_ewkt_roundtrip_text() {
        let g = Geometry::new(4326, "POINT(1 2)");
        assert_eq!(g.to_string(), "SRID=4326;POINT(1 2)");
    }
}
