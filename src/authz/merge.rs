//! Merge algebra for access results
//!
//! Two folds are used: *stricter* while building a single bucket's result
//! from LIMIT rules and layer details, and *larger* (with the other
//! permissive unions here) while enlarging results across buckets.

use crate::geometry::{Geometry, GeometryEngine, union_aligned};
use crate::error::GeometryError;
use crate::model::{AccessInfo, CatalogMode, Grant, LayerAttribute};
use std::collections::BTreeSet;

/// The stricter of two catalog modes; an absent side yields the other
pub fn stricter(a: Option<CatalogMode>, b: Option<CatalogMode>) -> Option<CatalogMode> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// The more permissive of two catalog modes; an absent side yields the other
pub fn larger(a: Option<CatalogMode>, b: Option<CatalogMode>) -> Option<CatalogMode> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// OR two CQL filters. An absent filter is unrestricted, so it wins.
pub fn union_cql(a: Option<&str>, b: Option<&str>) -> Option<String> {
    match (a, b) {
        (Some(a), Some(b)) => Some(format!("({}) OR ({})", a, b)),
        _ => None,
    }
}

/// Union two style sets. An empty set is unrestricted, so it wins.
pub fn union_styles(a: &BTreeSet<String>, b: &BTreeSet<String>) -> BTreeSet<String> {
    if a.is_empty() || b.is_empty() {
        return BTreeSet::new();
    }
    a.union(b).cloned().collect()
}

/// Union two attribute lists by name, keeping the wider access level.
///
/// An empty list is unrestricted, so it wins.
pub fn union_attributes(a: &[LayerAttribute], b: &[LayerAttribute]) -> Vec<LayerAttribute> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }

    let mut merged: Vec<LayerAttribute> = a.to_vec();
    for attribute in b {
        match merged.iter_mut().find(|m| m.name == attribute.name) {
            Some(existing) => {
                existing.access = existing.access.max(attribute.access);
                if existing.data_type.is_none() {
                    existing.data_type = attribute.data_type.clone();
                }
            }
            None => merged.push(attribute.clone()),
        }
    }
    merged
}

fn union_slot(
    engine: &dyn GeometryEngine,
    a: Option<&Geometry>,
    b: Option<&Geometry>,
) -> Result<Option<Geometry>, GeometryError> {
    match (a, b) {
        (Some(a), Some(b)) => union_aligned(engine, a, b).map(Some),
        (Some(g), None) | (None, Some(g)) => Ok(Some(g.clone())),
        (None, None) => Ok(None),
    }
}

/// Union the areas of two ALLOW results.
///
/// Returns `(area, clip_area)`. A side with no area at all is unrestricted
/// and clears both slots. Otherwise each slot unions with the same slot
/// only; an intersect area and a clip area are never merged into each other.
pub fn merge_areas(
    engine: &dyn GeometryEngine,
    a: &AccessInfo,
    b: &AccessInfo,
) -> Result<(Option<Geometry>, Option<Geometry>), GeometryError> {
    let unrestricted = |info: &AccessInfo| info.area.is_none() && info.clip_area.is_none();
    if unrestricted(a) || unrestricted(b) {
        return Ok((None, None));
    }
    let area = union_slot(engine, a.area.as_ref(), b.area.as_ref())?;
    let clip_area = union_slot(engine, a.clip_area.as_ref(), b.clip_area.as_ref())?;
    Ok((area, clip_area))
}

/// Combine two ALLOW results into one granting what either grants
fn merge_allow(
    engine: &dyn GeometryEngine,
    a: AccessInfo,
    b: AccessInfo,
) -> Result<AccessInfo, GeometryError> {
    let (area, clip_area) = merge_areas(engine, &a, &b)?;
    let default_style = match (&a.default_style, &b.default_style) {
        (Some(x), Some(y)) if x == y => Some(x.clone()),
        _ => None,
    };

    Ok(AccessInfo {
        grant: Grant::Allow,
        cql_filter_read: union_cql(a.cql_filter_read.as_deref(), b.cql_filter_read.as_deref()),
        cql_filter_write: union_cql(
            a.cql_filter_write.as_deref(),
            b.cql_filter_write.as_deref(),
        ),
        catalog_mode: larger(a.catalog_mode, b.catalog_mode),
        area,
        clip_area,
        default_style,
        allowed_styles: union_styles(&a.allowed_styles, &b.allowed_styles),
        attributes: union_attributes(&a.attributes, &b.attributes),
        admin_rights: a.admin_rights || b.admin_rights,
        matching_rules: a.matching_rules,
    })
}

/// One step of the enlarge fold.
///
/// A DENY or undecided bucket never revokes access already granted by
/// another bucket, and never contributes on its own.
pub fn enlarge(
    engine: &dyn GeometryEngine,
    acc: Option<AccessInfo>,
    next: Option<AccessInfo>,
) -> Result<Option<AccessInfo>, GeometryError> {
    let next = next.filter(AccessInfo::is_allowed);
    match (acc, next) {
        (None, next) => Ok(next),
        (Some(acc), None) => Ok(Some(acc)),
        (Some(acc), Some(next)) => merge_allow(engine, acc, next).map(Some),
    }
}
