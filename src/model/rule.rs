//! Data rules
//!
//! A [`Rule`] is a priority-ordered access directive keyed by a
//! [`RuleIdentifier`]. Unset identifier fields act as wildcards.

use crate::geometry::Geometry;
use crate::model::address::IpRange;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Opaque rule identifier, assigned by the store on creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(u64);

impl RuleId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Grant carried by a data rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GrantType {
    Allow,
    Deny,
    /// Narrows a later ALLOW in the same bucket; never decides on its own
    Limit,
}

impl GrantType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            GrantType::Allow => "ALLOW",
            GrantType::Deny => "DENY",
            GrantType::Limit => "LIMIT",
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How an allowed area restricts features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpatialFilterType {
    /// Features intersecting the area are returned whole
    #[default]
    Intersect,
    /// Feature geometries are clipped to the area
    Clip,
}

/// Catalog visibility of resources the user may not access.
///
/// Variants are declared from strictest to most permissive, so the derived
/// ordering reads as "permissiveness".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CatalogMode {
    #[default]
    Hide,
    Mixed,
    Challenge,
}

/// Access level of a single layer attribute, ordered from narrowest to widest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessType {
    None,
    ReadOnly,
    ReadWrite,
}

/// Kind of published layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LayerType {
    Vector,
    Raster,
    LayerGroup,
}

/// Named layer attribute with its access level
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerAttribute {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    pub access: AccessType,
}

impl LayerAttribute {
    pub fn new(name: impl Into<String>, access: AccessType) -> Self {
        Self {
            name: name.into(),
            data_type: None,
            access,
        }
    }

    pub fn with_data_type(self, data_type: impl Into<String>) -> Self {
        Self {
            data_type: Some(data_type.into()),
            ..self
        }
    }

    pub fn with_access(self, access: AccessType) -> Self {
        Self { access, ..self }
    }
}

/// Restrictions carried by a LIMIT rule
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleLimits {
    pub allowed_area: Option<Geometry>,
    pub spatial_filter_type: SpatialFilterType,
    pub catalog_mode: CatalogMode,
}

impl RuleLimits {
    pub fn with_allowed_area(self, area: Geometry) -> Self {
        Self {
            allowed_area: Some(area),
            ..self
        }
    }

    pub fn with_spatial_filter_type(self, spatial_filter_type: SpatialFilterType) -> Self {
        Self {
            spatial_filter_type,
            ..self
        }
    }

    pub fn with_catalog_mode(self, catalog_mode: CatalogMode) -> Self {
        Self {
            catalog_mode,
            ..self
        }
    }
}

/// Per-layer restrictions attached to an ALLOW rule with a fixed layer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerDetails {
    pub layer_type: Option<LayerType>,
    pub default_style: Option<String>,
    pub cql_filter_read: Option<String>,
    pub cql_filter_write: Option<String>,
    pub area: Option<Geometry>,
    pub spatial_filter_type: Option<SpatialFilterType>,
    pub catalog_mode: Option<CatalogMode>,
    /// Empty means every style is allowed
    pub allowed_styles: BTreeSet<String>,
    /// Empty means every attribute is accessible
    pub attributes: Vec<LayerAttribute>,
}

impl LayerDetails {
    pub fn with_layer_type(self, layer_type: LayerType) -> Self {
        Self {
            layer_type: Some(layer_type),
            ..self
        }
    }

    pub fn with_default_style(self, style: impl Into<String>) -> Self {
        Self {
            default_style: Some(style.into()),
            ..self
        }
    }

    pub fn with_cql_filter_read(self, cql: impl Into<String>) -> Self {
        Self {
            cql_filter_read: Some(cql.into()),
            ..self
        }
    }

    pub fn with_cql_filter_write(self, cql: impl Into<String>) -> Self {
        Self {
            cql_filter_write: Some(cql.into()),
            ..self
        }
    }

    pub fn with_area(self, area: Geometry) -> Self {
        Self {
            area: Some(area),
            ..self
        }
    }

    pub fn with_spatial_filter_type(self, spatial_filter_type: SpatialFilterType) -> Self {
        Self {
            spatial_filter_type: Some(spatial_filter_type),
            ..self
        }
    }

    pub fn with_catalog_mode(self, catalog_mode: CatalogMode) -> Self {
        Self {
            catalog_mode: Some(catalog_mode),
            ..self
        }
    }

    pub fn with_allowed_styles<I, S>(self, styles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_styles: styles.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    pub fn with_attribute(mut self, attribute: LayerAttribute) -> Self {
        self.attributes.retain(|a| a.name != attribute.name);
        self.attributes.push(attribute);
        self
    }
}

/// The tuple a rule is matched on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleIdentifier {
    pub grant: GrantType,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub rolename: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub request: Option<String>,
    #[serde(default)]
    pub subfield: Option<String>,
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default)]
    pub layer: Option<String>,
    #[serde(default)]
    pub address_range: Option<IpRange>,
}

impl RuleIdentifier {
    pub fn new(grant: GrantType) -> Self {
        Self {
            grant,
            username: None,
            rolename: None,
            service: None,
            request: None,
            subfield: None,
            workspace: None,
            layer: None,
            address_range: None,
        }
    }
}

/// A data access rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub id: Option<RuleId>,
    #[serde(default)]
    pub priority: i64,
    #[serde(flatten)]
    pub identifier: RuleIdentifier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<RuleLimits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_details: Option<LayerDetails>,
}

impl Rule {
    pub fn new(grant: GrantType) -> Self {
        Self {
            id: None,
            priority: 0,
            identifier: RuleIdentifier::new(grant),
            limits: None,
            layer_details: None,
        }
    }

    pub fn allow() -> Self {
        Self::new(GrantType::Allow)
    }

    pub fn deny() -> Self {
        Self::new(GrantType::Deny)
    }

    pub fn limit() -> Self {
        Self::new(GrantType::Limit)
    }

    pub fn grant(&self) -> GrantType {
        self.identifier.grant
    }

    pub fn with_id(self, id: RuleId) -> Self {
        Self {
            id: Some(id),
            ..self
        }
    }

    pub fn with_priority(self, priority: i64) -> Self {
        Self { priority, ..self }
    }

    pub fn with_grant(mut self, grant: GrantType) -> Self {
        self.identifier.grant = grant;
        self
    }

    pub fn with_user(mut self, username: impl Into<String>) -> Self {
        self.identifier.username = Some(username.into());
        self
    }

    pub fn with_role(mut self, rolename: impl Into<String>) -> Self {
        self.identifier.rolename = Some(rolename.into());
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.identifier.service = Some(service.into());
        self
    }

    pub fn with_request(mut self, request: impl Into<String>) -> Self {
        self.identifier.request = Some(request.into());
        self
    }

    pub fn with_subfield(mut self, subfield: impl Into<String>) -> Self {
        self.identifier.subfield = Some(subfield.into());
        self
    }

    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.identifier.workspace = Some(workspace.into());
        self
    }

    pub fn with_layer(mut self, layer: impl Into<String>) -> Self {
        self.identifier.layer = Some(layer.into());
        self
    }

    pub fn with_address_range(mut self, range: IpRange) -> Self {
        self.identifier.address_range = Some(range);
        self
    }

    pub fn with_limits(self, limits: RuleLimits) -> Self {
        Self {
            limits: Some(limits),
            ..self
        }
    }

    pub fn with_layer_details(self, details: LayerDetails) -> Self {
        Self {
            layer_details: Some(details),
            ..self
        }
    }

    /// Whether another live rule with the same identifier would conflict
    pub fn requires_unique_identifier(&self) -> bool {
        self.grant() != GrantType::Limit
    }

    /// Fill in limits and layer details this rule leaves unset from its
    /// stored version, as long as the grant and layer still allow them.
    pub fn inherit_attachments(self, stored: &Rule) -> Self {
        let grant = self.grant();
        let limits = match self.limits {
            None if grant == GrantType::Limit => stored.limits.clone(),
            limits => limits,
        };
        let layer_details = match self.layer_details {
            None if grant == GrantType::Allow && self.identifier.layer.is_some() => {
                stored.layer_details.clone()
            }
            details => details,
        };
        Self {
            limits,
            layer_details,
            ..self
        }
    }
}
