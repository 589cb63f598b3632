//! Geofence rule engine
//!
//! Authorization decisions for a GIS data server, computed from a
//! priority-ordered rule set.
//!
//! ## Features
//!
//! - **Rule resolution** with per-role buckets, LIMIT accumulation and
//!   cross-role enlargement into a single grant
//! - **Admin rights** per workspace from a separate admin rule set
//! - **Priority management** that keeps priorities unique under concurrent
//!   inserts, moves, shifts and swaps
//! - **Access summaries** listing visible and hidden layers per workspace
//!
//! ## Resolution Model
//!
//! ```text
//! candidates → role buckets → first ALLOW/DENY per bucket → enlarge → AccessInfo
//! ```
//!
//! Rules are matched in ascending priority order. LIMIT rules met before the
//! deciding ALLOW restrict it (area, clipping, catalog mode). A DENY from
//! one role never revokes access granted through another.
//!
//! ## Example Configuration
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [[rules]]
//! grant = "LIMIT"
//! rolename = "guests"
//! limits = { catalog_mode = "MIXED" }
//!
//! [[rules]]
//! grant = "ALLOW"
//! workspace = "topp"
//! ```

pub mod authz;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod geometry;
pub mod model;
pub mod service;
pub mod store;

// Re-export main types
pub use authz::AccessResolver;
pub use config::{AppConfig, load_config};
pub use engine::Engine;
pub use error::{AuthzError, ConfigError, GeometryError, RuleError};
