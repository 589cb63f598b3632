//! Configuration module
//!
//! Layered loading (defaults, TOML file, `GEOFENCE_RULES__*` environment) of
//! logging, store and resolution settings plus the seed rule sets.

pub mod loader;
pub mod types;

pub use loader::{load_config, load_config_from_str};
pub use types::{AppConfig, LogFormat, LoggingConfig, ResolutionConfig, StoreConfig};
