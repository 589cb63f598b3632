//! Settings deserialized from the TOML file and `GEOFENCE_RULES__*` variables

use crate::model::{AdminRule, Rule};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub store: StoreConfig,
    pub resolution: ResolutionConfig,

    /// Rules inserted at startup, in file order
    pub rules: Vec<Rule>,

    /// Admin rules inserted at startup, in file order
    pub admin_rules: Vec<AdminRule>,
}

/// Rule store settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Page size used when a list call gives no limit
    pub default_page_size: usize,

    /// Upper bound for any requested page size
    pub max_page_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_page_size: 100,
            max_page_size: 1000,
        }
    }
}

impl StoreConfig {
    /// Clamp a requested page size to the configured bounds
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size)
    }
}

/// Resolution settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Compute admin rights for ALLOW results that name a workspace
    pub admin_rights: bool,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self { admin_rights: true }
    }
}

/// Log output settings; `RUST_LOG` overrides `level` when set
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `geofence_rules=debug`
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    /// One JSON object per line on stderr
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.store.default_page_size, 100);
        assert!(config.resolution.admin_rights);
        assert!(config.rules.is_empty());
    }

    #[test]
    fn test_page_size_clamped() {
        let store = StoreConfig {
            default_page_size: 10,
            max_page_size: 50,
        };
        assert_eq!(store.page_size(None), 10);
        assert_eq!(store.page_size(Some(500)), 50);
        assert_eq!(store.page_size(Some(0)), 1);
    }

    #[test]
    fn test_deserialize_log_format() {
        let format: LogFormat = serde_json::from_str(r#""json""#).unwrap();
        assert_eq!(format, LogFormat::Json);
    }
}
