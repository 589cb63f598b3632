//! Layered configuration loading
//!
//! Sources, strongest first:
//! 1. `GEOFENCE_RULES__*` environment variables
//! 2. The TOML file given on the command line, or the first default path found
//! 3. Built-in defaults
//!
//! Seed rules are checked here so that a bad file fails before any store
//! is touched.

use crate::config::types::AppConfig;
use crate::error::ConfigError;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use std::collections::HashSet;
use std::path::Path;

/// Searched in order when no file is given explicitly
const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "geofence-rules.toml",
    ".geofence-rules.toml",
    "~/.config/geofence-rules/config.toml",
    "/etc/geofence-rules/config.toml",
];

/// Environment prefix; `__` separates nested keys
const ENV_PREFIX: &str = "GEOFENCE_RULES";

/// Parse configuration from TOML text, without file or environment lookup
pub fn load_config_from_str(toml_str: &str) -> Result<AppConfig, ConfigError> {
    finish(Config::builder().add_source(File::from_str(toml_str, FileFormat::Toml)))
}

/// Load configuration from a file and the environment.
///
/// An explicit `config_path` must exist; otherwise the default paths are
/// tried and a missing file just means defaults.
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();
    if let Some(file) = locate_config_file(config_path)? {
        builder = builder.add_source(File::new(&file, FileFormat::Toml));
    }

    // GEOFENCE_RULES__STORE__MAX_PAGE_SIZE -> store.max_page_size
    finish(
        builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        ),
    )
}

fn locate_config_file(config_path: Option<&str>) -> Result<Option<String>, ConfigError> {
    match config_path {
        Some(path) => {
            let expanded = shellexpand::tilde(path).into_owned();
            if Path::new(&expanded).exists() {
                Ok(Some(expanded))
            } else {
                Err(ConfigError::Load(format!(
                    "Configuration file not found: {}",
                    path
                )))
            }
        }
        None => Ok(DEFAULT_CONFIG_PATHS
            .iter()
            .map(|path| shellexpand::tilde(path).into_owned())
            .find(|path| Path::new(path).exists())),
    }
}

fn finish(builder: ConfigBuilder<DefaultState>) -> Result<AppConfig, ConfigError> {
    let app_config: AppConfig = builder
        .build()
        .and_then(Config::try_deserialize)
        .map_err(|e| ConfigError::Load(e.to_string()))?;
    validate_config(&app_config)?;
    Ok(app_config)
}

fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.store.default_page_size == 0 {
        return Err(ConfigError::Invalid {
            message: "store.default_page_size must be greater than 0".to_string(),
        });
    }

    if config.store.max_page_size == 0 {
        return Err(ConfigError::Invalid {
            message: "store.max_page_size must be greater than 0".to_string(),
        });
    }

    if config.store.default_page_size > config.store.max_page_size {
        return Err(ConfigError::Invalid {
            message: format!(
                "store.default_page_size ({}) exceeds store.max_page_size ({})",
                config.store.default_page_size, config.store.max_page_size
            ),
        });
    }

    validate_seed_priorities(
        "rules",
        config
            .rules
            .iter()
            .map(|r| (r.priority, r.id.is_some())),
    )?;
    validate_seed_priorities(
        "admin_rules",
        config
            .admin_rules
            .iter()
            .map(|r| (r.priority, r.id.is_some())),
    )?;

    Ok(())
}

/// Seeds get ids from the store; explicit priorities must be unique and
/// non-negative. Priority 0 means "append".
fn validate_seed_priorities(
    section: &str,
    seeds: impl Iterator<Item = (i64, bool)>,
) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for (index, (priority, has_id)) in seeds.enumerate() {
        if has_id {
            return Err(ConfigError::Invalid {
                message: format!("{}[{}]: seeded rules must not carry an id", section, index),
            });
        }
        if priority < 0 {
            return Err(ConfigError::Invalid {
                message: format!(
                    "{}[{}]: priority must not be negative, got {}",
                    section, index, priority
                ),
            });
        }
        if priority != 0 && !seen.insert(priority) {
            return Err(ConfigError::Invalid {
                message: format!("{}[{}]: duplicate priority {}", section, index, priority),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogFormat;
    use crate::model::{AdminGrantType, GrantType};

    #[test]
    fn test_store_section() {
        let store_toml = r#"
[logging]
level = "debug"
format = "json"

[store]
default_page_size = 20
"#;

        let config = load_config_from_str(store_toml).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.store.default_page_size, 20);
        assert_eq!(config.store.max_page_size, 1000);
    }

    #[test]
    fn test_load_seed_rules() {
        let toml = r#"
[[rules]]
priority = 10
grant = "ALLOW"
rolename = "editors"
service = "WMS"
layer = "roads"

[[rules]]
grant = "DENY"
address_range = "10.0.0.0/8"

[[admin_rules]]
grant = "ADMIN"
workspace = "topp"
"#;

        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.rules[0].priority, 10);
        assert_eq!(config.rules[0].grant(), GrantType::Allow);
        assert_eq!(config.rules[0].identifier.layer.as_deref(), Some("roads"));
        assert!(config.rules[1].identifier.address_range.is_some());
        assert_eq!(config.admin_rules[0].grant(), AdminGrantType::Admin);
    }

    #[test]
    fn test_default_page_size_above_max() {
        let toml = r#"
[store]
default_page_size = 500
max_page_size = 100
"#;

        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_zero_page_size() {
        let toml = r#"
[store]
max_page_size = 0
"#;

        assert!(load_config_from_str(toml).is_err());
    }

    #[test]
    fn test_duplicate_seed_priority() {
        let toml = r#"
[[rules]]
priority = 5
grant = "ALLOW"
layer = "a"

[[rules]]
priority = 5
grant = "ALLOW"
layer = "b"
"#;

        let err = load_config_from_str(toml).unwrap_err();
        assert!(err.to_string().contains("duplicate priority 5"));
    }

    #[test]
    fn test_bad_address_range() {
        let toml = r#"
[[rules]]
grant = "DENY"
address_range = "not-an-address"
"#;

        assert!(matches!(
            load_config_from_str(toml),
            Err(ConfigError::Load(_))
        ));
    }
}
