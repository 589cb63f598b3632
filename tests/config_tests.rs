//! Configuration loading tests

use geofence_rules::config::{LogFormat, load_config_from_str};
use geofence_rules::model::{AdminGrantType, CatalogMode, GrantType, SpatialFilterType};

const MINIMAL_CONFIG: &str = r#"
[logging]
level = "warn"
"#;

const FULL_CONFIG: &str = r#"
[logging]
level = "debug"
format = "json"

[store]
default_page_size = 25
max_page_size = 250

[resolution]
admin_rights = false

[[rules]]
priority = 10
grant = "LIMIT"
rolename = "guests"

[rules.limits]
catalog_mode = "MIXED"
spatial_filter_type = "CLIP"
allowed_area = { srid = 4326, wkt = "POLYGON((0 0,10 0,10 10,0 10,0 0))" }

[[rules]]
priority = 20
grant = "ALLOW"
workspace = "topp"
layer = "states"

[rules.layer_details]
default_style = "population"
allowed_styles = ["population", "pophatch"]
cql_filter_read = "PERSONS > 1000000"

[[rules.layer_details.attributes]]
name = "STATE_NAME"
access = "READONLY"

[[rules]]
grant = "DENY"

[[admin_rules]]
grant = "ADMIN"
username = "alice"
workspace = "topp"

[[admin_rules]]
grant = "USER"
"#;

#[test]
fn test_minimal_config() {
    let config = load_config_from_str(MINIMAL_CONFIG).unwrap();

    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert_eq!(config.store.default_page_size, 100);
    assert_eq!(config.store.max_page_size, 1000);
    assert!(config.resolution.admin_rights);
    assert!(config.rules.is_empty());
    assert!(config.admin_rules.is_empty());
}

#[test]
fn test_full_config() {
    let config = load_config_from_str(FULL_CONFIG).unwrap();

    // Logging and store
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.store.default_page_size, 25);
    assert_eq!(config.store.max_page_size, 250);
    assert!(!config.resolution.admin_rights);

    // LIMIT seed
    let limit = &config.rules[0];
    assert_eq!(limit.grant(), GrantType::Limit);
    assert_eq!(limit.identifier.rolename.as_deref(), Some("guests"));
    let limits = limit.limits.as_ref().unwrap();
    assert_eq!(limits.catalog_mode, CatalogMode::Mixed);
    assert_eq!(limits.spatial_filter_type, SpatialFilterType::Clip);
    assert_eq!(limits.allowed_area.as_ref().unwrap().srid, 4326);

    // ALLOW seed with layer details
    let allow = &config.rules[1];
    let details = allow.layer_details.as_ref().unwrap();
    assert_eq!(details.default_style.as_deref(), Some("population"));
    assert_eq!(details.allowed_styles.len(), 2);
    assert_eq!(details.attributes[0].name, "STATE_NAME");

    // Appended DENY
    assert_eq!(config.rules[2].grant(), GrantType::Deny);
    assert_eq!(config.rules[2].priority, 0);

    // Admin rules
    assert_eq!(config.admin_rules.len(), 2);
    assert_eq!(config.admin_rules[0].grant(), AdminGrantType::Admin);
    assert_eq!(config.admin_rules[1].grant(), AdminGrantType::User);
}

#[test]
fn test_config_defaults() {
    let config = load_config_from_str("").unwrap();
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.store.page_size(None), 100);
}

#[test]
fn test_invalid_grant_rejected() {
    let config_str = r#"
[[rules]]
grant = "MAYBE"
"#;

    assert!(load_config_from_str(config_str).is_err());
}

#[test]
fn test_negative_seed_priority_rejected() {
    let config_str = r#"
[[admin_rules]]
priority = -1
grant = "ADMIN"
"#;

    let err = load_config_from_str(config_str).unwrap_err();
    assert!(err.to_string().contains("must not be negative"));
}

#[test]
fn test_seed_with_id_rejected() {
    let config_str = r#"
[[rules]]
id = 7
grant = "ALLOW"
"#;

    assert!(load_config_from_str(config_str).is_err());
}

#[test]
#[serial_test::serial]
fn test_env_var_overrides_file() {
    use geofence_rules::config::load_config;
    use std::env;
    use std::fs;
    use tempfile::tempdir;

    let dir = tempdir().unwrap();
    let config_path = dir.path().join("test-config.toml");
    fs::write(&config_path, MINIMAL_CONFIG).unwrap();

    unsafe {
        env::set_var("GEOFENCE_RULES__LOGGING__LEVEL", "trace");
        env::set_var("GEOFENCE_RULES__STORE__MAX_PAGE_SIZE", "500");
    }

    let config = load_config(Some(config_path.to_str().unwrap())).unwrap();

    // Environment takes precedence over the file
    assert_eq!(config.logging.level, "trace");
    assert_eq!(config.store.max_page_size, 500);

    unsafe {
        env::remove_var("GEOFENCE_RULES__LOGGING__LEVEL");
        env::remove_var("GEOFENCE_RULES__STORE__MAX_PAGE_SIZE");
    }
}

#[test]
#[serial_test::serial]
fn test_env_var_validation_applies() {
    use geofence_rules::config::load_config;
    use std::env;
    use std::fs;
    use tempfile::tempdir;

    let dir = tempdir().unwrap();
    let config_path = dir.path().join("test-config.toml");
    fs::write(&config_path, MINIMAL_CONFIG).unwrap();

    unsafe {
        env::set_var("GEOFENCE_RULES__STORE__DEFAULT_PAGE_SIZE", "5000");
    }

    let result = load_config(Some(config_path.to_str().unwrap()));
    assert!(result.is_err());

    unsafe {
        env::remove_var("GEOFENCE_RULES__STORE__DEFAULT_PAGE_SIZE");
    }
}

#[test]
#[serial_test::serial]
fn test_missing_explicit_file() {
    use geofence_rules::config::load_config;
    use tempfile::tempdir;

    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope.toml");
    let err = load_config(Some(missing.to_str().unwrap())).unwrap_err();
    assert!(err.to_string().contains("not found"));
}
