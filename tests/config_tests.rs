// Config loading and validation tests

use sth::config::{AppConfig, ShouldStore};
use sth::models::{DataModel, Resolution};

const VALID_CONFIG: &str = r#"
[database]
path = "data/sth.db"
max_pool_size = 10
db_prefix = "sth_"
collection_prefix = "sth_"
data_model = "collection-per-attribute"
should_hash = true
should_store = "only-aggregated"
ignore_blank_spaces = false

[aggregation]
aggregation_by = ["month", "day", "hour", "minute", "second"]
filter_out_empty = false

[truncation]
expire_after_seconds = 3600
size = 0
max = 0

[retention]
prune_interval_secs = 30
vacuum_schedule = "0 0 3 * * *"
vacuum_interval_secs = 600
"#;

const MINIMAL_CONFIG: &str = r#"
[database]
path = "data/sth.db"
max_pool_size = 4

[aggregation]
aggregation_by = ["day", "hour", "minute"]
"#;

#[test]
fn test_config_loads_from_str() {
    let config = AppConfig::load_from_str(VALID_CONFIG).expect("load_from_str");
    assert_eq!(config.database.path, "data/sth.db");
    assert_eq!(config.database.max_pool_size, 10);
    assert_eq!(config.database.data_model, DataModel::CollectionPerAttribute);
    assert!(config.database.should_hash);
    assert_eq!(config.database.should_store, ShouldStore::OnlyAggregated);
    assert!(!config.database.ignore_blank_spaces);
    assert_eq!(
        config.aggregation.aggregation_by,
        vec![
            Resolution::Month,
            Resolution::Day,
            Resolution::Hour,
            Resolution::Minute,
            Resolution::Second
        ]
    );
    assert!(!config.aggregation.filter_out_empty);
    assert_eq!(config.truncation.expire_after_seconds, 3600);
    assert_eq!(config.retention.prune_interval_secs, 30);
    assert_eq!(
        config.retention.vacuum_schedule.as_deref(),
        Some("0 0 3 * * *")
    );
    assert_eq!(config.retention.vacuum_interval_secs, 600);
}

#[test]
fn test_config_defaults_when_omitted() {
    let config = AppConfig::load_from_str(MINIMAL_CONFIG).expect("valid");
    assert_eq!(config.database.db_prefix, "sth_");
    assert_eq!(config.database.collection_prefix, "sth_");
    assert_eq!(config.database.data_model, DataModel::CollectionPerEntity);
    assert!(!config.database.should_hash);
    assert_eq!(config.database.should_store, ShouldStore::Both);
    assert!(config.database.ignore_blank_spaces);
    assert!(config.aggregation.filter_out_empty);
    assert_eq!(config.truncation.expire_after_seconds, 0);
    assert_eq!(config.truncation.size, 0);
    assert_eq!(config.truncation.max, 0);
    assert_eq!(config.retention.prune_interval_secs, 60);
    assert!(config.retention.vacuum_schedule.is_none());
    assert_eq!(config.retention.vacuum_interval_secs, 86400);
}

#[test]
fn test_should_store_modes() {
    assert!(ShouldStore::Both.raw() && ShouldStore::Both.aggregated());
    assert!(ShouldStore::OnlyRaw.raw() && !ShouldStore::OnlyRaw.aggregated());
    assert!(!ShouldStore::OnlyAggregated.raw() && ShouldStore::OnlyAggregated.aggregated());
}

#[test]
fn test_config_validation_rejects_empty_db_path() {
    let bad = VALID_CONFIG.replace("path = \"data/sth.db\"", "path = \"\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("database.path"));
}

#[test]
fn test_config_validation_rejects_max_pool_size_zero() {
    let bad = VALID_CONFIG.replace("max_pool_size = 10", "max_pool_size = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("max_pool_size"));
}

#[test]
fn test_config_validation_rejects_dotted_db_prefix() {
    let bad = VALID_CONFIG.replace("db_prefix = \"sth_\"", "db_prefix = \"sth.\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("db_prefix"));
}

#[test]
fn test_config_validation_rejects_empty_aggregation_by() {
    let bad = MINIMAL_CONFIG.replace(
        "aggregation_by = [\"day\", \"hour\", \"minute\"]",
        "aggregation_by = []",
    );
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("aggregation_by"));
}

#[test]
fn test_config_validation_rejects_duplicate_resolution() {
    let bad = MINIMAL_CONFIG.replace(
        "aggregation_by = [\"day\", \"hour\", \"minute\"]",
        "aggregation_by = [\"day\", \"day\"]",
    );
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("aggregation_by"));
}

#[test]
fn test_config_rejects_unknown_resolution() {
    let bad = MINIMAL_CONFIG.replace(
        "aggregation_by = [\"day\", \"hour\", \"minute\"]",
        "aggregation_by = [\"week\"]",
    );
    assert!(AppConfig::load_from_str(&bad).is_err());
}

#[test]
fn test_config_rejects_unknown_data_model() {
    let bad = VALID_CONFIG.replace("collection-per-attribute", "collection-per-tenant");
    assert!(AppConfig::load_from_str(&bad).is_err());
}

#[test]
fn test_config_validation_rejects_max_without_size() {
    let bad = VALID_CONFIG.replace("max = 0", "max = 100");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("truncation.max"));
}

#[test]
fn test_config_validation_rejects_prune_interval_zero() {
    let bad = VALID_CONFIG.replace("prune_interval_secs = 30", "prune_interval_secs = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("prune_interval_secs"));
}

#[test]
fn test_config_validation_rejects_vacuum_interval_zero() {
    let bad = VALID_CONFIG.replace("vacuum_interval_secs = 600", "vacuum_interval_secs = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("vacuum_interval_secs"));
}

#[test]
fn test_config_validation_rejects_invalid_toml() {
    let err = AppConfig::load_from_str("not valid toml [[[").unwrap_err();
    assert!(!err.to_string().is_empty());
}

#[test]
fn test_config_load_from_file_via_env() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, VALID_CONFIG).unwrap();
    unsafe { std::env::set_var("CONFIG_FILE", path.to_str().unwrap()) };
    let result = AppConfig::load();
    unsafe { std::env::remove_var("CONFIG_FILE") };
    let config = result.expect("load from CONFIG_FILE");
    assert_eq!(config.database.path, "data/sth.db");
    assert_eq!(config.database.data_model, DataModel::CollectionPerAttribute);
}
