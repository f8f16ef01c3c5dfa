use serde::Deserialize;

use crate::models::{DataModel, Resolution};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub truncation: TruncationConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_pool_size: u32,
    #[serde(default = "default_prefix")]
    pub db_prefix: String,
    #[serde(default = "default_prefix")]
    pub collection_prefix: String,
    #[serde(default = "default_data_model")]
    pub data_model: DataModel,
    /// Use SHA-512 based collection names instead of the literal identity.
    #[serde(default)]
    pub should_hash: bool,
    #[serde(default)]
    pub should_store: ShouldStore,
    /// Reject attribute values made only of blank spaces.
    #[serde(default = "default_true")]
    pub ignore_blank_spaces: bool,
}

fn default_prefix() -> String {
    "sth_".into()
}

fn default_data_model() -> DataModel {
    DataModel::CollectionPerEntity
}

fn default_true() -> bool {
    true
}

/// Which kind of history is written for each event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShouldStore {
    #[default]
    Both,
    OnlyRaw,
    OnlyAggregated,
}

impl ShouldStore {
    pub fn raw(self) -> bool {
        matches!(self, ShouldStore::Both | ShouldStore::OnlyRaw)
    }

    pub fn aggregated(self) -> bool {
        matches!(self, ShouldStore::Both | ShouldStore::OnlyAggregated)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregationConfig {
    /// Resolutions every event is aggregated by.
    pub aggregation_by: Vec<Resolution>,
    /// Drop never-aggregated points from aggregated query results.
    #[serde(default = "default_true")]
    pub filter_out_empty: bool,
}

/// Data management applied when a collection is created. 0 disables a policy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TruncationConfig {
    #[serde(default)]
    pub expire_after_seconds: u64,
    /// Cap (bytes) for raw collections. Capped raw collections get no TTL.
    #[serde(default)]
    pub size: u64,
    /// Document cap for capped raw collections.
    #[serde(default)]
    pub max: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// How often expired documents are pruned (real seconds).
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,
    /// Optional cron expression for VACUUM (e.g. "0 0 3 * * *" = 03:00 daily). Uses local time.
    #[serde(default)]
    pub vacuum_schedule: Option<String>,
    /// Run VACUUM every N seconds when vacuum_schedule is not set.
    #[serde(default = "default_vacuum_interval_secs")]
    pub vacuum_interval_secs: u64,
}

fn default_prune_interval_secs() -> u64 {
    60
}

fn default_vacuum_interval_secs() -> u64 {
    24 * 60 * 60
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            prune_interval_secs: default_prune_interval_secs(),
            vacuum_schedule: None,
            vacuum_interval_secs: default_vacuum_interval_secs(),
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        anyhow::ensure!(
            !self.database.db_prefix.contains('.'),
            "database.db_prefix must not contain '.', got {:?}",
            self.database.db_prefix
        );
        anyhow::ensure!(
            !self.aggregation.aggregation_by.is_empty(),
            "aggregation.aggregation_by must list at least one resolution"
        );
        let mut seen = Vec::with_capacity(self.aggregation.aggregation_by.len());
        for resolution in &self.aggregation.aggregation_by {
            anyhow::ensure!(
                !seen.contains(resolution),
                "aggregation.aggregation_by lists '{}' more than once",
                resolution
            );
            seen.push(*resolution);
        }
        anyhow::ensure!(
            self.truncation.max == 0 || self.truncation.size > 0,
            "truncation.max requires truncation.size > 0, got max = {}",
            self.truncation.max
        );
        anyhow::ensure!(
            self.retention.prune_interval_secs > 0,
            "retention.prune_interval_secs must be > 0, got {}",
            self.retention.prune_interval_secs
        );
        anyhow::ensure!(
            self.retention.vacuum_interval_secs > 0,
            "retention.vacuum_interval_secs must be > 0, got {}",
            self.retention.vacuum_interval_secs
        );
        Ok(())
    }
}
