use serde::Deserialize;
use std::path::Path;

/// Top-level config loaded from `signal_engine.toml`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub completeness: CompletenessConfig,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_clickhouse_url")]
    pub clickhouse_url: String,
    #[serde(default = "default_clickhouse_database")]
    pub clickhouse_database: String,
    #[serde(default = "default_registry_db_path")]
    pub registry_db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            clickhouse_url: default_clickhouse_url(),
            clickhouse_database: default_clickhouse_database(),
            registry_db_path: default_registry_db_path(),
        }
    }
}

fn default_clickhouse_url() -> String {
    "http://localhost:8123".to_string()
}

fn default_clickhouse_database() -> String {
    "maude".to_string()
}

fn default_registry_db_path() -> String {
    "./entity_groups.db".to_string()
}

/// Data-completeness / reporting-lag defaults for the time window resolver.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletenessConfig {
    #[serde(default = "default_ingestion_lag_months")]
    pub ingestion_lag_months: u32,
}

impl Default for CompletenessConfig {
    fn default() -> Self {
        Self {
            ingestion_lag_months: default_ingestion_lag_months(),
        }
    }
}

fn default_ingestion_lag_months() -> u32 {
    2
}

/// Process-wide default thresholds per method. Requests may still override
/// any of these per-call via `SignalRequest.thresholds`.
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default = "default_zscore_high")]
    pub zscore_high: f64,
    #[serde(default = "default_zscore_elevated")]
    pub zscore_elevated: f64,
    #[serde(default = "default_disproportionality_high")]
    pub disproportionality_high: f64,
    #[serde(default = "default_disproportionality_elevated")]
    pub disproportionality_elevated: f64,
    #[serde(default = "default_cusum_high")]
    pub cusum_high: f64,
    #[serde(default = "default_cusum_elevated")]
    pub cusum_elevated: f64,
    #[serde(default = "default_yoy_pop_high")]
    pub yoy_pop_high: f64,
    #[serde(default = "default_yoy_pop_elevated")]
    pub yoy_pop_elevated: f64,
    #[serde(default = "default_min_disproportionality_a")]
    pub min_disproportionality_a: u64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            zscore_high: default_zscore_high(),
            zscore_elevated: default_zscore_elevated(),
            disproportionality_high: default_disproportionality_high(),
            disproportionality_elevated: default_disproportionality_elevated(),
            cusum_high: default_cusum_high(),
            cusum_elevated: default_cusum_elevated(),
            yoy_pop_high: default_yoy_pop_high(),
            yoy_pop_elevated: default_yoy_pop_elevated(),
            min_disproportionality_a: default_min_disproportionality_a(),
        }
    }
}

fn default_zscore_high() -> f64 {
    2.0
}
fn default_zscore_elevated() -> f64 {
    1.0
}
fn default_disproportionality_high() -> f64 {
    3.0
}
fn default_disproportionality_elevated() -> f64 {
    2.0
}
fn default_cusum_high() -> f64 {
    5.0
}
fn default_cusum_elevated() -> f64 {
    3.0
}
fn default_yoy_pop_high() -> f64 {
    100.0
}
fn default_yoy_pop_elevated() -> f64 {
    50.0
}
fn default_min_disproportionality_a() -> u64 {
    3
}

impl EngineConfig {
    /// Load config from a TOML file. Returns defaults if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("config file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&contents)?;
        tracing::info!("loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = EngineConfig::load("/nonexistent/path/signal_engine.toml").unwrap();
        assert_eq!(config.completeness.ingestion_lag_months, 2);
        assert_eq!(config.thresholds.zscore_high, 2.0);
    }

    #[test]
    fn partial_toml_fills_remaining_fields_from_defaults() {
        let dir = std::env::temp_dir().join("signal_engine_config_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("partial.toml");
        std::fs::write(&path, "[completeness]\ningestion_lag_months = 3\n").unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.completeness.ingestion_lag_months, 3);
        assert_eq!(config.thresholds.cusum_high, 5.0);

        std::fs::remove_file(&path).ok();
    }
}
