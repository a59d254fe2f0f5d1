use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::domain::metrics::catalog::CatalogConfig;
use crate::domain::metrics::drilldown::DEFAULT_MAX_DRILL_DOWN_DIMENSIONS;
use crate::domain::metrics::providers::MetricQueryConfig;
use crate::domain::metrics::service::MetricsSettings;
use crate::domain::metrics::traverse::TraverseSettings;
use crate::utils::retry::{
    DEFAULT_ATTEMPT_TIMEOUT_SECS, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS, RetryPolicy,
};

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_OFFLINE_CRITICAL_POINT_DAYS, DEFAULT_TIMEZONE,
    DEFAULT_TRAVERSE_CONCURRENCY, DEFAULT_TRAVERSE_FAILURE_COOLDOWN_SECS,
};

/// Upper limit accepted for `traverse.max_drill_down_dimensions`; the power
/// set of 16 dimensions is already 65536 queries per metric
const MAX_DRILL_DOWN_DIMENSIONS_LIMIT: usize = 16;

// =============================================================================
// File Config (all fields optional, merged across files)
// =============================================================================

#[derive(Debug, Default, Clone, Deserialize)]
pub struct MetricsFileConfig {
    pub support_offline: Option<bool>,
    pub offline_critical_point_days: Option<u32>,
    pub timezone: Option<String>,
    pub disabled_workspaces: Option<Vec<String>>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct TraverseFileConfig {
    pub max_attempts: Option<u32>,
    pub query_timeout_secs: Option<u64>,
    pub retry_base_delay_ms: Option<u64>,
    pub concurrency: Option<usize>,
    pub failure_cooldown_secs: Option<u64>,
    pub max_drill_down_dimensions: Option<usize>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub metrics: Option<MetricsFileConfig>,
    pub traverse: Option<TraverseFileConfig>,
    /// Replaces the built-in catalog as a whole
    pub catalog: Option<CatalogConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(metrics) = other.metrics {
            let current = self.metrics.get_or_insert_with(MetricsFileConfig::default);
            if metrics.support_offline.is_some() {
                tracing::trace!(support_offline = ?metrics.support_offline, "Merging metrics.support_offline");
                current.support_offline = metrics.support_offline;
            }
            if metrics.offline_critical_point_days.is_some() {
                current.offline_critical_point_days = metrics.offline_critical_point_days;
            }
            if metrics.timezone.is_some() {
                tracing::trace!(timezone = ?metrics.timezone, "Merging metrics.timezone");
                current.timezone = metrics.timezone;
            }
            if metrics.disabled_workspaces.is_some() {
                current.disabled_workspaces = metrics.disabled_workspaces;
            }
        }

        if let Some(traverse) = other.traverse {
            let current = self.traverse.get_or_insert_with(TraverseFileConfig::default);
            if traverse.max_attempts.is_some() {
                current.max_attempts = traverse.max_attempts;
            }
            if traverse.query_timeout_secs.is_some() {
                current.query_timeout_secs = traverse.query_timeout_secs;
            }
            if traverse.retry_base_delay_ms.is_some() {
                current.retry_base_delay_ms = traverse.retry_base_delay_ms;
            }
            if traverse.concurrency.is_some() {
                current.concurrency = traverse.concurrency;
            }
            if traverse.failure_cooldown_secs.is_some() {
                current.failure_cooldown_secs = traverse.failure_cooldown_secs;
            }
            if traverse.max_drill_down_dimensions.is_some() {
                current.max_drill_down_dimensions = traverse.max_drill_down_dimensions;
            }
        }

        if other.catalog.is_some() {
            tracing::trace!("Replacing catalog");
            self.catalog = other.catalog;
        }
    }
}

// =============================================================================
// Resolved Config
// =============================================================================

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub support_offline: bool,
    pub offline_critical_point_days: u32,
    pub timezone: Tz,
    pub disabled_workspaces: HashSet<String>,
}

#[derive(Debug, Clone)]
pub struct TraverseConfig {
    pub max_attempts: u32,
    pub query_timeout_secs: u64,
    pub retry_base_delay_ms: u64,
    pub concurrency: usize,
    pub failure_cooldown_secs: u64,
    pub max_drill_down_dimensions: usize,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub metrics: MetricsConfig,
    pub traverse: TraverseConfig,
    pub catalog: CatalogConfig,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.loopmetrics/loopmetrics.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        Self::load_layers(cli, get_profile_config_path())
    }

    fn load_layers(cli: &CliConfig, profile_path: Option<PathBuf>) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        // 1. Profile dir - skip if not exists
        if let Some(profile_path) = profile_path
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        // 2. CLI-specified path OR local directory
        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_home(path);
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        // 3. Layer: defaults -> file config -> CLI/env overrides
        let file_metrics = file_config.metrics.unwrap_or_default();
        let file_traverse = file_config.traverse.unwrap_or_default();

        let timezone_name = cli
            .timezone
            .clone()
            .or(file_metrics.timezone)
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone: Tz = timezone_name
            .parse()
            .map_err(|e| anyhow::anyhow!("Configuration error: invalid metrics.timezone: {e}"))?;

        let metrics = MetricsConfig {
            support_offline: cli
                .support_offline
                .or(file_metrics.support_offline)
                .unwrap_or(false),
            offline_critical_point_days: cli
                .offline_critical_point_days
                .or(file_metrics.offline_critical_point_days)
                .unwrap_or(DEFAULT_OFFLINE_CRITICAL_POINT_DAYS),
            timezone,
            disabled_workspaces: file_metrics
                .disabled_workspaces
                .unwrap_or_default()
                .into_iter()
                .collect(),
        };

        let traverse = TraverseConfig {
            max_attempts: file_traverse.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            query_timeout_secs: cli
                .traverse_query_timeout
                .or(file_traverse.query_timeout_secs)
                .unwrap_or(DEFAULT_ATTEMPT_TIMEOUT_SECS),
            retry_base_delay_ms: file_traverse
                .retry_base_delay_ms
                .unwrap_or(DEFAULT_BASE_DELAY_MS),
            concurrency: cli
                .traverse_concurrency
                .or(file_traverse.concurrency)
                .unwrap_or(DEFAULT_TRAVERSE_CONCURRENCY),
            failure_cooldown_secs: file_traverse
                .failure_cooldown_secs
                .unwrap_or(DEFAULT_TRAVERSE_FAILURE_COOLDOWN_SECS),
            max_drill_down_dimensions: file_traverse
                .max_drill_down_dimensions
                .unwrap_or(DEFAULT_MAX_DRILL_DOWN_DIMENSIONS),
        };

        let config = Self {
            metrics,
            traverse,
            catalog: file_config.catalog.unwrap_or_default(),
        };
        config.validate()?;

        tracing::debug!(
            support_offline = config.metrics.support_offline,
            timezone = %config.metrics.timezone,
            platforms = config.catalog.platforms.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    fn validate(&self) -> Result<()> {
        if self.traverse.max_attempts == 0 {
            anyhow::bail!("Configuration error: traverse.max_attempts must be greater than 0");
        }
        if self.traverse.concurrency == 0 {
            anyhow::bail!("Configuration error: traverse.concurrency must be greater than 0");
        }
        if self.traverse.max_drill_down_dimensions > MAX_DRILL_DOWN_DIMENSIONS_LIMIT {
            anyhow::bail!(
                "Configuration error: traverse.max_drill_down_dimensions must be at most {}",
                MAX_DRILL_DOWN_DIMENSIONS_LIMIT
            );
        }
        Ok(())
    }

    /// Runtime query switches served to the engine
    pub fn query_config(&self) -> MetricQueryConfig {
        MetricQueryConfig {
            support_offline: self.metrics.support_offline,
            offline_critical_point_days: self.metrics.offline_critical_point_days,
            disabled_workspaces: self.metrics.disabled_workspaces.clone(),
        }
    }

    pub fn metrics_settings(&self) -> MetricsSettings {
        let attempt_timeout = match self.traverse.query_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        MetricsSettings {
            timezone: self.metrics.timezone,
            traverse: TraverseSettings {
                retry: RetryPolicy {
                    max_attempts: self.traverse.max_attempts,
                    base_delay_ms: self.traverse.retry_base_delay_ms,
                    attempt_timeout,
                },
                concurrency: self.traverse.concurrency,
                failure_cooldown: Duration::from_secs(self.traverse.failure_cooldown_secs),
                max_drill_down_dimensions: self.traverse.max_drill_down_dimensions,
            },
        }
    }
}

/// Get the profile config path (~/.loopmetrics/loopmetrics.json)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}

/// Expand a leading `~` to the home directory
fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(json: &str) -> tempfile::NamedTempFile {
        let mut temp_file = tempfile::NamedTempFile::new().unwrap();
        temp_file.write_all(json.as_bytes()).unwrap();
        temp_file
    }

    fn load(cli: &CliConfig) -> Result<AppConfig> {
        AppConfig::load_layers(cli, None)
    }

    #[test]
    fn test_file_config_parse_partial() {
        let json = r#"{ "metrics": { "support_offline": true } }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();
        let metrics = config.metrics.unwrap();
        assert_eq!(metrics.support_offline, Some(true));
        assert!(metrics.timezone.is_none());
        assert!(config.traverse.is_none());
    }

    #[test]
    fn test_file_config_collects_unknown_fields() {
        let json = r#"{ "metrics": {}, "metircs": { "timezone": "UTC" } }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();
        let extra = config.extra.as_object().unwrap();
        assert!(extra.contains_key("metircs"));
        assert!(!extra.contains_key("metrics"));
    }

    #[test]
    fn test_merge_later_file_wins() {
        let mut base: FileConfig = serde_json::from_str(
            r#"{ "metrics": { "timezone": "UTC", "offline_critical_point_days": 5 } }"#,
        )
        .unwrap();
        let overlay: FileConfig =
            serde_json::from_str(r#"{ "metrics": { "timezone": "Asia/Shanghai" } }"#).unwrap();
        base.merge(overlay);
        let metrics = base.metrics.unwrap();
        assert_eq!(metrics.timezone.as_deref(), Some("Asia/Shanghai"));
        assert_eq!(metrics.offline_critical_point_days, Some(5));
    }

    #[test]
    fn test_defaults() {
        let file = write_config("{}");
        let cli = CliConfig {
            config: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let config = load(&cli).unwrap();
        assert!(!config.metrics.support_offline);
        assert_eq!(config.metrics.offline_critical_point_days, 3);
        assert_eq!(config.metrics.timezone, Tz::UTC);
        assert_eq!(config.traverse.max_attempts, 3);
        assert_eq!(config.traverse.query_timeout_secs, 60);
        assert_eq!(config.traverse.concurrency, 1);
        assert_eq!(config.traverse.max_drill_down_dimensions, 10);
        assert_eq!(config.catalog, CatalogConfig::default());
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = write_config(
            r#"{
                "metrics": { "support_offline": false, "timezone": "Europe/Paris" },
                "traverse": { "concurrency": 2, "query_timeout_secs": 30 }
            }"#,
        );
        let cli = CliConfig {
            config: Some(file.path().to_path_buf()),
            support_offline: Some(true),
            traverse_concurrency: Some(8),
            ..Default::default()
        };
        let config = load(&cli).unwrap();
        assert!(config.metrics.support_offline);
        assert_eq!(config.metrics.timezone, chrono_tz::Europe::Paris);
        assert_eq!(config.traverse.concurrency, 8);
        assert_eq!(config.traverse.query_timeout_secs, 30);

        let settings = config.metrics_settings();
        assert_eq!(settings.traverse.concurrency, 8);
        assert_eq!(
            settings.traverse.retry.attempt_timeout,
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_query_config_from_file() {
        let file = write_config(
            r#"{ "metrics": { "support_offline": true, "disabled_workspaces": ["1", "2"] } }"#,
        );
        let cli = CliConfig {
            config: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let query = load(&cli).unwrap().query_config();
        assert!(query.support_offline);
        assert!(query.disabled_workspaces.contains("2"));
    }

    #[test]
    fn test_catalog_override() {
        let file = write_config(
            r#"{
                "catalog": {
                    "platforms": { "prompt": { "metric_groups": ["model"] } },
                    "groups": { "model": { "metrics": ["model_total_count"] } },
                    "drill_down_objects": {}
                }
            }"#,
        );
        let cli = CliConfig {
            config: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let config = load(&cli).unwrap();
        assert_eq!(
            config.catalog.platforms.keys().collect::<Vec<_>>(),
            vec!["prompt"]
        );
        assert_eq!(config.catalog.groups["model"].metrics, vec!["model_total_count"]);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let file = write_config(r#"{ "metrics": { "timezone": "Mars/Olympus" } }"#);
        let cli = CliConfig {
            config: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let err = load(&cli).unwrap_err();
        assert!(err.to_string().contains("metrics.timezone"));

        let file = write_config(r#"{ "traverse": { "max_drill_down_dimensions": 40 } }"#);
        let cli = CliConfig {
            config: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        assert!(load(&cli).is_err());
    }

    #[test]
    fn test_missing_config_file() {
        let cli = CliConfig {
            config: Some(PathBuf::from("/nonexistent/loopmetrics.json")),
            ..Default::default()
        };
        let err = load(&cli).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }
}
