//! Platform metric catalog
//!
//! The catalog says which metric groups every platform exposes and which
//! drill-down objects apply at platform and group level. It is described by a
//! serde [`CatalogConfig`] (overridable from the config file) and resolved
//! against the metric library into [`PlatformMetrics`] once at startup.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::definition::MetricRef;
use super::error::MetricError;
use super::library::{self, GROUP_AGENT, GROUP_GENERAL, GROUP_MODEL, GROUP_SERVICE, GROUP_TOOL};
use super::types::PlatformType;
use crate::data::types::{
    FieldType, FilterField, SPAN_FIELD_MODEL_NAME, SPAN_FIELD_STATUS_CODE, SPAN_FIELD_TOOL_NAME,
};

/// Platform served by the default catalog
pub const DEFAULT_PLATFORM: &str = "loop";

pub const DRILL_DOWN_MODEL_NAME: &str = "model_name";
pub const DRILL_DOWN_TOOL_NAME: &str = "tool_name";
pub const DRILL_DOWN_STATUS_CODE: &str = "status_code";

// ============================================================================
// Config shape
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Group names, in display order
    pub metric_groups: Vec<String>,
    /// Drill-down object keys applied to every group of the platform
    pub drill_down_objects: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricGroupConfig {
    /// Library metric names (wrapped metrics are listed by their base name)
    pub metrics: Vec<String>,
    pub drill_down_objects: Vec<String>,
}

/// Catalog override. Omitted sections start empty: an override replaces the
/// built-in catalog rather than merging with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub platforms: BTreeMap<PlatformType, PlatformConfig>,
    #[serde(default)]
    pub groups: BTreeMap<String, MetricGroupConfig>,
    /// Drill-down object registry, key to span field
    #[serde(default)]
    pub drill_down_objects: BTreeMap<String, FilterField>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        let groups: BTreeMap<String, MetricGroupConfig> = library::builtin_groups()
            .into_iter()
            .map(|(group, metrics)| {
                let drill_down_objects = match group {
                    GROUP_MODEL => vec![DRILL_DOWN_MODEL_NAME.to_string()],
                    GROUP_TOOL => vec![DRILL_DOWN_TOOL_NAME.to_string()],
                    _ => Vec::new(),
                };
                let config = MetricGroupConfig {
                    metrics: metrics.iter().map(|m| m.name().to_string()).collect(),
                    drill_down_objects,
                };
                (group.to_string(), config)
            })
            .collect();

        let platform = PlatformConfig {
            metric_groups: [
                GROUP_GENERAL,
                GROUP_MODEL,
                GROUP_TOOL,
                GROUP_SERVICE,
                GROUP_AGENT,
            ]
            .iter()
            .map(|g| g.to_string())
            .collect(),
            drill_down_objects: Vec::new(),
        };

        let drill_down_objects = BTreeMap::from([
            (
                DRILL_DOWN_MODEL_NAME.to_string(),
                FilterField::new(SPAN_FIELD_MODEL_NAME, FieldType::String),
            ),
            (
                DRILL_DOWN_TOOL_NAME.to_string(),
                FilterField::new(SPAN_FIELD_TOOL_NAME, FieldType::String),
            ),
            (
                DRILL_DOWN_STATUS_CODE.to_string(),
                FilterField::new(SPAN_FIELD_STATUS_CODE, FieldType::Long),
            ),
        ]);

        Self {
            platforms: BTreeMap::from([(DEFAULT_PLATFORM.to_string(), platform)]),
            groups,
            drill_down_objects,
        }
    }
}

// ============================================================================
// Resolved catalog
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformMetricDef {
    pub metric_groups: Vec<String>,
    pub drill_down_objects: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MetricGroup {
    pub metric_definitions: Vec<MetricRef>,
    pub drill_down_objects: Vec<String>,
}

/// Catalog with metric names resolved to definitions
#[derive(Debug, Clone, Default)]
pub struct PlatformMetrics {
    pub platform_metric_defs: BTreeMap<PlatformType, PlatformMetricDef>,
    pub metric_groups: BTreeMap<String, MetricGroup>,
    pub drill_down_objects: BTreeMap<String, FilterField>,
}

impl PlatformMetrics {
    /// Resolve `config` against `library`. Every referenced group, metric and
    /// drill-down key must exist.
    pub fn from_config(config: &CatalogConfig, library: &[MetricRef]) -> Result<Self, MetricError> {
        let find = |name: &str| library.iter().find(|def| def.name() == name).cloned();

        let check_keys = |owner: &str, keys: &[String]| -> Result<(), MetricError> {
            match keys
                .iter()
                .find(|key| !config.drill_down_objects.contains_key(*key))
            {
                Some(key) => Err(MetricError::catalog(format!(
                    "{owner} references unknown drill-down object {key}"
                ))),
                None => Ok(()),
            }
        };

        let mut metric_groups = BTreeMap::new();
        for (group_name, group) in &config.groups {
            check_keys(group_name, &group.drill_down_objects)?;
            let metric_definitions = group
                .metrics
                .iter()
                .map(|name| {
                    find(name).ok_or_else(|| {
                        MetricError::catalog(format!("group {group_name} references unknown metric {name}"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            metric_groups.insert(
                group_name.clone(),
                MetricGroup {
                    metric_definitions,
                    drill_down_objects: group.drill_down_objects.clone(),
                },
            );
        }

        let mut platform_metric_defs = BTreeMap::new();
        for (platform, platform_config) in &config.platforms {
            check_keys(platform, &platform_config.drill_down_objects)?;
            if let Some(group) = platform_config
                .metric_groups
                .iter()
                .find(|g| !metric_groups.contains_key(*g))
            {
                return Err(MetricError::catalog(format!(
                    "platform {platform} references unknown group {group}"
                )));
            }
            platform_metric_defs.insert(
                platform.clone(),
                PlatformMetricDef {
                    metric_groups: platform_config.metric_groups.clone(),
                    drill_down_objects: platform_config.drill_down_objects.clone(),
                },
            );
        }

        Ok(Self {
            platform_metric_defs,
            metric_groups,
            drill_down_objects: config.drill_down_objects.clone(),
        })
    }

    /// Default catalog over the built-in library
    pub fn builtin() -> Result<Self, MetricError> {
        Self::from_config(&CatalogConfig::default(), &library::builtin_metrics())
    }

    /// Drill-down fields for `keys`, skipping keys missing from the registry
    pub fn drill_down_fields(&self, keys: &[String]) -> Vec<FilterField> {
        keys.iter()
            .filter_map(|key| self.drill_down_objects.get(key).cloned())
            .collect()
    }

    pub fn platforms(&self) -> Vec<PlatformType> {
        self.platform_metric_defs.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::library::{GENERAL_TOTAL_COUNT, MODEL_TOTAL_COUNT_PIE};

    #[test]
    fn test_default_catalog_resolves() {
        let catalog = PlatformMetrics::builtin().unwrap();
        assert_eq!(catalog.platforms(), vec![DEFAULT_PLATFORM.to_string()]);
        let platform = &catalog.platform_metric_defs[DEFAULT_PLATFORM];
        assert_eq!(platform.metric_groups.len(), 5);

        let general = &catalog.metric_groups[GROUP_GENERAL];
        assert!(
            general
                .metric_definitions
                .iter()
                .any(|d| d.name() == GENERAL_TOTAL_COUNT)
        );
        let model = &catalog.metric_groups[GROUP_MODEL];
        assert_eq!(model.drill_down_objects, vec![DRILL_DOWN_MODEL_NAME]);
        assert!(
            model
                .metric_definitions
                .iter()
                .any(|d| d.name() == MODEL_TOTAL_COUNT_PIE)
        );
    }

    #[test]
    fn test_unknown_metric_rejected() {
        let mut config = CatalogConfig::default();
        config
            .groups
            .get_mut(GROUP_GENERAL)
            .unwrap()
            .metrics
            .push("no_such_metric".into());
        let err = PlatformMetrics::from_config(&config, &library::builtin_metrics()).unwrap_err();
        assert!(err.to_string().contains("unknown metric no_such_metric"));
    }

    #[test]
    fn test_unknown_group_and_drill_down_rejected() {
        let mut config = CatalogConfig::default();
        config
            .platforms
            .get_mut(DEFAULT_PLATFORM)
            .unwrap()
            .metric_groups
            .push("missing".into());
        let err = PlatformMetrics::from_config(&config, &library::builtin_metrics()).unwrap_err();
        assert!(err.to_string().contains("unknown group missing"));

        let mut config = CatalogConfig::default();
        config
            .groups
            .get_mut(GROUP_TOOL)
            .unwrap()
            .drill_down_objects
            .push("region".into());
        let err = PlatformMetrics::from_config(&config, &library::builtin_metrics()).unwrap_err();
        assert!(err.to_string().contains("unknown drill-down object region"));
    }

    #[test]
    fn test_catalog_config_deserializes_partial_json() {
        let config: CatalogConfig = serde_json::from_str(
            r#"{
                "platforms": { "loop": { "metric_groups": ["model"] } },
                "groups": { "model": { "metrics": ["model_token_count"] } }
            }"#,
        )
        .unwrap();
        assert!(config.drill_down_objects.is_empty());
        let catalog = PlatformMetrics::from_config(&config, &library::builtin_metrics()).unwrap();
        assert_eq!(catalog.metric_groups["model"].metric_definitions.len(), 1);
    }

    #[test]
    fn test_catalog_config_platforms_only_drops_builtin_groups() {
        let config: CatalogConfig =
            serde_json::from_str(r#"{ "platforms": { "prompt": { "metric_groups": [] } } }"#)
                .unwrap();
        assert!(config.groups.is_empty());
        assert!(config.drill_down_objects.is_empty());

        let catalog = PlatformMetrics::from_config(&config, &library::builtin_metrics()).unwrap();
        assert!(catalog.metric_groups.is_empty());
        assert_eq!(catalog.platforms(), vec!["prompt".to_string()]);
    }
}
