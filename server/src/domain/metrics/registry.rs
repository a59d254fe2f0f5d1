//! Metric definition registry
//!
//! Built once from the resolved catalog: wrapper-capable definitions are
//! expanded into their derived metrics, every name is registered exactly once
//! and remembers the group it belongs to. The registry is read-only afterwards
//! and shared freely between queries and traversals.

use std::collections::HashMap;

use super::catalog::PlatformMetrics;
use super::definition::{MetricDefinition, MetricRef};
use super::error::MetricError;

#[derive(Debug)]
pub struct MetricRegistry {
    definitions: HashMap<String, MetricRef>,
    /// Metric name to the group owning it
    groups: HashMap<String, String>,
    catalog: PlatformMetrics,
}

impl MetricRegistry {
    /// Register every catalog metric and validate the result
    pub fn new(catalog: PlatformMetrics) -> Result<Self, MetricError> {
        let registry = Self::register(catalog)?;
        registry.check_metrics_valid()?;
        tracing::info!(count = registry.len(), "Metrics registered");
        Ok(registry)
    }

    /// Registry whose cross-references are not checked, for exercising the
    /// engine's own guards
    #[cfg(test)]
    pub(crate) fn unchecked(catalog: PlatformMetrics) -> Result<Self, MetricError> {
        Self::register(catalog)
    }

    fn register(mut catalog: PlatformMetrics) -> Result<Self, MetricError> {
        let mut definitions: HashMap<String, MetricRef> = HashMap::new();
        let mut groups: HashMap<String, String> = HashMap::new();

        for (group_name, group) in catalog.metric_groups.iter_mut() {
            let mut expanded = Vec::with_capacity(group.metric_definitions.len());
            for def in &group.metric_definitions {
                let wrappers = def.wrappers();
                if wrappers.is_empty() {
                    expanded.push(def.clone());
                } else {
                    expanded.extend(wrappers.iter().map(|w| w.wrap(def.clone())));
                }
            }

            for def in &expanded {
                let name = def.name();
                if name.trim().is_empty() {
                    return Err(MetricError::catalog("metric name is blank"));
                }
                if definitions.contains_key(name) {
                    return Err(MetricError::catalog(format!("duplicate metric name {name}")));
                }
                definitions.insert(name.to_string(), def.clone());
                groups.insert(name.to_string(), group_name.clone());
            }
            group.metric_definitions = expanded;
        }

        Ok(Self {
            definitions,
            groups,
            catalog,
        })
    }

    fn check_metrics_valid(&self) -> Result<(), MetricError> {
        // Sorted so the first reported problem is stable across runs
        let mut names: Vec<&String> = self.definitions.keys().collect();
        names.sort();
        for name in names {
            if let Some(def) = self.definitions.get(name) {
                self.check_metric_valid(def.as_ref())?;
            }
        }
        Ok(())
    }

    fn check_metric_valid(&self, def: &dyn MetricDefinition) -> Result<(), MetricError> {
        if def.is_const() {
            return Ok(());
        }

        if let Some(compound) = def.compound() {
            for sub in compound.metrics() {
                if sub.is_const() {
                    continue;
                }
                if sub.compound().is_some() {
                    return Err(MetricError::catalog(format!(
                        "nested compound metric {} is not allowed",
                        sub.name()
                    )));
                }
                if !self.definitions.contains_key(sub.name()) {
                    return Err(MetricError::catalog(format!(
                        "metric name {} not registered",
                        sub.name()
                    )));
                }
            }
            return Ok(());
        }

        for dimension in def.group_by() {
            let (field_name, field_type) = dimension
                .field
                .as_ref()
                .map(|f| (f.field_name.as_str(), Some(f.field_type)))
                .unwrap_or(("", None));
            let known = self.catalog.drill_down_objects.values().any(|object| {
                object.field_name == field_name && Some(object.field_type) == field_type
            });
            if !known {
                return Err(MetricError::catalog(format!(
                    "metric name {} group by field {field_name} not valid",
                    def.name()
                )));
            }
            if dimension.alias.is_empty() {
                return Err(MetricError::catalog(format!(
                    "metric name {} group by field {field_name} alias not valid",
                    def.name()
                )));
            }
        }

        if def.o_expression().aggr_type.is_none() {
            return Err(MetricError::catalog(format!(
                "metric name {} offline expression aggr type not valid",
                def.name()
            )));
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&MetricRef> {
        self.definitions.get(name)
    }

    /// Like [`get`](Self::get), but an unknown name is an invalid parameter
    pub fn definition(&self, name: &str) -> Result<&MetricRef, MetricError> {
        self.get(name)
            .ok_or_else(|| MetricError::invalid_param(format!("metric definition {name} not found")))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Group owning a registered metric
    pub fn group_of(&self, name: &str) -> Option<&str> {
        self.groups.get(name).map(String::as_str)
    }

    /// Drill-down object keys of the group owning `name`
    pub fn group_drill_down(&self, name: &str) -> &[String] {
        self.group_of(name)
            .and_then(|group| self.catalog.metric_groups.get(group))
            .map(|group| group.drill_down_objects.as_slice())
            .unwrap_or(&[])
    }

    /// Catalog with wrapper metrics expanded
    pub fn catalog(&self) -> &PlatformMetrics {
        &self.catalog
    }

    /// Ordered group-by aliases of a metric
    pub fn group_by_aliases(&self, name: &str) -> Result<Vec<String>, MetricError> {
        let def = self
            .get(name)
            .ok_or_else(|| MetricError::invalid_param(format!("metric definition {name} not found")))?;
        def.group_by()
            .into_iter()
            .map(|dimension| {
                if dimension.alias.is_empty() {
                    Err(MetricError::internal(format!(
                        "{name} groupby dimension has no alias"
                    )))
                } else {
                    Ok(dimension.alias)
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::data::types::{
        AggrType, Dimension, Expression, FieldType, FilterField, MetricType, OExpression,
    };
    use crate::domain::metrics::catalog::{MetricGroup, PlatformMetricDef};
    use crate::domain::metrics::definition::{CompoundMetricDef, SpanMetric, SpanScope};
    use crate::domain::metrics::library::{
        self, MODEL_DURATION, MODEL_TOTAL_COUNT_PIE, MODEL_TPM, TOOL_DURATION,
    };
    use crate::domain::metrics::wrappers::latency_wrappers;

    fn metric(name: &str) -> SpanMetric {
        SpanMetric::new(
            name,
            MetricType::Summary,
            SpanScope::All,
            OExpression::new(AggrType::Sum),
            |_| Expression::new("count()"),
        )
    }

    fn catalog(groups: Vec<(&str, Vec<MetricRef>)>) -> PlatformMetrics {
        let mut catalog = PlatformMetrics {
            drill_down_objects: BTreeMap::from([(
                "model_name".to_string(),
                FilterField::new("model_name", FieldType::String),
            )]),
            ..Default::default()
        };
        let names: Vec<String> = groups.iter().map(|(g, _)| g.to_string()).collect();
        for (group, defs) in groups {
            catalog.metric_groups.insert(
                group.to_string(),
                MetricGroup {
                    metric_definitions: defs,
                    drill_down_objects: vec!["model_name".into()],
                },
            );
        }
        catalog.platform_metric_defs.insert(
            "loop".into(),
            PlatformMetricDef {
                metric_groups: names,
                drill_down_objects: Vec::new(),
            },
        );
        catalog
    }

    #[test]
    fn test_builtin_registry_builds() {
        let registry = MetricRegistry::new(PlatformMetrics::builtin().unwrap()).unwrap();
        assert!(!registry.is_empty());
        assert!(registry.contains(MODEL_TPM));
        // wrapped metrics replace their base
        assert!(!registry.contains(MODEL_DURATION));
        assert!(registry.contains("model_duration_pct99"));
        assert!(registry.contains(&format!("{TOOL_DURATION}_avg")));
        assert_eq!(registry.group_of("model_duration_avg"), Some(library::GROUP_MODEL));
        assert_eq!(
            registry.group_drill_down(MODEL_TOTAL_COUNT_PIE),
            &["model_name".to_string()]
        );
        assert_eq!(
            registry.group_by_aliases(MODEL_TOTAL_COUNT_PIE).unwrap(),
            vec!["model_name"]
        );
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let err = MetricRegistry::new(catalog(vec![
            ("a", vec![metric("m1").into_ref()]),
            ("b", vec![metric("m1").into_ref()]),
        ]))
        .unwrap_err();
        assert_eq!(err.to_string(), "invalid metric catalog: duplicate metric name m1");
    }

    #[test]
    fn test_duplicate_after_wrapper_expansion_rejected() {
        let wrapped = metric("lat").with_wrappers(latency_wrappers()).into_ref();
        let err = MetricRegistry::new(catalog(vec![(
            "a",
            vec![wrapped, metric("lat_avg").into_ref()],
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("duplicate metric name lat_avg"));
    }

    #[test]
    fn test_blank_name_rejected() {
        let err = MetricRegistry::new(catalog(vec![("a", vec![metric("").into_ref()])])).unwrap_err();
        assert!(err.to_string().contains("metric name is blank"));
    }

    #[test]
    fn test_invalid_group_by_rejected() {
        let def = metric("by_region")
            .with_group_by(Dimension::group_by(
                FilterField::new("region", FieldType::String),
                "region",
            ))
            .into_ref();
        let err = MetricRegistry::new(catalog(vec![("a", vec![def])])).unwrap_err();
        assert!(err.to_string().contains("group by field region not valid"));

        // right name, wrong type
        let def = metric("by_model")
            .with_group_by(Dimension::group_by(
                FilterField::new("model_name", FieldType::Long),
                "model_name",
            ))
            .into_ref();
        assert!(MetricRegistry::new(catalog(vec![("a", vec![def])])).is_err());

        let def = metric("no_alias")
            .with_group_by(Dimension::group_by(
                FilterField::new("model_name", FieldType::String),
                "",
            ))
            .into_ref();
        let err = MetricRegistry::new(catalog(vec![("a", vec![def])])).unwrap_err();
        assert!(err.to_string().contains("alias not valid"));
    }

    #[test]
    fn test_missing_aggr_type_rejected() {
        let def = SpanMetric::new(
            "raw",
            MetricType::Summary,
            SpanScope::All,
            OExpression::default(),
            |_| Expression::new("count()"),
        )
        .into_ref();
        let err = MetricRegistry::new(catalog(vec![("a", vec![def])])).unwrap_err();
        assert!(err.to_string().contains("offline expression aggr type not valid"));
    }

    #[test]
    fn test_compound_sub_metrics_checked() {
        let num = metric("num").into_ref();
        let den = metric("den").into_ref();
        let ratio = CompoundMetricDef::divide("ratio", MetricType::Summary, num.clone(), den.clone())
            .into_ref();

        // den is not registered anywhere
        let err = MetricRegistry::new(catalog(vec![("a", vec![num.clone(), ratio.clone()])]))
            .unwrap_err();
        assert!(err.to_string().contains("metric name den not registered"));

        let nested = CompoundMetricDef::divide("nested", MetricType::Summary, ratio.clone(), den.clone())
            .into_ref();
        let err = MetricRegistry::new(catalog(vec![("a", vec![num, den, ratio, nested])]))
            .unwrap_err();
        assert!(err.to_string().contains("nested compound metric ratio is not allowed"));
    }

    #[test]
    fn test_unknown_definition_is_invalid_param() {
        let registry = MetricRegistry::new(catalog(vec![("a", vec![metric("m").into_ref()])])).unwrap();
        assert!(matches!(
            registry.definition("missing"),
            Err(MetricError::InvalidParam(_))
        ));
        assert!(registry.group_by_aliases("missing").is_err());
        assert!(registry.group_by_aliases("m").unwrap().is_empty());
    }
}
