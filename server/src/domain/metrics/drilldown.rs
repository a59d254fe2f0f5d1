//! Drill-down combinations and drill-down value trees

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::catalog::{MetricGroup, PlatformMetricDef, PlatformMetrics};
use super::definition::MetricDefinition;
use super::error::MetricError;
use super::library::{MODEL_TOTAL_COUNT_PIE, TOOL_TOTAL_COUNT_PIE};
use super::types::{DEFAULT_GROUP_KEY, DrillDownValue};
use crate::data::types::{AggrType, FieldType, FilterField, SPAN_FIELD_SPACE_ID};
use crate::utils::json::decode_string_map;

/// Upper bound on the number of drill-down values returned at the root
pub const MAX_DRILL_DOWN_VALUES: usize = 1000;

/// Default bound on dimensions expanded into a power set
pub const DEFAULT_MAX_DRILL_DOWN_DIMENSIONS: usize = 10;

fn space_id_field() -> FilterField {
    FilterField::new(SPAN_FIELD_SPACE_ID, FieldType::String)
}

/// Group-by combinations to traverse for one metric.
///
/// AVG metrics cannot be re-aggregated from drilled rows, so every subset of
/// the platform and group drill-down objects is traversed. Other metrics are
/// traversed once, drilled by all of them plus the metric's own group-by
/// fields. Every combination is also grouped by workspace.
pub fn build_drill_down_fields(
    catalog: &PlatformMetrics,
    platform: &PlatformMetricDef,
    group: &MetricGroup,
    def: &dyn MetricDefinition,
    max_dimensions: usize,
) -> Result<Vec<Vec<FilterField>>, MetricError> {
    let mut fields = catalog.drill_down_fields(&platform.drill_down_objects);
    fields.extend(catalog.drill_down_fields(&group.drill_down_objects));

    let mut combinations = if def.o_expression().aggr_type == Some(AggrType::Avg) {
        if fields.len() > max_dimensions {
            return Err(MetricError::invalid_param(format!(
                "metric {} has {} drill down dimensions, at most {max_dimensions} allowed",
                def.name(),
                fields.len()
            )));
        }
        power_set(&fields)
    } else {
        for dimension in def.group_by() {
            if let Some(field) = dimension.field
                && !fields.iter().any(|f| f.field_name == field.field_name)
            {
                fields.push(field);
            }
        }
        vec![fields]
    };

    for combination in &mut combinations {
        combination.push(space_id_field());
    }
    Ok(combinations)
}

/// Every subset of `fields`, the empty one first. Subsets keep field order.
pub fn power_set(fields: &[FilterField]) -> Vec<Vec<FilterField>> {
    (0..1usize << fields.len())
        .map(|mask| {
            fields
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, f)| f.clone())
                .collect()
        })
        .collect()
}

// ============================================================================
// Drill-down values
// ============================================================================

/// Dimension whose observed values are listed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrillDownValueType {
    ModelName,
    ToolName,
}

impl DrillDownValueType {
    /// Pie metric grouped by this dimension
    pub fn metric_name(&self) -> &'static str {
        match self {
            Self::ModelName => MODEL_TOTAL_COUNT_PIE,
            Self::ToolName => TOOL_TOTAL_COUNT_PIE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelName => "model_name",
            Self::ToolName => "tool_name",
        }
    }
}

impl fmt::Display for DrillDownValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DrillDownValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "model_name" => Ok(Self::ModelName),
            "tool_name" => Ok(Self::ToolName),
            _ => Err(format!("invalid drill down value type: {s}")),
        }
    }
}

#[derive(Default)]
struct Node {
    total: f64,
    children: BTreeMap<String, Node>,
}

/// Build the value tree of a pie result.
///
/// Each pie key is decoded and walked in `keys` order; every node sums the
/// values below it. Keys that do not decode (the ungrouped `"all"` row among
/// them) land under the empty value. Siblings are sorted by total descending,
/// then value.
pub fn build_drill_down_tree(pie: &BTreeMap<String, String>, keys: &[String]) -> Vec<DrillDownValue> {
    let mut roots: BTreeMap<String, Node> = BTreeMap::new();
    for (group, value) in pie {
        let amount = value.parse::<f64>().unwrap_or(0.0);
        let decoded = if group == DEFAULT_GROUP_KEY {
            BTreeMap::new()
        } else {
            decode_string_map(group).unwrap_or_else(|e| {
                tracing::debug!(group = %group, error = %e, "Undecodable drill-down group key");
                BTreeMap::new()
            })
        };
        let mut level = &mut roots;
        for key in keys {
            let node = level
                .entry(decoded.get(key).cloned().unwrap_or_default())
                .or_default();
            node.total += amount;
            level = &mut node.children;
        }
    }
    let mut values = sorted_values(roots);
    values.truncate(MAX_DRILL_DOWN_VALUES);
    values
}

fn sorted_values(nodes: BTreeMap<String, Node>) -> Vec<DrillDownValue> {
    let mut values: Vec<DrillDownValue> = nodes
        .into_iter()
        .map(|(value, node)| DrillDownValue {
            value,
            total: node.total,
            children: sorted_values(node.children),
        })
        .collect();
    values.sort_by(|a, b| b.total.total_cmp(&a.total).then_with(|| a.value.cmp(&b.value)));
    values
}
