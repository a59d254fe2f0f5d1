//! Span filter tree
//!
//! The filter model shared by the query path and the repositories. A
//! `FilterFields` node combines its children with one `QueryAndOr`; each
//! `FilterField` is either a leaf condition or carries a nested `sub_filter`.

use serde::{Deserialize, Serialize};

// ============================================================================
// Well-known span fields
// ============================================================================

pub const SPAN_FIELD_SPACE_ID: &str = "space_id";
pub const SPAN_FIELD_SPAN_TYPE: &str = "span_type";
pub const SPAN_FIELD_STATUS: &str = "status";
pub const SPAN_FIELD_STATUS_CODE: &str = "status_code";
pub const SPAN_FIELD_DURATION: &str = "duration";
pub const SPAN_FIELD_LATENCY_FIRST_RESP: &str = "latency_first_resp";
pub const SPAN_FIELD_START_TIME_FIRST_RESP: &str = "start_time_first_resp";
pub const SPAN_FIELD_START_TIME_FIRST_TOKEN_RESP: &str = "start_time_first_token_resp";
pub const SPAN_FIELD_LATENCY_FIRST_TOKEN_RESP: &str = "latency_first_token_resp";
pub const SPAN_FIELD_REASONING_DURATION: &str = "reasoning_duration";
pub const SPAN_FIELD_INPUT_TOKENS: &str = "input_tokens";
pub const SPAN_FIELD_OUTPUT_TOKENS: &str = "output_tokens";
pub const SPAN_FIELD_MODEL_NAME: &str = "model_name";
pub const SPAN_FIELD_TOOL_NAME: &str = "tool_name";
pub const SPAN_FIELD_USER_ID: &str = "user_id";
pub const SPAN_FIELD_MESSAGE_ID: &str = "message_id";

/// Offline store columns
pub const OFFLINE_FIELD_PLATFORM_TYPE: &str = "platform_type";
pub const OFFLINE_FIELD_METRIC_NAME: &str = "metric_name";

/// Span status values accepted by the `status` pseudo field
pub const SPAN_STATUS_SUCCESS: &str = "success";
pub const SPAN_STATUS_ERROR: &str = "error";

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    String,
    Long,
    Double,
    Bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Match,
    NotMatch,
    Exist,
    NotExist,
    AlwaysTrue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryAndOr {
    And,
    Or,
}

// ============================================================================
// Filter tree
// ============================================================================

/// Atomic (or composite, via `sub_filter`) unit of the filter tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterField {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub field_name: String,
    #[serde(default)]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_type: Option<QueryType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_and_or: Option<QueryAndOr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_filter: Option<FilterFields>,
}

/// A list of filter fields combined with a single conjunction
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_and_or: Option<QueryAndOr>,
    #[serde(default)]
    pub filter_fields: Vec<FilterField>,
}

impl FilterField {
    /// Field reference without a condition (used for group-by and drill-down)
    pub fn new(field_name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            field_name: field_name.into(),
            field_type,
            ..Default::default()
        }
    }

    /// Leaf condition `field <op> values`
    pub fn condition(
        field_name: impl Into<String>,
        field_type: FieldType,
        query_type: QueryType,
        values: Vec<String>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            field_type,
            values,
            query_type: Some(query_type),
            ..Default::default()
        }
    }

    /// Shorthand for a string equality condition
    pub fn eq_string(field_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::condition(
            field_name,
            FieldType::String,
            QueryType::Eq,
            vec![value.into()],
        )
    }

    /// Composite node wrapping a nested filter under AND
    pub fn subtree(sub_filter: Option<FilterFields>) -> Self {
        Self {
            query_and_or: Some(QueryAndOr::And),
            sub_filter,
            ..Default::default()
        }
    }
}

impl FilterFields {
    pub fn and(filter_fields: Vec<FilterField>) -> Self {
        Self {
            query_and_or: Some(QueryAndOr::And),
            filter_fields,
        }
    }

    /// Visit every field in the tree depth-first, descending into sub filters.
    ///
    /// The visitor may mutate fields; the first error aborts the walk.
    pub fn traverse_mut<E, F>(&mut self, visit: &mut F) -> Result<(), E>
    where
        F: FnMut(&mut FilterField) -> Result<(), E>,
    {
        for field in &mut self.filter_fields {
            visit(field)?;
            if let Some(sub) = field.sub_filter.as_mut() {
                sub.traverse_mut(visit)?;
            }
        }
        Ok(())
    }

    /// Read-only walk over every field in the tree
    pub fn for_each(&self, visit: &mut impl FnMut(&FilterField)) {
        for field in &self.filter_fields {
            visit(field);
            if let Some(sub) = field.sub_filter.as_ref() {
                sub.for_each(visit);
            }
        }
    }

    /// Names of every leaf field referenced anywhere in the tree
    pub fn field_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.for_each(&mut |f| {
            if !f.field_name.is_empty() {
                names.push(f.field_name.clone());
            }
        });
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested() -> FilterFields {
        FilterFields::and(vec![
            FilterField::eq_string("a", "1"),
            FilterField::subtree(Some(FilterFields::and(vec![
                FilterField::eq_string("b", "2"),
                FilterField::subtree(Some(FilterFields::and(vec![FilterField::eq_string(
                    "c", "3",
                )]))),
            ]))),
        ])
    }

    #[test]
    fn test_field_names_descends_into_sub_filters() {
        assert_eq!(nested().field_names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_traverse_mut_rewrites_fields() {
        let mut filter = nested();
        filter
            .traverse_mut(&mut |f: &mut FilterField| {
                if f.field_name == "c" {
                    f.values = vec!["30".to_string()];
                }
                Ok::<(), String>(())
            })
            .unwrap();

        let mut found = None;
        filter.for_each(&mut |f| {
            if f.field_name == "c" {
                found = Some(f.values.clone());
            }
        });
        assert_eq!(found, Some(vec!["30".to_string()]));
    }

    #[test]
    fn test_traverse_mut_stops_on_error() {
        let mut filter = nested();
        let mut visited = 0;
        let result = filter.traverse_mut(&mut |f: &mut FilterField| {
            visited += 1;
            if f.field_name == "b" {
                return Err("stop");
            }
            Ok(())
        });
        assert_eq!(result, Err("stop"));
        assert_eq!(visited, 3);
    }

    #[test]
    fn test_filter_serde_snake_case() {
        let json = r#"{
            "query_and_or": "and",
            "filter_fields": [
                { "field_name": "status", "field_type": "string", "values": ["error"], "query_type": "in" }
            ]
        }"#;
        let filter: FilterFields = serde_json::from_str(json).unwrap();
        assert_eq!(filter.query_and_or, Some(QueryAndOr::And));
        assert_eq!(filter.filter_fields[0].query_type, Some(QueryType::In));
        assert_eq!(filter.filter_fields[0].field_type, FieldType::String);
    }
}
