//! Filter bindings: mapping external filter codes onto column predicates.
//!
//! Filter values arrive from the request layer as strings keyed by a stable
//! filter code. A binding's transform normalizes the raw string before it is
//! bound; the value itself never reaches query text.

use serde::{Deserialize, Serialize};

/// Operators allowed in filter predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "ilike")]
    Ilike,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::In => "in",
            FilterOp::Ilike => "ilike",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "=" => Some(FilterOp::Eq),
            "!=" => Some(FilterOp::Ne),
            ">" => Some(FilterOp::Gt),
            ">=" => Some(FilterOp::Gte),
            "<" => Some(FilterOp::Lt),
            "<=" => Some(FilterOp::Lte),
            "in" => Some(FilterOp::In),
            "ilike" => Some(FilterOp::Ilike),
            _ => None,
        }
    }
}

/// Normalization applied to a caller-supplied value before binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueTransform {
    Identity,
    CsvToArray,
    Lowercase,
    Trim,
}

impl ValueTransform {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueTransform::Identity => "identity",
            ValueTransform::CsvToArray => "csv_to_array",
            ValueTransform::Lowercase => "lowercase",
            ValueTransform::Trim => "trim",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "identity" => Some(ValueTransform::Identity),
            "csv_to_array" => Some(ValueTransform::CsvToArray),
            "lowercase" => Some(ValueTransform::Lowercase),
            "trim" => Some(ValueTransform::Trim),
            _ => None,
        }
    }

    /// Apply this transform to a raw wire value.
    pub fn apply(&self, raw: &str) -> ParamValue {
        match self {
            ValueTransform::Identity => ParamValue::Text(raw.to_string()),
            ValueTransform::CsvToArray => ParamValue::List(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            ValueTransform::Lowercase => ParamValue::Text(raw.to_lowercase()),
            ValueTransform::Trim => ParamValue::Text(raw.trim().to_string()),
        }
    }
}

/// A bound query parameter: scalar text or an array for `in` predicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Text(String),
    List(Vec<String>),
}

impl ParamValue {
    /// Coerce to an array value, wrapping a scalar as a single element.
    pub fn into_list(self) -> Vec<String> {
        match self {
            ParamValue::Text(s) => vec![s],
            ParamValue::List(v) => v,
        }
    }
}

/// A mapping from an external filter code to a concrete column predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterBinding {
    /// Stable code owned by the external filter catalog. Several bindings may
    /// share one code when a logical filter applies to multiple tables.
    pub filter_code: String,
    pub source_alias: String,
    pub source_column: String,
    pub op: FilterOp,
    pub transform: ValueTransform,
    /// Emission ordering among bound predicates.
    pub predicate_order: u32,
}
