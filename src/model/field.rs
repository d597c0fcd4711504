//! Output fields: the SELECT half of a report graph.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared output data type, carried alongside each output key so the
/// masking post-processor and response shaping never guess at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Text,
    Number,
    Percent,
    Date,
    Boolean,
    Json,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Text => "text",
            DataType::Number => "number",
            DataType::Percent => "percent",
            DataType::Date => "date",
            DataType::Boolean => "boolean",
            DataType::Json => "json",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(DataType::Text),
            "number" => Some(DataType::Number),
            "percent" => Some(DataType::Percent),
            "date" => Some(DataType::Date),
            "boolean" => Some(DataType::Boolean),
            "json" => Some(DataType::Json),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expression kind of an output field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprKind {
    Column,
    Aggregate,
}

impl ExprKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExprKind::Column => "column",
            ExprKind::Aggregate => "aggregate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "column" => Some(ExprKind::Column),
            "aggregate" => Some(ExprKind::Aggregate),
            _ => None,
        }
    }
}

/// Aggregate function vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFn::Count => "count",
            AggregateFn::Sum => "sum",
            AggregateFn::Avg => "avg",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "count" => Some(AggregateFn::Count),
            "sum" => Some(AggregateFn::Sum),
            "avg" => Some(AggregateFn::Avg),
            "min" => Some(AggregateFn::Min),
            "max" => Some(AggregateFn::Max),
            _ => None,
        }
    }
}

/// A selected column or aggregate, exposed under a stable output key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputField {
    /// Alias of the source node the column comes from.
    pub source_alias: String,
    pub source_column: String,
    /// Unique per report; becomes the row key in results.
    pub output_key: String,
    pub label: String,
    pub data_type: DataType,
    pub expr_kind: ExprKind,
    /// Set iff `expr_kind` is `Aggregate`.
    pub aggregate_fn: Option<AggregateFn>,
    /// Display ordering; ties break by declaration order.
    pub output_order: u32,
    pub sortable: bool,
    pub filterable: bool,
}

impl OutputField {
    /// Plain column field with display defaults.
    pub fn column(alias: &str, column: &str, key: &str, data_type: DataType) -> Self {
        Self {
            source_alias: alias.to_string(),
            source_column: column.to_string(),
            output_key: key.to_string(),
            label: key.to_string(),
            data_type,
            expr_kind: ExprKind::Column,
            aggregate_fn: None,
            output_order: 0,
            sortable: true,
            filterable: true,
        }
    }

    /// Aggregate field with display defaults.
    pub fn aggregate(
        alias: &str,
        column: &str,
        key: &str,
        func: AggregateFn,
        data_type: DataType,
    ) -> Self {
        Self {
            source_alias: alias.to_string(),
            source_column: column.to_string(),
            output_key: key.to_string(),
            label: key.to_string(),
            data_type,
            expr_kind: ExprKind::Aggregate,
            aggregate_fn: Some(func),
            output_order: 0,
            sortable: true,
            filterable: false,
        }
    }

    pub fn with_order(mut self, order: u32) -> Self {
        self.output_order = order;
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }
}
