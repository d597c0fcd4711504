//! Source nodes and join predicates: the FROM/JOIN half of a report graph.
//!
//! Every vocabulary here is a closed enum. New join types or operators are
//! added as variants, never accepted as free text from the store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of relation a source node points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Table,
    View,
    MaterializedView,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Table => "table",
            SourceKind::View => "view",
            SourceKind::MaterializedView => "materialized_view",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "table" => Some(SourceKind::Table),
            "view" => Some(SourceKind::View),
            "materialized_view" => Some(SourceKind::MaterializedView),
            _ => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a source node within a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceRole {
    Base,
    Join,
}

impl SourceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceRole::Base => "base",
            SourceRole::Join => "join",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "base" => Some(SourceRole::Base),
            "join" => Some(SourceRole::Join),
            _ => None,
        }
    }
}

/// Join type vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "inner",
            JoinType::Left => "left",
            JoinType::Right => "right",
            JoinType::Full => "full",
            JoinType::Cross => "cross",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inner" => Some(JoinType::Inner),
            "left" => Some(JoinType::Left),
            "right" => Some(JoinType::Right),
            "full" => Some(JoinType::Full),
            "cross" => Some(JoinType::Cross),
            _ => None,
        }
    }
}

/// Operators allowed in join predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredicateOp {
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
}

impl PredicateOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredicateOp::Eq => "=",
            PredicateOp::Ne => "!=",
            PredicateOp::Gt => ">",
            PredicateOp::Gte => ">=",
            PredicateOp::Lt => "<",
            PredicateOp::Lte => "<=",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "=" => Some(PredicateOp::Eq),
            "!=" => Some(PredicateOp::Ne),
            ">" => Some(PredicateOp::Gt),
            ">=" => Some(PredicateOp::Gte),
            "<" => Some(PredicateOp::Lt),
            "<=" => Some(PredicateOp::Lte),
            _ => None,
        }
    }
}

/// A base or joined relation reference, identified by a per-report alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceNode {
    /// Unique per report, lowercase identifier.
    pub alias: String,
    pub schema: String,
    pub table: String,
    pub kind: SourceKind,
}

/// One ON-clause term of a join, ANDed with its siblings in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinPredicate {
    pub left_alias: String,
    pub left_column: String,
    pub op: PredicateOp,
    pub right_alias: String,
    pub right_column: String,
}

/// A joined source node with its attachment point and ON predicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinNode {
    pub source: SourceNode,
    pub join_type: JoinType,
    /// Alias of an earlier-declared node this join attaches to.
    pub attach_to: String,
    /// Emission priority; ties break by declaration order.
    pub priority: u32,
    /// Ordered ON predicates. Must be non-empty for every non-cross join.
    pub predicates: Vec<JoinPredicate>,
}
