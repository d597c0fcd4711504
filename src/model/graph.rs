//! The immutable dependency-graph snapshot the compiler consumes.
//!
//! A [`ReportGraph`] is a value, not a handle onto shared store rows: loading
//! produces a snapshot filtered to active rows, and swapping the active graph
//! is an atomic publish in the store. The snapshot carries a content version
//! (SHA-256 over its canonical JSON form) so callers can detect republishes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

use super::field::OutputField;
use super::filter::FilterBinding;
use super::report::ReportId;
use super::source::{JoinNode, JoinType, SourceNode};

/// Malformed stored metadata. Fatal and never partially recovered; callers
/// see only "report misconfigured" detail.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphIntegrityError {
    #[error("report {report_id} has no active base source")]
    NoBaseNode { report_id: ReportId },

    #[error("report {report_id} has {count} active base sources")]
    MultipleBaseNodes { report_id: ReportId, count: usize },

    #[error("source alias `{alias}` is declared more than once")]
    DuplicateAlias { alias: String },

    #[error("join `{alias}` targets alias `{target}` which is not declared earlier")]
    DanglingJoinTarget { alias: String, target: String },

    #[error("join `{alias}` has no active predicates")]
    PredicatelessJoin { alias: String },

    #[error("alias `{alias}` is referenced but not declared")]
    UnknownAlias { alias: String },

    #[error("stored value `{value}` is not in the `{vocabulary}` vocabulary")]
    UnknownVocabulary { vocabulary: String, value: String },
}

/// Sort direction vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }
}

/// One ORDER BY entry, referencing an output key rather than a raw column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub output_key: String,
    pub direction: SortDirection,
}

/// An in-memory immutable snapshot of a report's active dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportGraph {
    pub report_id: ReportId,
    pub base: SourceNode,
    /// Join nodes in declaration order.
    pub joins: Vec<JoinNode>,
    /// Output fields in declaration order.
    pub fields: Vec<OutputField>,
    pub filters: Vec<FilterBinding>,
    /// GROUP BY output keys, in order.
    pub grouping: Vec<String>,
    /// ORDER BY output keys, in order.
    pub sorting: Vec<SortKey>,
}

impl ReportGraph {
    /// Minimal graph over one base source.
    pub fn new(report_id: ReportId, base: SourceNode) -> Self {
        Self {
            report_id,
            base,
            joins: Vec::new(),
            fields: Vec::new(),
            filters: Vec::new(),
            grouping: Vec::new(),
            sorting: Vec::new(),
        }
    }

    /// Resolve an alias to its source node, base included.
    pub fn resolve_alias(&self, alias: &str) -> Option<&SourceNode> {
        if self.base.alias == alias {
            return Some(&self.base);
        }
        self.joins
            .iter()
            .map(|j| &j.source)
            .find(|s| s.alias == alias)
    }

    /// All source nodes in declaration order, base first.
    pub fn sources(&self) -> impl Iterator<Item = &SourceNode> {
        std::iter::once(&self.base).chain(self.joins.iter().map(|j| &j.source))
    }

    /// Look up an output field by its output key.
    pub fn field_by_key(&self, key: &str) -> Option<&OutputField> {
        self.fields.iter().find(|f| f.output_key == key)
    }

    /// Verify the join graph is a DAG rooted at the base.
    ///
    /// Join targets must resolve to an alias declared strictly earlier, which
    /// rules out self-joins, cycles and forward references in one pass. Every
    /// non-cross join must carry at least one predicate. Fails closed on the
    /// first offense.
    pub fn check_integrity(&self) -> Result<(), GraphIntegrityError> {
        let mut declared: HashSet<&str> = HashSet::new();
        declared.insert(self.base.alias.as_str());

        for join in &self.joins {
            let alias = join.source.alias.as_str();
            if declared.contains(alias) {
                return Err(GraphIntegrityError::DuplicateAlias {
                    alias: alias.to_string(),
                });
            }
            // Target must already be declared; checking before inserting the
            // join's own alias rules out self-targets as well.
            if !declared.contains(join.attach_to.as_str()) {
                return Err(GraphIntegrityError::DanglingJoinTarget {
                    alias: alias.to_string(),
                    target: join.attach_to.clone(),
                });
            }
            declared.insert(alias);
            if join.join_type != JoinType::Cross && join.predicates.is_empty() {
                return Err(GraphIntegrityError::PredicatelessJoin {
                    alias: alias.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Content version of this snapshot: SHA-256 over its canonical JSON form.
    ///
    /// Deterministic for equal graphs; changes whenever any row of the graph
    /// changes, giving callers a cheap republish check.
    pub fn content_version(&self) -> String {
        let json = serde_json::to_string(self).expect("graph serializes to JSON");
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
