//! Lineage index over the active report graphs.
//!
//! A bipartite graph between reports and warehouse relations, rebuilt from
//! the store's active dependency rows. Answers the two operational questions:
//! which relations does a report read, and which reports break if a relation
//! changes.

use std::collections::BTreeMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;

use crate::model::{ReportId, SourceKind};
use crate::store::{MetadataStore, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRef {
    pub report_id: ReportId,
    pub route: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct RelationRef {
    pub schema: String,
    pub table: String,
}

/// What a report-to-relation edge carries: the alias the report reads the
/// relation under, and the declared source kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dependency {
    pub alias: String,
    pub kind: SourceKind,
}

#[derive(Debug, Clone)]
enum LineageNode {
    Report(ReportRef),
    Relation(RelationRef),
}

/// One relation a report reads, as reported by [`LineageIndex::tables_used_by`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsedRelation {
    pub schema: String,
    pub table: String,
    pub alias: String,
    pub kind: SourceKind,
}

/// Bipartite dependency index, edges pointing report -> relation.
pub struct LineageIndex {
    graph: DiGraph<LineageNode, Dependency>,
    reports: BTreeMap<ReportId, NodeIndex>,
    relations: BTreeMap<RelationRef, NodeIndex>,
}

impl LineageIndex {
    /// Build the index from the store's active dependency rows.
    pub fn build(store: &MetadataStore) -> Result<Self, StoreError> {
        let mut index = Self {
            graph: DiGraph::new(),
            reports: BTreeMap::new(),
            relations: BTreeMap::new(),
        };

        for row in store.active_dependencies()? {
            let report_ix = *index.reports.entry(row.report_id.clone()).or_insert_with(|| {
                index.graph.add_node(LineageNode::Report(ReportRef {
                    report_id: row.report_id.clone(),
                    route: row.route.clone(),
                    title: row.title.clone(),
                }))
            });
            let relation = RelationRef {
                schema: row.schema.clone(),
                table: row.table.clone(),
            };
            let relation_ix = *index.relations.entry(relation.clone()).or_insert_with(|| {
                index.graph.add_node(LineageNode::Relation(relation))
            });
            index.graph.add_edge(
                report_ix,
                relation_ix,
                Dependency {
                    alias: row.alias,
                    kind: row.kind,
                },
            );
        }
        Ok(index)
    }

    pub fn report_count(&self) -> usize {
        self.reports.len()
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    /// Relations a report reads, ordered by (schema, table, alias).
    pub fn tables_used_by(&self, report_id: &ReportId) -> Vec<UsedRelation> {
        let Some(&ix) = self.reports.get(report_id) else {
            return Vec::new();
        };
        let mut used: Vec<UsedRelation> = self
            .graph
            .edges_directed(ix, Direction::Outgoing)
            .filter_map(|edge| {
                let LineageNode::Relation(rel) = &self.graph[edge.target()] else {
                    return None;
                };
                Some(UsedRelation {
                    schema: rel.schema.clone(),
                    table: rel.table.clone(),
                    alias: edge.weight().alias.clone(),
                    kind: edge.weight().kind,
                })
            })
            .collect();
        // Edge iteration order is an implementation detail; callers get a
        // stable listing.
        used.sort_by(|a, b| {
            (&a.schema, &a.table, &a.alias).cmp(&(&b.schema, &b.table, &b.alias))
        });
        used
    }

    /// Reports that read a relation, ordered by route.
    pub fn reports_using(&self, schema: &str, table: &str) -> Vec<ReportRef> {
        let key = RelationRef {
            schema: schema.to_string(),
            table: table.to_string(),
        };
        let Some(&ix) = self.relations.get(&key) else {
            return Vec::new();
        };
        let mut reports: Vec<ReportRef> = self
            .graph
            .neighbors_directed(ix, Direction::Incoming)
            .filter_map(|n| match &self.graph[n] {
                LineageNode::Report(r) => Some(r.clone()),
                LineageNode::Relation(_) => None,
            })
            .collect();
        reports.sort_by(|a, b| a.route.cmp(&b.route));
        reports.dedup_by(|a, b| a.report_id == b.report_id);
        reports
    }
}
