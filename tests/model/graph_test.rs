//! Dependency-graph snapshot behavior through the public API.

use registrar::model::{
    DataType, FilterBinding, FilterOp, JoinNode, JoinPredicate, JoinType, OutputField,
    PredicateOp, ReportGraph, ReportId, SortDirection, SortKey, SourceKind, SourceNode,
    ValueTransform,
};

fn node(alias: &str, table: &str) -> SourceNode {
    SourceNode {
        alias: alias.to_string(),
        schema: "data".to_string(),
        table: table.to_string(),
        kind: SourceKind::Table,
    }
}

fn join(alias: &str, table: &str, attach_to: &str, priority: u32) -> JoinNode {
    JoinNode {
        source: node(alias, table),
        join_type: JoinType::Left,
        attach_to: attach_to.to_string(),
        priority,
        predicates: vec![JoinPredicate {
            left_alias: attach_to.to_string(),
            left_column: "id".to_string(),
            op: PredicateOp::Eq,
            right_alias: alias.to_string(),
            right_column: "id".to_string(),
        }],
    }
}

/// A realistic multi-join graph: exit status joined to programs and terms.
fn grad_rates_graph() -> ReportGraph {
    let mut graph = ReportGraph::new(ReportId::from("r1"), node("s", "student_exit_status"));
    graph.joins.push(join("p", "programs", "s", 0));
    graph.joins.push(join("t", "terms", "s", 1));
    graph.fields.push(OutputField::column(
        "p",
        "title",
        "program_title",
        DataType::Text,
    ));
    graph.fields.push(OutputField::column(
        "s",
        "exit_code",
        "exit_code",
        DataType::Text,
    ));
    graph.filters.push(FilterBinding {
        filter_code: "term".to_string(),
        source_alias: "t".to_string(),
        source_column: "term_code".to_string(),
        op: FilterOp::Eq,
        transform: ValueTransform::Identity,
        predicate_order: 0,
    });
    graph.sorting.push(SortKey {
        output_key: "program_title".to_string(),
        direction: SortDirection::Asc,
    });
    graph
}

#[test]
fn test_realistic_graph_passes_integrity() {
    assert!(grad_rates_graph().check_integrity().is_ok());
}

#[test]
fn test_resolve_alias_covers_base_and_joins() {
    let graph = grad_rates_graph();
    assert_eq!(graph.resolve_alias("s").unwrap().table, "student_exit_status");
    assert_eq!(graph.resolve_alias("t").unwrap().table, "terms");
    assert!(graph.resolve_alias("x").is_none());
}

#[test]
fn test_sources_iterates_base_first() {
    let graph = grad_rates_graph();
    let aliases: Vec<_> = graph.sources().map(|s| s.alias.as_str()).collect();
    assert_eq!(aliases, vec!["s", "p", "t"]);
}

#[test]
fn test_content_version_is_stable_across_clones() {
    let graph = grad_rates_graph();
    assert_eq!(graph.content_version(), graph.clone().content_version());
}

#[test]
fn test_content_version_tracks_every_section() {
    let base = grad_rates_graph();
    let v0 = base.content_version();

    let mut filters_changed = base.clone();
    filters_changed.filters[0].op = FilterOp::Ilike;
    assert_ne!(v0, filters_changed.content_version());

    let mut sorting_changed = base.clone();
    sorting_changed.sorting[0].direction = SortDirection::Desc;
    assert_ne!(v0, sorting_changed.content_version());

    let mut priority_changed = base.clone();
    priority_changed.joins[0].priority = 9;
    assert_ne!(v0, priority_changed.content_version());
}

#[test]
fn test_graph_survives_json_roundtrip() {
    let graph = grad_rates_graph();
    let json = serde_json::to_string(&graph).unwrap();
    let back: ReportGraph = serde_json::from_str(&json).unwrap();
    assert_eq!(graph, back);
    assert_eq!(graph.content_version(), back.content_version());
}

#[test]
fn test_duplicate_alias_rejected() {
    let mut graph = grad_rates_graph();
    graph.joins.push(join("p", "programs", "s", 2));
    assert!(graph.check_integrity().is_err());
}
