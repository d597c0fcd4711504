//! Lineage index behavior over published graphs.

use registrar::lineage::LineageIndex;
use registrar::model::{
    JoinNode, JoinPredicate, JoinType, NewReport, PredicateOp, ReportGraph, ReportId, SourceKind,
    SourceNode,
};
use registrar::store::MetadataStore;

fn node(alias: &str, schema: &str, table: &str) -> SourceNode {
    SourceNode {
        alias: alias.to_string(),
        schema: schema.to_string(),
        table: table.to_string(),
        kind: SourceKind::Table,
    }
}

fn publish(store: &mut MetadataStore, route: &str, base: SourceNode, joins: Vec<SourceNode>) -> ReportId {
    let report = store
        .create_report(NewReport {
            route: route.to_string(),
            title: format!("Report {route}"),
            category: "test".to_string(),
            description: None,
        })
        .unwrap();
    let base_alias = base.alias.clone();
    let mut graph = ReportGraph::new(report.id.clone(), base);
    for (i, source) in joins.into_iter().enumerate() {
        let alias = source.alias.clone();
        graph.joins.push(JoinNode {
            source,
            join_type: JoinType::Left,
            attach_to: base_alias.clone(),
            priority: i as u32,
            predicates: vec![JoinPredicate {
                left_alias: base_alias.clone(),
                left_column: "id".to_string(),
                op: PredicateOp::Eq,
                right_alias: alias,
                right_column: "id".to_string(),
            }],
        });
    }
    store.publish_graph(&graph).unwrap();
    report.id
}

#[test]
fn test_impact_covers_base_and_join_relations() {
    let mut store = MetadataStore::open_in_memory().unwrap();
    publish(
        &mut store,
        "grad-rates",
        node("s", "data", "student_exit_status"),
        vec![node("p", "data", "programs")],
    );
    publish(
        &mut store,
        "enrollment",
        node("e", "data", "enrollments"),
        vec![node("p", "data", "programs"), node("t", "data", "terms")],
    );
    publish(
        &mut store,
        "finance-summary",
        node("f", "finance", "ledger"),
        vec![],
    );

    let index = LineageIndex::build(&store).unwrap();
    assert_eq!(index.report_count(), 3);
    assert_eq!(index.relation_count(), 5);

    let routes: Vec<_> = index
        .reports_using("data", "programs")
        .into_iter()
        .map(|r| r.route)
        .collect();
    assert_eq!(routes, vec!["enrollment", "grad-rates"]);
}

#[test]
fn test_tables_used_by_carries_alias_and_kind() {
    let mut store = MetadataStore::open_in_memory().unwrap();
    let mut view = node("p", "data", "active_programs");
    view.kind = SourceKind::View;
    let id = publish(
        &mut store,
        "grad-rates",
        node("s", "data", "student_exit_status"),
        vec![],
    );
    // Extend the published graph with a view-backed join.
    let mut graph = store.load_active_graph(&id).unwrap();
    graph.joins.push(JoinNode {
        source: view,
        join_type: JoinType::Left,
        attach_to: "s".to_string(),
        priority: 0,
        predicates: vec![JoinPredicate {
            left_alias: "s".to_string(),
            left_column: "program_code".to_string(),
            op: PredicateOp::Eq,
            right_alias: "p".to_string(),
            right_column: "program_code".to_string(),
        }],
    });
    store.publish_graph(&graph).unwrap();

    let index = LineageIndex::build(&store).unwrap();
    let used = index.tables_used_by(&id);
    assert_eq!(used.len(), 2);
    let view_dep = used.iter().find(|u| u.table == "active_programs").unwrap();
    assert_eq!(view_dep.alias, "p");
    assert_eq!(view_dep.kind, SourceKind::View);
}

#[test]
fn test_inactive_report_leaves_the_index() {
    let mut store = MetadataStore::open_in_memory().unwrap();
    let id = publish(
        &mut store,
        "grad-rates",
        node("s", "data", "student_exit_status"),
        vec![],
    );
    store.set_report_active(&id, false).unwrap();

    let index = LineageIndex::build(&store).unwrap();
    assert!(index.tables_used_by(&id).is_empty());
    assert!(index
        .reports_using("data", "student_exit_status")
        .is_empty());
}

#[test]
fn test_index_reflects_latest_publish_only() {
    let mut store = MetadataStore::open_in_memory().unwrap();
    let id = publish(
        &mut store,
        "grad-rates",
        node("s", "data", "old_snapshot"),
        vec![],
    );
    let mut graph = ReportGraph::new(id.clone(), node("s", "data", "new_snapshot"));
    graph.report_id = id.clone();
    store.publish_graph(&graph).unwrap();

    let index = LineageIndex::build(&store).unwrap();
    assert!(index.reports_using("data", "old_snapshot").is_empty());
    assert_eq!(index.reports_using("data", "new_snapshot").len(), 1);
}
