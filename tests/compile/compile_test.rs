//! Compilation behavior: placeholder discipline, clause ordering, grouping.

use std::collections::BTreeMap;

use registrar::compile::{compile, compile_report, CompileError};
use registrar::model::{
    AggregateFn, DataType, FilterBinding, FilterOp, JoinNode, JoinPredicate, JoinType, NewReport,
    OutputField, ParamValue, PredicateOp, ReportGraph, ReportId, SortDirection, SortKey,
    SourceKind, SourceNode, ValueTransform,
};
use registrar::store::MetadataStore;

fn node(alias: &str, table: &str) -> SourceNode {
    SourceNode {
        alias: alias.to_string(),
        schema: "data".to_string(),
        table: table.to_string(),
        kind: SourceKind::Table,
    }
}

fn eq_join(alias: &str, table: &str, attach_to: &str, column: &str, priority: u32) -> JoinNode {
    JoinNode {
        source: node(alias, table),
        join_type: JoinType::Left,
        attach_to: attach_to.to_string(),
        priority,
        predicates: vec![JoinPredicate {
            left_alias: attach_to.to_string(),
            left_column: column.to_string(),
            op: PredicateOp::Eq,
            right_alias: alias.to_string(),
            right_column: column.to_string(),
        }],
    }
}

fn filter(code: &str, alias: &str, column: &str, op: FilterOp, transform: ValueTransform) -> FilterBinding {
    FilterBinding {
        filter_code: code.to_string(),
        source_alias: alias.to_string(),
        source_column: column.to_string(),
        op,
        transform,
        predicate_order: 0,
    }
}

fn base_graph() -> ReportGraph {
    let mut graph = ReportGraph::new(ReportId::from("r1"), node("s", "student_exit_status"));
    graph.fields.push(OutputField::column(
        "s",
        "sis_user_id",
        "sis_user_id",
        DataType::Text,
    ));
    graph
}

fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_filter_values_never_reach_query_text() {
    let mut graph = base_graph();
    graph.filters.push(filter(
        "term",
        "s",
        "term_code",
        FilterOp::Eq,
        ValueTransform::Identity,
    ));

    let compiled = compile(&graph, &values(&[("term", "2024_fa")])).unwrap();
    assert!(compiled.text.contains("\"s\".\"term_code\" = $1"));
    assert!(!compiled.text.contains("2024_fa"));
    assert_eq!(
        compiled.params,
        vec![ParamValue::Text("2024_fa".to_string())]
    );
}

#[test]
fn test_placeholder_count_equals_param_count() {
    let mut graph = base_graph();
    graph.filters.push(filter(
        "term",
        "s",
        "term_code",
        FilterOp::Eq,
        ValueTransform::Identity,
    ));
    graph.filters.push(filter(
        "codes",
        "s",
        "exit_code",
        FilterOp::In,
        ValueTransform::CsvToArray,
    ));
    graph.filters.push(filter(
        "name",
        "s",
        "last_name",
        FilterOp::Ilike,
        ValueTransform::Lowercase,
    ));

    let compiled = compile(
        &graph,
        &values(&[("term", "2024_fa"), ("codes", "w,g"), ("name", "Smith")]),
    )
    .unwrap();

    let placeholders = (1..=9)
        .filter(|n| compiled.text.contains(&format!("${n}")))
        .count();
    assert_eq!(placeholders, compiled.params.len());
    assert_eq!(compiled.params.len(), 3);
}

#[test]
fn test_in_filter_binds_one_array_parameter() {
    let mut graph = base_graph();
    graph.filters.push(filter(
        "codes",
        "s",
        "exit_code",
        FilterOp::In,
        ValueTransform::CsvToArray,
    ));

    let compiled = compile(&graph, &values(&[("codes", "w,g,x")])).unwrap();
    assert!(compiled
        .text
        .contains("IN (SELECT \"value\" FROM JSON_EACH($1))"));
    assert!(!compiled.text.contains("$2"));
    assert_eq!(
        compiled.params,
        vec![ParamValue::List(vec![
            "w".to_string(),
            "g".to_string(),
            "x".to_string()
        ])]
    );
}

#[test]
fn test_scalar_value_on_in_filter_coerces_to_list() {
    let mut graph = base_graph();
    graph.filters.push(filter(
        "codes",
        "s",
        "exit_code",
        FilterOp::In,
        ValueTransform::Identity,
    ));

    let compiled = compile(&graph, &values(&[("codes", "w")])).unwrap();
    assert_eq!(
        compiled.params,
        vec![ParamValue::List(vec!["w".to_string()])]
    );
}

#[test]
fn test_absent_filter_contributes_no_predicate() {
    let mut graph = base_graph();
    graph.filters.push(filter(
        "term",
        "s",
        "term_code",
        FilterOp::Eq,
        ValueTransform::Identity,
    ));

    let compiled = compile(&graph, &BTreeMap::new()).unwrap();
    assert!(!compiled.text.contains("WHERE"));
    assert!(compiled.params.is_empty());
}

#[test]
fn test_unbound_filter_value_is_absorbed() {
    let graph = base_graph();
    let compiled = compile(&graph, &values(&[("nonexistent", "x")])).unwrap();
    assert!(!compiled.text.contains("WHERE"));
    assert!(compiled.params.is_empty());
}

#[test]
fn test_shared_filter_code_binds_value_per_predicate() {
    let mut graph = base_graph();
    graph.joins.push(eq_join("p", "programs", "s", "program_code", 0));
    graph.filters.push(filter(
        "campus",
        "s",
        "campus_code",
        FilterOp::Eq,
        ValueTransform::Identity,
    ));
    let mut second = filter(
        "campus",
        "p",
        "campus_code",
        FilterOp::Eq,
        ValueTransform::Identity,
    );
    second.predicate_order = 1;
    graph.filters.push(second);

    let compiled = compile(&graph, &values(&[("campus", "north")])).unwrap();
    assert!(compiled.text.contains("\"s\".\"campus_code\" = $1"));
    assert!(compiled.text.contains("\"p\".\"campus_code\" = $2"));
    assert_eq!(compiled.params.len(), 2);
}

#[test]
fn test_joins_emit_in_priority_order() {
    let mut graph = base_graph();
    graph.joins.push(eq_join("t", "terms", "s", "term_id", 5));
    graph
        .joins
        .push(eq_join("p", "programs", "s", "program_code", 1));

    let compiled = compile(&graph, &BTreeMap::new()).unwrap();
    let programs_at = compiled.text.find("\"programs\"").unwrap();
    let terms_at = compiled.text.find("\"terms\"").unwrap();
    assert!(programs_at < terms_at);
}

#[test]
fn test_select_list_follows_output_order() {
    let mut graph = ReportGraph::new(ReportId::from("r1"), node("s", "students"));
    graph.fields.push(
        OutputField::column("s", "gpa", "gpa", DataType::Number).with_order(2),
    );
    graph.fields.push(
        OutputField::column("s", "sis_user_id", "sis_user_id", DataType::Text).with_order(1),
    );

    let compiled = compile(&graph, &BTreeMap::new()).unwrap();
    let id_at = compiled.text.find("\"sis_user_id\"").unwrap();
    let gpa_at = compiled.text.find("\"gpa\"").unwrap();
    assert!(id_at < gpa_at);
    assert_eq!(compiled.shape[0].key, "sis_user_id");
    assert_eq!(compiled.shape[1].key, "gpa");
}

#[test]
fn test_aggregate_report_emits_group_by() {
    let mut graph = ReportGraph::new(ReportId::from("r1"), node("s", "students"));
    graph.fields.push(OutputField::column(
        "s",
        "program_code",
        "program_code",
        DataType::Text,
    ));
    graph.fields.push(OutputField::aggregate(
        "s",
        "sis_user_id",
        "headcount",
        AggregateFn::Count,
        DataType::Number,
    ));
    graph.grouping.push("program_code".to_string());

    let compiled = compile(&graph, &BTreeMap::new()).unwrap();
    assert!(compiled.text.contains("COUNT(\"s\".\"sis_user_id\")"));
    assert!(compiled
        .text
        .contains("GROUP BY \"s\".\"program_code\""));
}

#[test]
fn test_ungrouped_column_field_is_rejected() {
    let mut graph = ReportGraph::new(ReportId::from("r1"), node("s", "students"));
    graph.fields.push(OutputField::column(
        "s",
        "program_code",
        "program_code",
        DataType::Text,
    ));
    graph.fields.push(OutputField::aggregate(
        "s",
        "sis_user_id",
        "headcount",
        AggregateFn::Count,
        DataType::Number,
    ));

    let err = compile(&graph, &BTreeMap::new()).unwrap_err();
    assert!(matches!(
        err,
        CompileError::UngroupedField { key } if key == "program_code"
    ));
}

#[test]
fn test_empty_sorting_emits_no_order_by() {
    let compiled = compile(&base_graph(), &BTreeMap::new()).unwrap();
    assert!(!compiled.text.contains("ORDER BY"));
}

#[test]
fn test_sorting_resolves_output_keys() {
    let mut graph = base_graph();
    graph.sorting.push(SortKey {
        output_key: "sis_user_id".to_string(),
        direction: SortDirection::Desc,
    });
    let compiled = compile(&graph, &BTreeMap::new()).unwrap();
    assert!(compiled
        .text
        .contains("ORDER BY \"s\".\"sis_user_id\" DESC"));
}

#[test]
fn test_ilike_renders_as_like() {
    let mut graph = base_graph();
    graph.filters.push(filter(
        "name",
        "s",
        "last_name",
        FilterOp::Ilike,
        ValueTransform::Identity,
    ));
    let compiled = compile(&graph, &values(&[("name", "smi%")])).unwrap();
    assert!(compiled.text.contains("\"s\".\"last_name\" LIKE $1"));
}

#[test]
fn test_compile_report_loads_active_graph_from_store() {
    let mut store = MetadataStore::open_in_memory().unwrap();
    let report = store
        .create_report(NewReport {
            route: "grad-rates".to_string(),
            title: "Graduation rates".to_string(),
            category: "completion".to_string(),
            description: None,
        })
        .unwrap();

    let mut graph = ReportGraph::new(report.id.clone(), node("s", "student_exit_status"));
    graph.fields.push(OutputField::column(
        "s",
        "sis_user_id",
        "sis_user_id",
        DataType::Text,
    ));
    graph.filters.push(filter(
        "term",
        "s",
        "term_code",
        FilterOp::Eq,
        ValueTransform::Trim,
    ));
    store.publish_graph(&graph).unwrap();

    let compiled =
        compile_report(&store, &report.id, &values(&[("term", " 2024_fa ")])).unwrap();
    assert!(compiled.text.contains("FROM \"data\".\"student_exit_status\" AS \"s\""));
    assert_eq!(
        compiled.params,
        vec![ParamValue::Text("2024_fa".to_string())]
    );
    assert_eq!(compiled.content_version, graph.content_version());
}

#[test]
fn test_compile_report_for_unknown_report_fails() {
    let store = MetadataStore::open_in_memory().unwrap();
    let err = compile_report(&store, &ReportId::from("ghost"), &BTreeMap::new()).unwrap_err();
    assert!(matches!(err, CompileError::Store(_)));
}
