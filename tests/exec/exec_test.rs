//! Scoped execution behavior against a live warehouse.

use std::collections::BTreeMap;
use std::path::Path;

use registrar::compile::{compile, CompiledQuery, OutputColumn};
use registrar::exec::{ExecError, RowMasker, ScopeClaims, ScopedExecutor, Warehouse};
use registrar::model::{
    DataType, FilterBinding, FilterOp, OutputField, ReportGraph, ReportId, SourceKind, SourceNode,
    ValueTransform,
};
use serde_json::{json, Value};

fn warehouse() -> Warehouse {
    let warehouse = Warehouse::open_in_memory().unwrap();
    warehouse.attach(Path::new(":memory:"), "data").unwrap();
    warehouse
        .connection()
        .execute_batch(
            "
            CREATE TABLE data.student_exit_status (
                sis_user_id TEXT NOT NULL,
                term_code   TEXT NOT NULL,
                exit_code   TEXT NOT NULL,
                gpa         REAL
            );
            INSERT INTO data.student_exit_status VALUES
                ('123', '2024_fa', 'g', 3.5),
                ('123', '2024_sp', 'w', 3.1),
                ('456', '2024_fa', 'g', 2.9);
            ",
        )
        .unwrap();
    warehouse
}

fn exit_status_graph() -> ReportGraph {
    let mut graph = ReportGraph::new(
        ReportId::from("r1"),
        SourceNode {
            alias: "s".to_string(),
            schema: "data".to_string(),
            table: "student_exit_status".to_string(),
            kind: SourceKind::Table,
        },
    );
    graph.fields.push(
        OutputField::column("s", "sis_user_id", "sis_user_id", DataType::Text).with_order(1),
    );
    graph
        .fields
        .push(OutputField::column("s", "exit_code", "exit_code", DataType::Text).with_order(2));
    graph
        .fields
        .push(OutputField::column("s", "gpa", "gpa", DataType::Number).with_order(3));
    graph.filters.push(FilterBinding {
        filter_code: "user".to_string(),
        source_alias: "s".to_string(),
        source_column: "sis_user_id".to_string(),
        op: FilterOp::Eq,
        transform: ValueTransform::Identity,
        predicate_order: 0,
    });
    graph.filters.push(FilterBinding {
        filter_code: "terms".to_string(),
        source_alias: "s".to_string(),
        source_column: "term_code".to_string(),
        op: FilterOp::In,
        transform: ValueTransform::CsvToArray,
        predicate_order: 1,
    });
    graph
}

fn compiled(filters: &[(&str, &str)]) -> CompiledQuery {
    let values: BTreeMap<String, String> = filters
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    compile(&exit_status_graph(), &values).unwrap()
}

#[test]
fn test_scoped_execution_returns_only_scoped_rows() {
    let warehouse = warehouse();
    let executor = ScopedExecutor::new(&warehouse);
    let query = compiled(&[("user", "123")]);

    let rows = executor.execute(&query, &ScopeClaims::user("123")).unwrap();
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row["sis_user_id"], json!("123"));
    }
    assert_eq!(rows[0]["gpa"], json!(3.5));
}

#[test]
fn test_array_filter_executes_through_single_parameter() {
    let warehouse = warehouse();
    let executor = ScopedExecutor::new(&warehouse);
    let query = compiled(&[("terms", "2024_fa")]);
    assert_eq!(query.params.len(), 1);

    let rows = executor.execute(&query, &ScopeClaims::new()).unwrap();
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row["exit_code"], json!("g"));
    }
}

#[test]
fn test_tampered_scope_fails_closed_with_no_rows() {
    let warehouse = warehouse();
    let executor = ScopedExecutor::new(&warehouse);
    let query = compiled(&[]);
    let claims = ScopeClaims::user("123");

    executor.establish_scope(&claims).unwrap();
    // Simulate a session whose scope was swapped underneath the caller.
    warehouse
        .connection()
        .execute(
            "UPDATE temp.session_scope SET value = '456' WHERE key = 'sis_user_id'",
            [],
        )
        .unwrap();

    let err = executor.run_verified(&query, &claims).unwrap_err();
    match err {
        ExecError::ScopeMismatch {
            key,
            asserted,
            actual,
        } => {
            assert_eq!(key, "sis_user_id");
            assert_eq!(asserted, "123");
            assert_eq!(actual, "456");
        }
        other => panic!("expected scope mismatch, got {other:?}"),
    }
}

#[test]
fn test_missing_scope_claim_fails_closed() {
    let warehouse = warehouse();
    let executor = ScopedExecutor::new(&warehouse);
    let query = compiled(&[]);

    executor.establish_scope(&ScopeClaims::new()).unwrap();
    let err = executor
        .run_verified(&query, &ScopeClaims::user("123"))
        .unwrap_err();
    assert!(matches!(err, ExecError::ScopeMissing { key } if key == "sis_user_id"));
}

#[test]
fn test_execute_reestablishes_scope() {
    let warehouse = warehouse();
    let executor = ScopedExecutor::new(&warehouse);
    let query = compiled(&[("user", "456")]);
    let claims = ScopeClaims::user("456");

    // A stale scope from an earlier caller must not leak into this run.
    executor.establish_scope(&ScopeClaims::user("123")).unwrap();
    let rows = executor.execute(&query, &claims).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["sis_user_id"], json!("456"));
}

struct IdMasker;

impl RowMasker for IdMasker {
    fn mask(&self, column: &OutputColumn, value: Value) -> Value {
        if column.key == "sis_user_id" {
            Value::String("***".to_string())
        } else {
            value
        }
    }
}

#[test]
fn test_masker_runs_on_every_cell_after_fetch() {
    let warehouse = warehouse();
    let executor = ScopedExecutor::with_masker(&warehouse, IdMasker);
    let query = compiled(&[("user", "123")]);

    let rows = executor.execute(&query, &ScopeClaims::user("123")).unwrap();
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row["sis_user_id"], json!("***"));
        assert_ne!(row["exit_code"], json!("***"));
    }
}

#[test]
fn test_result_rows_follow_declared_shape() {
    let warehouse = warehouse();
    let executor = ScopedExecutor::new(&warehouse);
    let query = compiled(&[("user", "456")]);
    assert_eq!(
        query.shape.iter().map(|c| c.key.as_str()).collect::<Vec<_>>(),
        vec!["sis_user_id", "exit_code", "gpa"]
    );

    let rows = executor.execute(&query, &ScopeClaims::new()).unwrap();
    assert_eq!(rows[0].len(), 3);
    assert!(rows[0].contains_key("gpa"));
}
