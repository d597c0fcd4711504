//! Graph validation: structural rules plus catalog reconciliation.
//!
//! Unlike [`ReportGraph::check_integrity`], which fails closed on the first
//! offense at load time, validation is an authoring tool: it walks the whole
//! graph and reports every violation it can find in one pass. Catalog checks
//! compare the graph against an introspected warehouse snapshot; join-key
//! type mismatches are advisory only, since declared types routinely disagree
//! across schemas without breaking the join.

use serde::Serialize;

use crate::catalog::{CatalogSnapshot, TypeClass};
use crate::model::{
    is_valid_ident, DataType, ExprKind, FilterOp, JoinType, ReportGraph, SourceKind,
};

/// A structural or catalog rule the graph breaks. Fatal for publication.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Violation {
    #[error("{context} `{name}` is not a valid identifier")]
    InvalidIdentifier { context: String, name: String },

    #[error("source alias `{alias}` is declared more than once")]
    DuplicateAlias { alias: String },

    #[error("join `{alias}` targets alias `{target}` which is not declared earlier")]
    DanglingJoinTarget { alias: String, target: String },

    #[error("join `{alias}` has no predicates")]
    PredicatelessJoin { alias: String },

    #[error("predicate on join `{alias}` references undeclared alias `{referenced}`")]
    UnknownPredicateAlias { alias: String, referenced: String },

    #[error("output key `{key}` is declared more than once")]
    DuplicateOutputKey { key: String },

    #[error("aggregate field `{key}` has no aggregate function")]
    MissingAggregateFn { key: String },

    #[error("column field `{key}` carries an aggregate function")]
    UnexpectedAggregateFn { key: String },

    #[error("field `{key}` references undeclared alias `{alias}`")]
    UnknownFieldAlias { key: String, alias: String },

    #[error("filter `{code}` references undeclared alias `{alias}`")]
    UnknownFilterAlias { code: String, alias: String },

    #[error("filter `{code}` uses operator `in` without an array transform")]
    ScalarInFilter { code: String },

    #[error("grouping key `{key}` does not match any output field")]
    UnknownGroupingKey { key: String },

    #[error("grouping key `{key}` is an aggregate field")]
    AggregateGroupingKey { key: String },

    #[error("sorting key `{key}` does not match any output field")]
    UnknownSortingKey { key: String },

    #[error("sorting key `{key}` is not sortable")]
    UnsortableKey { key: String },

    #[error("schema `{schema}` is not attached to the warehouse")]
    MissingSchema { schema: String },

    #[error("relation `{schema}.{table}` does not exist")]
    MissingTable { schema: String, table: String },

    #[error("source `{alias}` is declared as {declared} but `{schema}.{table}` is a {actual}")]
    SourceKindMismatch {
        alias: String,
        schema: String,
        table: String,
        declared: SourceKind,
        actual: SourceKind,
    },

    #[error("column `{column}` does not exist on `{schema}.{table}` (alias `{alias}`)")]
    MissingColumn {
        alias: String,
        schema: String,
        table: String,
        column: String,
    },
}

/// Advisory finding; never blocks publication.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Warning {
    #[error(
        "join `{alias}` compares `{left}` ({left_class:?}) with `{right}` ({right_class:?})"
    )]
    JoinKeyTypeMismatch {
        alias: String,
        left: String,
        right: String,
        left_class: TypeClass,
        right_class: TypeClass,
    },

    #[error("field `{key}` is declared {declared} but the column's class is {actual:?}")]
    DeclaredTypeMismatch {
        key: String,
        declared: DataType,
        actual: TypeClass,
    },
}

/// Everything a validation pass found, errors and warnings separated.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<Violation>,
    pub warnings: Vec<Warning>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, v: Violation) {
        self.errors.push(v);
    }

    fn warn(&mut self, w: Warning) {
        self.warnings.push(w);
    }
}

/// Check the graph's internal consistency without touching the warehouse.
pub fn validate_structural(graph: &ReportGraph) -> ValidationReport {
    let mut report = ValidationReport::default();
    check_identifiers(graph, &mut report);
    check_join_shape(graph, &mut report);
    check_fields(graph, &mut report);
    check_filters(graph, &mut report);
    check_grouping_and_sorting(graph, &mut report);
    report
}

/// Full validation: structural rules plus reconciliation against the catalog.
pub fn validate(graph: &ReportGraph, snapshot: &CatalogSnapshot) -> ValidationReport {
    let mut report = validate_structural(graph);
    check_catalog(graph, snapshot, &mut report);
    report
}

fn ident(report: &mut ValidationReport, context: &str, name: &str) {
    if !is_valid_ident(name) {
        report.error(Violation::InvalidIdentifier {
            context: context.to_string(),
            name: name.to_string(),
        });
    }
}

fn check_identifiers(graph: &ReportGraph, report: &mut ValidationReport) {
    for source in graph.sources() {
        ident(report, "alias", &source.alias);
        ident(report, "schema", &source.schema);
        ident(report, "table", &source.table);
    }
    for join in &graph.joins {
        for pred in &join.predicates {
            ident(report, "column", &pred.left_column);
            ident(report, "column", &pred.right_column);
        }
    }
    for field in &graph.fields {
        ident(report, "column", &field.source_column);
        ident(report, "output key", &field.output_key);
    }
    for binding in &graph.filters {
        ident(report, "filter code", &binding.filter_code);
        ident(report, "column", &binding.source_column);
    }
}

fn check_join_shape(graph: &ReportGraph, report: &mut ValidationReport) {
    let mut declared = vec![graph.base.alias.as_str()];

    for join in &graph.joins {
        let alias = join.source.alias.as_str();
        if declared.contains(&alias) {
            report.error(Violation::DuplicateAlias {
                alias: alias.to_string(),
            });
        }
        if !declared.contains(&join.attach_to.as_str()) {
            report.error(Violation::DanglingJoinTarget {
                alias: alias.to_string(),
                target: join.attach_to.clone(),
            });
        }
        declared.push(alias);

        if join.join_type != JoinType::Cross && join.predicates.is_empty() {
            report.error(Violation::PredicatelessJoin {
                alias: alias.to_string(),
            });
        }
        for pred in &join.predicates {
            for referenced in [&pred.left_alias, &pred.right_alias] {
                if !declared.contains(&referenced.as_str()) {
                    report.error(Violation::UnknownPredicateAlias {
                        alias: alias.to_string(),
                        referenced: referenced.clone(),
                    });
                }
            }
        }
    }
}

fn check_fields(graph: &ReportGraph, report: &mut ValidationReport) {
    let mut seen_keys: Vec<&str> = Vec::new();
    for field in &graph.fields {
        let key = field.output_key.as_str();
        if seen_keys.contains(&key) {
            report.error(Violation::DuplicateOutputKey {
                key: key.to_string(),
            });
        }
        seen_keys.push(key);

        match (field.expr_kind, field.aggregate_fn) {
            (ExprKind::Aggregate, None) => report.error(Violation::MissingAggregateFn {
                key: key.to_string(),
            }),
            (ExprKind::Column, Some(_)) => report.error(Violation::UnexpectedAggregateFn {
                key: key.to_string(),
            }),
            _ => {}
        }

        if graph.resolve_alias(&field.source_alias).is_none() {
            report.error(Violation::UnknownFieldAlias {
                key: key.to_string(),
                alias: field.source_alias.clone(),
            });
        }
    }
}

fn check_filters(graph: &ReportGraph, report: &mut ValidationReport) {
    for binding in &graph.filters {
        if graph.resolve_alias(&binding.source_alias).is_none() {
            report.error(Violation::UnknownFilterAlias {
                code: binding.filter_code.clone(),
                alias: binding.source_alias.clone(),
            });
        }
        // `in` still works on a wrapped scalar, but a binding that never
        // yields an array is almost certainly a misconfigured operator.
        if binding.op == FilterOp::In
            && binding.transform != crate::model::ValueTransform::CsvToArray
        {
            report.error(Violation::ScalarInFilter {
                code: binding.filter_code.clone(),
            });
        }
    }
}

fn check_grouping_and_sorting(graph: &ReportGraph, report: &mut ValidationReport) {
    for key in &graph.grouping {
        match graph.field_by_key(key) {
            None => report.error(Violation::UnknownGroupingKey { key: key.clone() }),
            Some(field) if field.expr_kind == ExprKind::Aggregate => {
                report.error(Violation::AggregateGroupingKey { key: key.clone() })
            }
            Some(_) => {}
        }
    }
    for sort in &graph.sorting {
        match graph.field_by_key(&sort.output_key) {
            None => report.error(Violation::UnknownSortingKey {
                key: sort.output_key.clone(),
            }),
            Some(field) if !field.sortable => report.error(Violation::UnsortableKey {
                key: sort.output_key.clone(),
            }),
            Some(_) => {}
        }
    }
}

/// Whether a declared output type can plausibly be read from a column of the
/// given class. `Other` never warns: SQLite allows untyped columns and the
/// check is advisory.
fn class_compatible(declared: DataType, class: TypeClass) -> bool {
    match declared {
        DataType::Number | DataType::Percent => {
            matches!(class, TypeClass::Numeric | TypeClass::Other)
        }
        DataType::Date => matches!(class, TypeClass::Temporal | TypeClass::Other),
        DataType::Boolean => {
            matches!(class, TypeClass::Boolean | TypeClass::Numeric | TypeClass::Other)
        }
        DataType::Text | DataType::Json => matches!(class, TypeClass::Text | TypeClass::Other),
    }
}

fn check_catalog(graph: &ReportGraph, snapshot: &CatalogSnapshot, report: &mut ValidationReport) {
    for source in graph.sources() {
        if !snapshot.has_schema(&source.schema) {
            report.error(Violation::MissingSchema {
                schema: source.schema.clone(),
            });
            continue;
        }
        let Some(table) = snapshot.table(&source.schema, &source.table) else {
            report.error(Violation::MissingTable {
                schema: source.schema.clone(),
                table: source.table.clone(),
            });
            continue;
        };
        // A materialized view is physically a table in the warehouse.
        let compatible = match (source.kind, table.kind) {
            (declared, actual) if declared == actual => true,
            (SourceKind::MaterializedView, SourceKind::Table) => true,
            _ => false,
        };
        if !compatible {
            report.error(Violation::SourceKindMismatch {
                alias: source.alias.clone(),
                schema: source.schema.clone(),
                table: source.table.clone(),
                declared: source.kind,
                actual: table.kind,
            });
        }
    }

    let check_column = |report: &mut ValidationReport, alias: &str, column: &str| {
        let Some(source) = graph.resolve_alias(alias) else {
            // Already reported as an unknown alias.
            return;
        };
        let Some(table) = snapshot.table(&source.schema, &source.table) else {
            return;
        };
        if table.column(column).is_none() {
            report.error(Violation::MissingColumn {
                alias: alias.to_string(),
                schema: source.schema.clone(),
                table: source.table.clone(),
                column: column.to_string(),
            });
        }
    };

    for join in &graph.joins {
        for pred in &join.predicates {
            check_column(report, &pred.left_alias, &pred.left_column);
            check_column(report, &pred.right_alias, &pred.right_column);
        }
    }
    for field in &graph.fields {
        check_column(report, &field.source_alias, &field.source_column);
    }
    for binding in &graph.filters {
        check_column(report, &binding.source_alias, &binding.source_column);
    }

    // Advisory declared-type pass. Aggregates are skipped: the expression
    // determines their result type, not the underlying column.
    for field in &graph.fields {
        if field.expr_kind != ExprKind::Column {
            continue;
        }
        let class = graph
            .resolve_alias(&field.source_alias)
            .and_then(|s| snapshot.table(&s.schema, &s.table))
            .and_then(|t| t.column(&field.source_column))
            .map(|c| c.type_class);
        if let Some(actual) = class {
            if !class_compatible(field.data_type, actual) {
                report.warn(Warning::DeclaredTypeMismatch {
                    key: field.output_key.clone(),
                    declared: field.data_type,
                    actual,
                });
            }
        }
    }

    // Advisory join-key comparability pass.
    for join in &graph.joins {
        for pred in &join.predicates {
            let classes = [
                (&pred.left_alias, &pred.left_column),
                (&pred.right_alias, &pred.right_column),
            ]
            .map(|(alias, column)| {
                graph
                    .resolve_alias(alias)
                    .and_then(|s| snapshot.table(&s.schema, &s.table))
                    .and_then(|t| t.column(column))
                    .map(|c| c.type_class)
            });
            if let [Some(left_class), Some(right_class)] = classes {
                if left_class != right_class {
                    report.warn(Warning::JoinKeyTypeMismatch {
                        alias: join.source.alias.clone(),
                        left: format!("{}.{}", pred.left_alias, pred.left_column),
                        right: format!("{}.{}", pred.right_alias, pred.right_column),
                        left_class,
                        right_class,
                    });
                }
            }
        }
    }
}
