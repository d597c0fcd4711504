//! Graph-to-SQL compilation.
//!
//! Turns a report graph plus a bag of request filter values into one
//! parameterized SELECT. Every identifier in the emitted text comes from
//! validated metadata and every caller value becomes a positional `$n`
//! parameter, so the number of placeholders always equals the number of bound
//! values. Array filters stay a single parameter: the list is bound as a JSON
//! document and membership goes through `json_each`.

use std::collections::BTreeMap;

use tracing::debug;

use crate::model::{
    AggregateFn, ExprKind, FilterOp, GraphIntegrityError, JoinType as ModelJoinType, OutputField,
    ParamValue, PredicateOp, ReportGraph, ReportId, SortDirection,
};
use crate::sql::expr::{self, BinaryOperator, Expr, ExprExt};
use crate::sql::query::{JoinType, OrderByExpr, Query, SelectExpr, TableRef};
use crate::store::{MetadataStore, StoreError};
use crate::validation::{self, Violation};

/// Errors raised while compiling a graph.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Integrity(#[from] GraphIntegrityError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("graph fails validation: {}", format_violations(.violations))]
    Misconfigured { violations: Vec<Violation> },

    #[error("field `{key}` must be aggregated or listed in the grouping keys")]
    UngroupedField { key: String },

    #[error("grouping key `{key}` does not resolve to a column field")]
    BadGroupingKey { key: String },

    #[error("sorting key `{key}` does not resolve to an output field")]
    BadSortingKey { key: String },
}

fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// One column of the result shape, in emission order.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct OutputColumn {
    pub key: String,
    pub label: String,
    pub data_type: crate::model::DataType,
}

/// A compiled, parameterized query ready for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    /// SQL text containing only `$n` placeholders, never values.
    pub text: String,
    /// Bound values; `params[i]` answers placeholder `$(i + 1)`.
    pub params: Vec<ParamValue>,
    /// Result columns in SELECT order.
    pub shape: Vec<OutputColumn>,
    /// Content version of the graph this query was compiled from.
    pub content_version: String,
}

/// Compile a graph against a set of request filter values.
///
/// `filter_values` is keyed by filter code; codes with no binding in the
/// graph are absorbed, bindings with no value contribute no predicate.
pub fn compile(
    graph: &ReportGraph,
    filter_values: &BTreeMap<String, String>,
) -> Result<CompiledQuery, CompileError> {
    graph.check_integrity()?;
    check_aggregation(graph)?;

    let mut query = Query::new().from(TableRef::new(
        &graph.base.schema,
        &graph.base.table,
        &graph.base.alias,
    ));

    // Joins in priority order, declaration order breaking ties.
    let mut joins: Vec<_> = graph.joins.iter().enumerate().collect();
    joins.sort_by_key(|(i, j)| (j.priority, *i));
    for (_, join) in joins {
        let on = join
            .predicates
            .iter()
            .map(|p| {
                expr::table_col(&p.left_alias, &p.left_column).binary(
                    predicate_operator(p.op),
                    expr::table_col(&p.right_alias, &p.right_column),
                )
            })
            .reduce(|left, right| left.and(right));
        query = query.join(
            join_type(join.join_type),
            TableRef::new(&join.source.schema, &join.source.table, &join.source.alias),
            on,
        );
    }

    // SELECT list in display order, declaration order breaking ties.
    let mut fields: Vec<_> = graph.fields.iter().enumerate().collect();
    fields.sort_by_key(|(i, f)| (f.output_order, *i));
    let mut select = Vec::with_capacity(fields.len());
    let mut shape = Vec::with_capacity(fields.len());
    for (_, field) in &fields {
        select.push(SelectExpr::new(field_expr(field)).with_alias(&field.output_key));
        shape.push(OutputColumn {
            key: field.output_key.clone(),
            label: field.label.clone(),
            data_type: field.data_type,
        });
    }
    query = query.select(select);

    // Bound filters in predicate order. A filter code shared by several
    // bindings binds the value once per predicate, which keeps the
    // placeholder count equal to the parameter count.
    let mut params: Vec<ParamValue> = Vec::new();
    let mut bindings: Vec<_> = graph.filters.iter().enumerate().collect();
    bindings.sort_by_key(|(i, b)| (b.predicate_order, *i));
    for (_, binding) in bindings {
        let Some(raw) = filter_values.get(&binding.filter_code) else {
            continue;
        };
        let value = binding.transform.apply(raw);
        let column = expr::table_col(&binding.source_alias, &binding.source_column);
        let n = params.len() + 1;
        let predicate = match binding.op {
            FilterOp::In => {
                params.push(ParamValue::List(value.into_list()));
                column.in_param(n)
            }
            scalar => {
                params.push(value);
                column.binary(filter_operator(scalar), expr::param(n))
            }
        };
        query = query.filter(predicate);
    }
    for code in filter_values.keys() {
        if !graph.filters.iter().any(|b| &b.filter_code == code) {
            debug!(filter_code = %code, "ignoring filter value with no binding");
        }
    }

    query = query.group_by(grouping_exprs(graph)?);
    query = query.order_by(sorting_exprs(graph)?);

    Ok(CompiledQuery {
        text: query.to_sql(),
        params,
        shape,
        content_version: graph.content_version(),
    })
}

/// Load a report's active graph, validate it structurally and compile it.
pub fn compile_report(
    store: &MetadataStore,
    report_id: &ReportId,
    filter_values: &BTreeMap<String, String>,
) -> Result<CompiledQuery, CompileError> {
    let graph = store.load_active_graph(report_id)?;
    let report = validation::validate_structural(&graph);
    if !report.is_ok() {
        return Err(CompileError::Misconfigured {
            violations: report.errors,
        });
    }
    compile(&graph, filter_values)
}

/// Aggregated reports must group every plain column they select.
fn check_aggregation(graph: &ReportGraph) -> Result<(), CompileError> {
    let aggregated = graph
        .fields
        .iter()
        .any(|f| f.expr_kind == ExprKind::Aggregate);
    if !aggregated {
        return Ok(());
    }
    for field in &graph.fields {
        if field.expr_kind == ExprKind::Column && !graph.grouping.contains(&field.output_key) {
            return Err(CompileError::UngroupedField {
                key: field.output_key.clone(),
            });
        }
    }
    Ok(())
}

fn field_expr(field: &OutputField) -> Expr {
    let column = expr::table_col(&field.source_alias, &field.source_column);
    match field.expr_kind {
        ExprKind::Column => column,
        ExprKind::Aggregate => expr::aggregate(
            field.aggregate_fn.unwrap_or(AggregateFn::Count).as_str(),
            column,
        ),
    }
}

fn grouping_exprs(graph: &ReportGraph) -> Result<Vec<Expr>, CompileError> {
    graph
        .grouping
        .iter()
        .map(|key| match graph.field_by_key(key) {
            Some(field) if field.expr_kind == ExprKind::Column => Ok(field_expr(field)),
            _ => Err(CompileError::BadGroupingKey { key: key.clone() }),
        })
        .collect()
}

fn sorting_exprs(graph: &ReportGraph) -> Result<Vec<OrderByExpr>, CompileError> {
    graph
        .sorting
        .iter()
        .map(|sort| {
            let field =
                graph
                    .field_by_key(&sort.output_key)
                    .ok_or_else(|| CompileError::BadSortingKey {
                        key: sort.output_key.clone(),
                    })?;
            let expr = field_expr(field);
            Ok(match sort.direction {
                SortDirection::Asc => OrderByExpr::asc(expr),
                SortDirection::Desc => OrderByExpr::desc(expr),
            })
        })
        .collect()
}

fn join_type(jt: ModelJoinType) -> JoinType {
    match jt {
        ModelJoinType::Inner => JoinType::Inner,
        ModelJoinType::Left => JoinType::Left,
        ModelJoinType::Right => JoinType::Right,
        ModelJoinType::Full => JoinType::Full,
        ModelJoinType::Cross => JoinType::Cross,
    }
}

fn predicate_operator(op: PredicateOp) -> BinaryOperator {
    match op {
        PredicateOp::Eq => BinaryOperator::Eq,
        PredicateOp::Ne => BinaryOperator::Ne,
        PredicateOp::Gt => BinaryOperator::Gt,
        PredicateOp::Gte => BinaryOperator::Gte,
        PredicateOp::Lt => BinaryOperator::Lt,
        PredicateOp::Lte => BinaryOperator::Lte,
    }
}

fn filter_operator(op: FilterOp) -> BinaryOperator {
    match op {
        FilterOp::Eq => BinaryOperator::Eq,
        FilterOp::Ne => BinaryOperator::Ne,
        FilterOp::Gt => BinaryOperator::Gt,
        FilterOp::Gte => BinaryOperator::Gte,
        FilterOp::Lt => BinaryOperator::Lt,
        FilterOp::Lte => BinaryOperator::Lte,
        FilterOp::Ilike => BinaryOperator::ILike,
        // `in` is handled at the call site; falling through here would emit
        // a scalar comparison against an array parameter.
        FilterOp::In => BinaryOperator::Eq,
    }
}
