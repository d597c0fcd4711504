//! Report metadata model.
//!
//! The query a report runs is represented as a closed algebraic structure:
//! tagged source nodes (base/join), column or aggregate output fields, and
//! fixed operator vocabularies. Nothing in this module holds free-form SQL.

pub mod field;
pub mod filter;
pub mod graph;
pub mod ident;
pub mod report;
pub mod source;

pub use field::{AggregateFn, DataType, ExprKind, OutputField};
pub use filter::{FilterBinding, FilterOp, ParamValue, ValueTransform};
pub use graph::{GraphIntegrityError, ReportGraph, SortDirection, SortKey};
pub use ident::is_valid_ident;
pub use report::{NewReport, Report, ReportId};
pub use source::{JoinNode, JoinPredicate, JoinType, PredicateOp, SourceKind, SourceNode, SourceRole};
