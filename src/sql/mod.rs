//! SQL emission layer: tokens, expressions and the query builder.
//!
//! Compiled text is assembled exclusively from these types. There is no
//! string templating path and no literal token, so a value can only reach
//! the warehouse through the bound parameter list.

pub mod expr;
pub mod query;
pub mod token;

pub use expr::{aggregate, col, param, table_col, BinaryOperator, Expr, ExprExt};
pub use query::{Join, JoinType, OrderByExpr, Query, SelectExpr, SortDir, TableRef};
pub use token::{Token, TokenStream};
