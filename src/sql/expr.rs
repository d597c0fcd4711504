//! Expression AST - the closed set of expressions compiled queries contain.
//!
//! The vocabulary is intentionally narrow: alias-qualified columns, aggregate
//! calls over a single column, comparisons against another column or a bound
//! parameter, AND chains, and array-parameter membership. There is no raw
//! escape hatch and no literal variant.

use super::token::{Token, TokenStream};

/// A SQL expression.
///
/// Every variant is handled exhaustively in `to_tokens`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference: optional_alias.column
    Column {
        table: Option<String>,
        column: String,
    },

    /// Aggregate or scalar function call: name(args...)
    Function { name: String, args: Vec<Expr> },

    /// Binary operation: left op right
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },

    /// Positional bound parameter: $n
    Param(usize),

    /// Array-parameter membership. The array is one bound parameter; on the
    /// SQLite warehouse it renders as `IN (SELECT value FROM json_each($n))`.
    InParam { expr: Box<Expr>, param: usize },
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    And,
    ILike,
}

fn binary_op_to_token(op: BinaryOperator) -> Token {
    match op {
        BinaryOperator::Eq => Token::Eq,
        BinaryOperator::Ne => Token::Ne,
        BinaryOperator::Lt => Token::Lt,
        BinaryOperator::Gt => Token::Gt,
        BinaryOperator::Lte => Token::Lte,
        BinaryOperator::Gte => Token::Gte,
        BinaryOperator::And => Token::And,
        BinaryOperator::ILike => Token::ILike,
    }
}

impl Expr {
    pub fn to_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();
        match self {
            Expr::Column { table, column } => {
                if let Some(table) = table {
                    ts.push(Token::Ident(table.clone())).push(Token::Dot);
                }
                ts.push(Token::Ident(column.clone()));
            }
            Expr::Function { name, args } => {
                ts.push(Token::FunctionName(name.clone())).lparen();
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        ts.comma().space();
                    }
                    ts.append(&arg.to_tokens());
                }
                ts.rparen();
            }
            Expr::BinaryOp { left, op, right } => {
                ts.append(&left.to_tokens());
                ts.space().push(binary_op_to_token(*op)).space();
                ts.append(&right.to_tokens());
            }
            Expr::Param(n) => {
                ts.push(Token::Param(*n));
            }
            Expr::InParam { expr, param } => {
                ts.append(&expr.to_tokens());
                ts.space().push(Token::In).space().lparen();
                ts.push(Token::Select)
                    .space()
                    .push(Token::Ident("value".into()))
                    .space()
                    .push(Token::From)
                    .space()
                    .push(Token::FunctionName("json_each".into()))
                    .lparen()
                    .push(Token::Param(*param))
                    .rparen();
                ts.rparen();
            }
        }
        ts
    }
}

// =============================================================================
// Constructors
// =============================================================================

/// Alias-qualified column: `alias.column`.
pub fn table_col(table: &str, column: &str) -> Expr {
    Expr::Column {
        table: Some(table.to_string()),
        column: column.to_string(),
    }
}

/// Unqualified column.
pub fn col(column: &str) -> Expr {
    Expr::Column {
        table: None,
        column: column.to_string(),
    }
}

/// Aggregate call over one column: `fn(alias.column)`.
pub fn aggregate(name: &str, arg: Expr) -> Expr {
    Expr::Function {
        name: name.to_string(),
        args: vec![arg],
    }
}

/// Positional parameter placeholder.
pub fn param(n: usize) -> Expr {
    Expr::Param(n)
}

// =============================================================================
// Fluent combinators
// =============================================================================

/// Fluent helpers for building comparisons and AND chains.
pub trait ExprExt: Sized {
    fn binary(self, op: BinaryOperator, right: Expr) -> Expr;

    fn eq(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::Eq, right)
    }
    fn ne(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::Ne, right)
    }
    fn gt(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::Gt, right)
    }
    fn gte(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::Gte, right)
    }
    fn lt(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::Lt, right)
    }
    fn lte(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::Lte, right)
    }
    fn and(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::And, right)
    }
    fn ilike(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::ILike, right)
    }
    fn in_param(self, param: usize) -> Expr;
}

impl ExprExt for Expr {
    fn binary(self, op: BinaryOperator, right: Expr) -> Expr {
        Expr::BinaryOp {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    fn in_param(self, param: usize) -> Expr {
        Expr::InParam {
            expr: Box::new(self),
            param,
        }
    }
}
