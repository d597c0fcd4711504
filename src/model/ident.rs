//! Identifier grammar shared by every metadata name that reaches SQL text.
//!
//! Aliases, schema names, table names, column names and output keys must all
//! match `^[a-z][a-z0-9_]*$` before any of them is concatenated into a query.
//! This check is the primary injection defense; the compiler refuses to emit
//! anything that has not passed it.

use once_cell::sync::Lazy;
use regex::Regex;

static IDENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new("^[a-z][a-z0-9_]*$").expect("identifier pattern is valid")
});

/// Check a name against the identifier grammar.
pub fn is_valid_ident(name: &str) -> bool {
    IDENT_RE.is_match(name)
}
