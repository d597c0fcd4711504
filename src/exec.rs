//! Scoped query execution against the warehouse.
//!
//! Compiled queries run through [`ScopedExecutor`], which establishes the
//! caller's access scope in the session, then re-reads it and compares before
//! any row is fetched. A session whose scope does not match the asserted
//! claims fails closed with no rows returned. Values are bound by placeholder
//! index, never interpolated; array parameters travel as one JSON document.

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::Value;
use tracing::{error, info};

use crate::compile::{CompiledQuery, OutputColumn};
use crate::model::{is_valid_ident, DataType, ParamValue};

/// Errors raised while executing a compiled query.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("schema name is not a valid identifier: {0}")]
    InvalidSchemaName(String),

    #[error("query has no `{name}` placeholder for bound parameter")]
    MissingPlaceholder { name: String },

    #[error("session scope does not carry `{key}`")]
    ScopeMissing { key: String },

    #[error("session scope `{key}` is `{actual}`, caller asserted `{asserted}`")]
    ScopeMismatch {
        key: String,
        asserted: String,
        actual: String,
    },
}

/// The access claims a caller asserts for one execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeClaims {
    claims: BTreeMap<String, String>,
}

impl ScopeClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims scoping execution to a single SIS user.
    pub fn user(sis_user_id: &str) -> Self {
        let mut claims = Self::new();
        claims.assert_claim("sis_user_id", sis_user_id);
        claims
    }

    pub fn assert_claim(&mut self, key: &str, value: &str) -> &mut Self {
        self.claims.insert(key.to_string(), value.to_string());
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.claims.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

/// An open warehouse connection with its attached schemas.
pub struct Warehouse {
    conn: Connection,
}

impl Warehouse {
    pub fn open(path: &Path) -> Result<Self, ExecError> {
        Ok(Self {
            conn: Connection::open(path)?,
        })
    }

    pub fn open_in_memory() -> Result<Self, ExecError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Attach a database file under a schema name.
    pub fn attach(&self, path: &Path, schema: &str) -> Result<(), ExecError> {
        if !is_valid_ident(schema) {
            return Err(ExecError::InvalidSchemaName(schema.to_string()));
        }
        // Schema is identifier-checked; the path is bound.
        self.conn.execute(
            &format!("ATTACH DATABASE ?1 AS \"{schema}\""),
            [path.to_string_lossy()],
        )?;
        info!(schema, "attached warehouse schema");
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Post-fetch masking hook applied to every cell before it leaves the
/// executor. Masking happens after scope verification, so maskers only ever
/// see rows the caller was entitled to.
pub trait RowMasker {
    fn mask(&self, column: &OutputColumn, value: Value) -> Value;
}

/// Masker that returns every value untouched.
pub struct PassthroughMasker;

impl RowMasker for PassthroughMasker {
    fn mask(&self, _column: &OutputColumn, value: Value) -> Value {
        value
    }
}

/// One result row, keyed by output key.
pub type ResultRow = serde_json::Map<String, Value>;

/// Executes compiled queries under verified session scope.
pub struct ScopedExecutor<'a, M: RowMasker> {
    warehouse: &'a Warehouse,
    masker: M,
}

impl<'a> ScopedExecutor<'a, PassthroughMasker> {
    pub fn new(warehouse: &'a Warehouse) -> Self {
        Self::with_masker(warehouse, PassthroughMasker)
    }
}

impl<'a, M: RowMasker> ScopedExecutor<'a, M> {
    pub fn with_masker(warehouse: &'a Warehouse, masker: M) -> Self {
        Self { warehouse, masker }
    }

    /// Write the caller's claims into the session scope table, replacing any
    /// scope a previous execution left behind.
    pub fn establish_scope(&self, claims: &ScopeClaims) -> Result<(), ExecError> {
        let conn = &self.warehouse.conn;
        conn.execute_batch(
            "CREATE TEMP TABLE IF NOT EXISTS session_scope (
                 key   TEXT PRIMARY KEY,
                 value TEXT NOT NULL
             );
             DELETE FROM temp.session_scope;",
        )?;
        let mut stmt =
            conn.prepare("INSERT INTO temp.session_scope (key, value) VALUES (?1, ?2)")?;
        for (key, value) in claims.iter() {
            stmt.execute([key, value])?;
        }
        Ok(())
    }

    /// Re-read the session scope and compare it to the asserted claims.
    fn verify_scope(&self, claims: &ScopeClaims) -> Result<(), ExecError> {
        use rusqlite::OptionalExtension;

        let conn = &self.warehouse.conn;
        for (key, asserted) in claims.iter() {
            let actual: Option<String> = conn
                .query_row(
                    "SELECT value FROM temp.session_scope WHERE key = ?1",
                    [key],
                    |row| row.get(0),
                )
                .optional()?;
            match actual {
                None => {
                    error!(key, "session scope missing asserted claim, refusing to run");
                    return Err(ExecError::ScopeMissing {
                        key: key.to_string(),
                    });
                }
                Some(actual) if actual != asserted => {
                    error!(key, asserted, actual = %actual, "session scope mismatch, refusing to run");
                    return Err(ExecError::ScopeMismatch {
                        key: key.to_string(),
                        asserted: asserted.to_string(),
                        actual,
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Run a compiled query against an already-established scope.
    ///
    /// The scope is verified first; no statement over report data runs when
    /// verification fails.
    pub fn run_verified(
        &self,
        query: &CompiledQuery,
        claims: &ScopeClaims,
    ) -> Result<Vec<ResultRow>, ExecError> {
        self.verify_scope(claims)?;

        let conn = &self.warehouse.conn;
        let mut stmt = conn.prepare(&query.text)?;
        for (i, value) in query.params.iter().enumerate() {
            let name = format!("${}", i + 1);
            let idx = stmt
                .parameter_index(&name)?
                .ok_or_else(|| ExecError::MissingPlaceholder { name })?;
            match value {
                ParamValue::Text(s) => stmt.raw_bind_parameter(idx, s)?,
                ParamValue::List(items) => {
                    stmt.raw_bind_parameter(idx, serde_json::to_string(items)?)?
                }
            }
        }

        let mut rows = stmt.raw_query();
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut out = ResultRow::new();
            for (i, column) in query.shape.iter().enumerate() {
                let value = cell_value(row.get_ref(i)?, column.data_type)?;
                out.insert(column.key.clone(), self.masker.mask(column, value));
            }
            result.push(out);
        }
        Ok(result)
    }

    /// Establish the caller's scope, verify it and run the query.
    pub fn execute(
        &self,
        query: &CompiledQuery,
        claims: &ScopeClaims,
    ) -> Result<Vec<ResultRow>, ExecError> {
        self.establish_scope(claims)?;
        self.run_verified(query, claims)
    }
}

/// Coerce one fetched cell into its declared output type.
fn cell_value(raw: ValueRef<'_>, data_type: DataType) -> Result<Value, ExecError> {
    let value = match raw {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => match data_type {
            DataType::Boolean => Value::Bool(i != 0),
            DataType::Text | DataType::Date => Value::String(i.to_string()),
            _ => Value::from(i),
        },
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            match data_type {
                DataType::Json => serde_json::from_str(&text).unwrap_or(Value::String(text)),
                DataType::Boolean => Value::Bool(text == "1" || text.eq_ignore_ascii_case("true")),
                _ => Value::String(text),
            }
        }
        ValueRef::Blob(bytes) => Value::String(format!("{} bytes", bytes.len())),
    };
    Ok(value)
}
