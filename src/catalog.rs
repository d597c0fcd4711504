//! Warehouse catalog introspection.
//!
//! Reads table and column shapes out of the attached warehouse schemas so the
//! validator can check graphs against what actually exists. Snapshots are
//! immutable once built; [`SnapshotCache`] amortizes introspection across
//! requests with a TTL.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rusqlite::Connection;
use serde::Serialize;
use tracing::debug;

use crate::model::{is_valid_ident, SourceKind};

/// Errors raised while introspecting the warehouse.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("schema name is not a valid identifier: {0}")]
    InvalidSchemaName(String),
}

/// Broad comparability class for a column's declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeClass {
    Text,
    Numeric,
    Temporal,
    Boolean,
    Other,
}

impl TypeClass {
    /// Classify a declared column type by SQLite's affinity conventions.
    pub fn from_declared(declared: &str) -> Self {
        let lower = declared.to_ascii_lowercase();
        if lower.contains("bool") {
            TypeClass::Boolean
        } else if lower.contains("date") || lower.contains("time") {
            TypeClass::Temporal
        } else if lower.contains("int")
            || lower.contains("real")
            || lower.contains("floa")
            || lower.contains("doub")
            || lower.contains("num")
            || lower.contains("dec")
        {
            TypeClass::Numeric
        } else if lower.contains("char") || lower.contains("clob") || lower.contains("text") {
            TypeClass::Text
        } else {
            TypeClass::Other
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    pub type_class: TypeClass,
    pub not_null: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
    pub kind: SourceKind,
    pub columns: Vec<ColumnInfo>,
}

impl TableInfo {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Point-in-time view of the warehouse's tables and columns.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    tables: BTreeMap<(String, String), TableInfo>,
}

impl CatalogSnapshot {
    pub fn table(&self, schema: &str, name: &str) -> Option<&TableInfo> {
        self.tables
            .get(&(schema.to_string(), name.to_string()))
    }

    pub fn has_schema(&self, schema: &str) -> bool {
        self.tables.keys().any(|(s, _)| s == schema)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableInfo> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Introspect the named schemas on an open warehouse connection.
pub fn introspect(conn: &Connection, schemas: &[String]) -> Result<CatalogSnapshot, CatalogError> {
    let mut tables = BTreeMap::new();

    for schema in schemas {
        if !is_valid_ident(schema) {
            return Err(CatalogError::InvalidSchemaName(schema.clone()));
        }

        // Schema name is identifier-checked above, so interpolation is safe.
        let mut stmt = conn.prepare(&format!(
            "SELECT name, type FROM \"{schema}\".sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
             ORDER BY name"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (name, kind) = row?;
            let kind = match kind.as_str() {
                "view" => SourceKind::View,
                _ => SourceKind::Table,
            };
            let columns = introspect_columns(conn, schema, &name)?;
            tables.insert(
                (schema.clone(), name.clone()),
                TableInfo {
                    schema: schema.clone(),
                    name,
                    kind,
                    columns,
                },
            );
        }
    }

    debug!(tables = tables.len(), schemas = schemas.len(), "introspected warehouse");
    Ok(CatalogSnapshot { tables })
}

fn introspect_columns(
    conn: &Connection,
    schema: &str,
    table: &str,
) -> Result<Vec<ColumnInfo>, CatalogError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT name, type, \"notnull\" FROM pragma_table_info(?1, '{schema}') ORDER BY cid"
    ))?;
    let rows = stmt.query_map([table], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, bool>(2)?,
        ))
    })?;
    let mut columns = Vec::new();
    for row in rows {
        let (name, declared_type, not_null) = row?;
        columns.push(ColumnInfo {
            type_class: TypeClass::from_declared(&declared_type),
            name,
            declared_type,
            not_null,
        });
    }
    Ok(columns)
}

/// TTL cache wrapping [`introspect`].
pub struct SnapshotCache {
    ttl: Duration,
    state: Mutex<Option<(Instant, Arc<CatalogSnapshot>)>>,
}

impl SnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(None),
        }
    }

    /// Return the cached snapshot, re-introspecting when it has expired.
    pub fn get(
        &self,
        conn: &Connection,
        schemas: &[String],
    ) -> Result<Arc<CatalogSnapshot>, CatalogError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((built_at, snapshot)) = state.as_ref() {
            if built_at.elapsed() < self.ttl {
                return Ok(Arc::clone(snapshot));
            }
        }
        let snapshot = Arc::new(introspect(conn, schemas)?);
        *state = Some((Instant::now(), Arc::clone(&snapshot)));
        Ok(snapshot)
    }

    /// Drop the cached snapshot so the next read re-introspects.
    pub fn invalidate(&self) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
