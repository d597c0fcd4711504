//! SQLite-backed metadata store.
//!
//! Holds the report catalog and every dependency-graph row the compiler
//! reads. Graphs are authored out-of-band and become active through
//! [`MetadataStore::publish_graph`], which swaps the active row set in one
//! transaction; the request path only ever calls
//! [`MetadataStore::load_active_graph`] and gets an immutable snapshot.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::model::{
    AggregateFn, DataType, ExprKind, FilterBinding, FilterOp, GraphIntegrityError, JoinNode,
    JoinPredicate, JoinType, NewReport, OutputField, PredicateOp, Report, ReportGraph, ReportId,
    SortDirection, SortKey, SourceKind, SourceNode, SourceRole, ValueTransform,
};

/// Current metadata schema version. Bump when the layout changes.
const SCHEMA_VERSION: i32 = 1;

/// Errors from metadata store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("report not found: {0}")]
    ReportNotFound(String),

    #[error("route already registered: {0}")]
    DuplicateRoute(String),

    #[error("report misconfigured: {0}")]
    Integrity(#[from] GraphIntegrityError),

    #[error("invalid timestamp in store: {0}")]
    BadTimestamp(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One active (report, source) pair, the raw material of the lineage index.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyRow {
    pub report_id: ReportId,
    pub route: String,
    pub title: String,
    pub alias: String,
    pub schema: String,
    pub table: String,
    pub kind: SourceKind,
}

/// SQLite-backed metadata store.
pub struct MetadataStore {
    conn: Connection,
}

impl MetadataStore {
    /// Open or create the metadata database at `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// Direct access to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn init(&self) -> StoreResult<()> {
        self.conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS reports (
                id          TEXT PRIMARY KEY,
                route       TEXT NOT NULL UNIQUE,
                title       TEXT NOT NULL,
                category    TEXT NOT NULL,
                description TEXT,
                is_active   INTEGER NOT NULL DEFAULT 1,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS source_nodes (
                id            INTEGER PRIMARY KEY,
                report_id     TEXT NOT NULL REFERENCES reports(id) ON DELETE CASCADE,
                alias         TEXT NOT NULL,
                schema_name   TEXT NOT NULL,
                table_name    TEXT NOT NULL,
                source_kind   TEXT NOT NULL,
                role          TEXT NOT NULL,
                join_type     TEXT,
                join_to_alias TEXT,
                join_priority INTEGER NOT NULL DEFAULT 0,
                declare_order INTEGER NOT NULL DEFAULT 0,
                is_active     INTEGER NOT NULL DEFAULT 1,
                updated_at    TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_source_nodes_report
                ON source_nodes(report_id, is_active);

            CREATE TABLE IF NOT EXISTS join_predicates (
                id              INTEGER PRIMARY KEY,
                source_node_id  INTEGER NOT NULL REFERENCES source_nodes(id) ON DELETE CASCADE,
                left_alias      TEXT NOT NULL,
                left_column     TEXT NOT NULL,
                op              TEXT NOT NULL,
                right_alias     TEXT NOT NULL,
                right_column    TEXT NOT NULL,
                predicate_order INTEGER NOT NULL DEFAULT 0,
                is_active       INTEGER NOT NULL DEFAULT 1,
                updated_at      TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS output_fields (
                id            INTEGER PRIMARY KEY,
                report_id     TEXT NOT NULL REFERENCES reports(id) ON DELETE CASCADE,
                source_alias  TEXT NOT NULL,
                source_column TEXT NOT NULL,
                output_key    TEXT NOT NULL,
                label         TEXT NOT NULL,
                data_type     TEXT NOT NULL,
                expr_kind     TEXT NOT NULL,
                aggregate_fn  TEXT,
                output_order  INTEGER NOT NULL DEFAULT 0,
                sortable      INTEGER NOT NULL DEFAULT 1,
                filterable    INTEGER NOT NULL DEFAULT 1,
                is_active     INTEGER NOT NULL DEFAULT 1,
                updated_at    TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS filter_bindings (
                id              INTEGER PRIMARY KEY,
                report_id       TEXT NOT NULL REFERENCES reports(id) ON DELETE CASCADE,
                filter_code     TEXT NOT NULL,
                source_alias    TEXT NOT NULL,
                source_column   TEXT NOT NULL,
                op              TEXT NOT NULL,
                value_transform TEXT NOT NULL,
                predicate_order INTEGER NOT NULL DEFAULT 0,
                is_active       INTEGER NOT NULL DEFAULT 1,
                updated_at      TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS grouping_keys (
                id          INTEGER PRIMARY KEY,
                report_id   TEXT NOT NULL REFERENCES reports(id) ON DELETE CASCADE,
                output_key  TEXT NOT NULL,
                group_order INTEGER NOT NULL DEFAULT 0,
                is_active   INTEGER NOT NULL DEFAULT 1,
                updated_at  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sorting_keys (
                id         INTEGER PRIMARY KEY,
                report_id  TEXT NOT NULL REFERENCES reports(id) ON DELETE CASCADE,
                output_key TEXT NOT NULL,
                direction  TEXT NOT NULL,
                sort_order INTEGER NOT NULL DEFAULT 0,
                is_active  INTEGER NOT NULL DEFAULT 1,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS meta (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;

        self.conn.execute(
            "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )?;
        Ok(())
    }

    // =========================================================================
    // Report catalog
    // =========================================================================

    /// Register a new report identity.
    pub fn create_report(&self, new: NewReport) -> StoreResult<Report> {
        let now = Utc::now();
        let report = Report {
            id: ReportId::new(),
            route: new.route,
            title: new.title,
            category: new.category,
            description: new.description,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let result = self.conn.execute(
            "INSERT INTO reports (id, route, title, category, description, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7)",
            params![
                report.id.as_str(),
                report.route,
                report.title,
                report.category,
                report.description,
                report.created_at.to_rfc3339(),
                report.updated_at.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => {
                info!(route = %report.route, id = %report.id, "registered report");
                Ok(report)
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateRoute(report.route))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve an active report by its route slug.
    pub fn report_by_route(&self, route: &str) -> StoreResult<Report> {
        self.conn
            .query_row(
                "SELECT id, route, title, category, description, is_active, created_at, updated_at
                 FROM reports WHERE route = ?1 AND is_active = 1",
                params![route],
                row_to_report,
            )
            .optional()?
            .transpose()?
            .ok_or_else(|| StoreError::ReportNotFound(route.to_string()))
    }

    /// Look up a report by id, active or not.
    pub fn report_by_id(&self, id: &ReportId) -> StoreResult<Report> {
        self.conn
            .query_row(
                "SELECT id, route, title, category, description, is_active, created_at, updated_at
                 FROM reports WHERE id = ?1",
                params![id.as_str()],
                row_to_report,
            )
            .optional()?
            .transpose()?
            .ok_or_else(|| StoreError::ReportNotFound(id.to_string()))
    }

    /// Active reports, optionally narrowed to a category, ordered by route.
    pub fn list_reports(&self, category: Option<&str>) -> StoreResult<Vec<Report>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, route, title, category, description, is_active, created_at, updated_at
             FROM reports
             WHERE is_active = 1 AND (?1 IS NULL OR category = ?1)
             ORDER BY route",
        )?;
        let rows = stmt.query_map(params![category], row_to_report)?;
        let mut reports = Vec::new();
        for row in rows {
            reports.push(row??);
        }
        Ok(reports)
    }

    /// Flip a report's active flag, re-stamping its update timestamp.
    pub fn set_report_active(&self, id: &ReportId, active: bool) -> StoreResult<()> {
        let n = self.conn.execute(
            "UPDATE reports SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.as_str(), active as i64, Utc::now().to_rfc3339()],
        )?;
        if n == 0 {
            return Err(StoreError::ReportNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Delete a report; graph rows cascade.
    pub fn delete_report(&self, id: &ReportId) -> StoreResult<()> {
        let n = self
            .conn
            .execute("DELETE FROM reports WHERE id = ?1", params![id.as_str()])?;
        if n == 0 {
            return Err(StoreError::ReportNotFound(id.to_string()));
        }
        Ok(())
    }

    // =========================================================================
    // Graph publish / load
    // =========================================================================

    /// Atomically replace a report's active graph.
    ///
    /// Deactivates the previous active rows and inserts the new graph in one
    /// transaction, so readers see either the old graph or the new one, never
    /// a mix. Returns the published graph's content version.
    pub fn publish_graph(&mut self, graph: &ReportGraph) -> StoreResult<String> {
        graph.check_integrity()?;
        // Integrity does not cover existence; confirm the report row is there.
        self.report_by_id(&graph.report_id)?;

        let now = Utc::now().to_rfc3339();
        let report_id = graph.report_id.as_str();
        let tx = self.conn.transaction()?;

        for table in [
            "source_nodes",
            "output_fields",
            "filter_bindings",
            "grouping_keys",
            "sorting_keys",
        ] {
            tx.execute(
                &format!(
                    "UPDATE {table} SET is_active = 0, updated_at = ?2 \
                     WHERE report_id = ?1 AND is_active = 1"
                ),
                params![report_id, now],
            )?;
        }
        tx.execute(
            "UPDATE join_predicates SET is_active = 0, updated_at = ?2
             WHERE is_active = 1 AND source_node_id IN
                 (SELECT id FROM source_nodes WHERE report_id = ?1)",
            params![report_id, now],
        )?;

        let insert_node = |node: &SourceNode,
                           role: SourceRole,
                           join: Option<&JoinNode>,
                           declare_order: i64|
         -> rusqlite::Result<i64> {
            tx.execute(
                "INSERT INTO source_nodes
                     (report_id, alias, schema_name, table_name, source_kind, role,
                      join_type, join_to_alias, join_priority, declare_order, is_active, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1, ?11)",
                params![
                    report_id,
                    node.alias,
                    node.schema,
                    node.table,
                    node.kind.as_str(),
                    role.as_str(),
                    join.map(|j| j.join_type.as_str()),
                    join.map(|j| j.attach_to.as_str()),
                    join.map(|j| j.priority as i64).unwrap_or(0),
                    declare_order,
                    now,
                ],
            )?;
            Ok(tx.last_insert_rowid())
        };

        insert_node(&graph.base, SourceRole::Base, None, 0)?;
        for (i, join) in graph.joins.iter().enumerate() {
            let node_id = insert_node(&join.source, SourceRole::Join, Some(join), i as i64 + 1)?;
            for (j, pred) in join.predicates.iter().enumerate() {
                tx.execute(
                    "INSERT INTO join_predicates
                         (source_node_id, left_alias, left_column, op, right_alias, right_column,
                          predicate_order, is_active, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8)",
                    params![
                        node_id,
                        pred.left_alias,
                        pred.left_column,
                        pred.op.as_str(),
                        pred.right_alias,
                        pred.right_column,
                        j as i64,
                        now,
                    ],
                )?;
            }
        }

        for field in &graph.fields {
            tx.execute(
                "INSERT INTO output_fields
                     (report_id, source_alias, source_column, output_key, label, data_type,
                      expr_kind, aggregate_fn, output_order, sortable, filterable, is_active, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 1, ?12)",
                params![
                    report_id,
                    field.source_alias,
                    field.source_column,
                    field.output_key,
                    field.label,
                    field.data_type.as_str(),
                    field.expr_kind.as_str(),
                    field.aggregate_fn.map(|f| f.as_str()),
                    field.output_order as i64,
                    field.sortable as i64,
                    field.filterable as i64,
                    now,
                ],
            )?;
        }

        for binding in &graph.filters {
            tx.execute(
                "INSERT INTO filter_bindings
                     (report_id, filter_code, source_alias, source_column, op, value_transform,
                      predicate_order, is_active, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8)",
                params![
                    report_id,
                    binding.filter_code,
                    binding.source_alias,
                    binding.source_column,
                    binding.op.as_str(),
                    binding.transform.as_str(),
                    binding.predicate_order as i64,
                    now,
                ],
            )?;
        }

        for (i, key) in graph.grouping.iter().enumerate() {
            tx.execute(
                "INSERT INTO grouping_keys (report_id, output_key, group_order, is_active, updated_at)
                 VALUES (?1, ?2, ?3, 1, ?4)",
                params![report_id, key, i as i64, now],
            )?;
        }

        for (i, key) in graph.sorting.iter().enumerate() {
            tx.execute(
                "INSERT INTO sorting_keys (report_id, output_key, direction, sort_order, is_active, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5)",
                params![
                    report_id,
                    key.output_key,
                    key.direction.as_str(),
                    i as i64,
                    now,
                ],
            )?;
        }

        tx.execute(
            "UPDATE reports SET updated_at = ?2 WHERE id = ?1",
            params![report_id, now],
        )?;
        tx.commit()?;

        let version = graph.content_version();
        info!(report_id, version = %version, "published report graph");
        Ok(version)
    }

    /// Load the active dependency graph for a report as an immutable snapshot.
    ///
    /// Fails closed: zero or multiple active base nodes, or any row whose
    /// stored vocabulary no longer parses, raises a [`GraphIntegrityError`]
    /// rather than silently picking a graph.
    pub fn load_active_graph(&self, id: &ReportId) -> StoreResult<ReportGraph> {
        self.report_by_id(id)?;
        let report_id = id.as_str();

        struct NodeRow {
            db_id: i64,
            node: SourceNode,
            role: SourceRole,
            join_type: Option<String>,
            join_to_alias: Option<String>,
            join_priority: u32,
        }

        let mut stmt = self.conn.prepare(
            "SELECT id, alias, schema_name, table_name, source_kind, role,
                    join_type, join_to_alias, join_priority
             FROM source_nodes
             WHERE report_id = ?1 AND is_active = 1
             ORDER BY declare_order, id",
        )?;
        let node_rows = stmt.query_map(params![report_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, i64>(8)?,
            ))
        })?;

        let mut nodes = Vec::new();
        for row in node_rows {
            let (db_id, alias, schema, table, kind, role, join_type, join_to_alias, priority) =
                row?;
            nodes.push(NodeRow {
                db_id,
                node: SourceNode {
                    alias,
                    schema,
                    table,
                    kind: vocab("source_kind", &kind, SourceKind::parse)?,
                },
                role: vocab("role", &role, SourceRole::parse)?,
                join_type,
                join_to_alias,
                join_priority: priority as u32,
            });
        }

        let base_count = nodes.iter().filter(|n| n.role == SourceRole::Base).count();
        match base_count {
            1 => {}
            0 => {
                return Err(GraphIntegrityError::NoBaseNode {
                    report_id: id.clone(),
                }
                .into())
            }
            count => {
                return Err(GraphIntegrityError::MultipleBaseNodes {
                    report_id: id.clone(),
                    count,
                }
                .into())
            }
        }

        let mut base = None;
        let mut joins = Vec::new();
        for row in nodes {
            match row.role {
                SourceRole::Base => base = Some(row.node),
                SourceRole::Join => {
                    let join_type = row.join_type.unwrap_or_default();
                    let attach_to = row.join_to_alias.unwrap_or_default();
                    joins.push(JoinNode {
                        join_type: vocab("join_type", &join_type, JoinType::parse)?,
                        attach_to,
                        priority: row.join_priority,
                        predicates: self.load_predicates(row.db_id)?,
                        source: row.node,
                    });
                }
            }
        }
        let base = base.ok_or(GraphIntegrityError::NoBaseNode {
            report_id: id.clone(),
        })?;

        let graph = ReportGraph {
            report_id: id.clone(),
            base,
            joins,
            fields: self.load_fields(report_id)?,
            filters: self.load_filters(report_id)?,
            grouping: self.load_grouping(report_id)?,
            sorting: self.load_sorting(report_id)?,
        };
        graph.check_integrity()?;

        debug!(
            report_id,
            version = %graph.content_version(),
            joins = graph.joins.len(),
            fields = graph.fields.len(),
            "loaded active graph"
        );
        Ok(graph)
    }

    fn load_predicates(&self, source_node_id: i64) -> StoreResult<Vec<JoinPredicate>> {
        let mut stmt = self.conn.prepare(
            "SELECT left_alias, left_column, op, right_alias, right_column
             FROM join_predicates
             WHERE source_node_id = ?1 AND is_active = 1
             ORDER BY predicate_order, id",
        )?;
        let rows = stmt.query_map(params![source_node_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut predicates = Vec::new();
        for row in rows {
            let (left_alias, left_column, op, right_alias, right_column) = row?;
            predicates.push(JoinPredicate {
                left_alias,
                left_column,
                op: vocab("predicate_op", &op, PredicateOp::parse)?,
                right_alias,
                right_column,
            });
        }
        Ok(predicates)
    }

    fn load_fields(&self, report_id: &str) -> StoreResult<Vec<OutputField>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_alias, source_column, output_key, label, data_type, expr_kind,
                    aggregate_fn, output_order, sortable, filterable
             FROM output_fields
             WHERE report_id = ?1 AND is_active = 1
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![report_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, i64>(7)?,
                row.get::<_, bool>(8)?,
                row.get::<_, bool>(9)?,
            ))
        })?;
        let mut fields = Vec::new();
        for row in rows {
            let (alias, column, key, label, data_type, expr_kind, agg, order, sortable, filterable) =
                row?;
            fields.push(OutputField {
                source_alias: alias,
                source_column: column,
                output_key: key,
                label,
                data_type: vocab("data_type", &data_type, DataType::parse)?,
                expr_kind: vocab("expr_kind", &expr_kind, ExprKind::parse)?,
                aggregate_fn: agg
                    .map(|a| vocab("aggregate_fn", &a, AggregateFn::parse))
                    .transpose()?,
                output_order: order as u32,
                sortable,
                filterable,
            });
        }
        Ok(fields)
    }

    fn load_filters(&self, report_id: &str) -> StoreResult<Vec<FilterBinding>> {
        let mut stmt = self.conn.prepare(
            "SELECT filter_code, source_alias, source_column, op, value_transform, predicate_order
             FROM filter_bindings
             WHERE report_id = ?1 AND is_active = 1
             ORDER BY predicate_order, id",
        )?;
        let rows = stmt.query_map(params![report_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;
        let mut filters = Vec::new();
        for row in rows {
            let (code, alias, column, op, transform, order) = row?;
            filters.push(FilterBinding {
                filter_code: code,
                source_alias: alias,
                source_column: column,
                op: vocab("filter_op", &op, FilterOp::parse)?,
                transform: vocab("value_transform", &transform, ValueTransform::parse)?,
                predicate_order: order as u32,
            });
        }
        Ok(filters)
    }

    fn load_grouping(&self, report_id: &str) -> StoreResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT output_key FROM grouping_keys
             WHERE report_id = ?1 AND is_active = 1
             ORDER BY group_order, id",
        )?;
        let rows = stmt.query_map(params![report_id], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn load_sorting(&self, report_id: &str) -> StoreResult<Vec<SortKey>> {
        let mut stmt = self.conn.prepare(
            "SELECT output_key, direction FROM sorting_keys
             WHERE report_id = ?1 AND is_active = 1
             ORDER BY sort_order, id",
        )?;
        let rows = stmt.query_map(params![report_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut sorting = Vec::new();
        for row in rows {
            let (key, direction) = row?;
            sorting.push(SortKey {
                output_key: key,
                direction: vocab("sort_direction", &direction, SortDirection::parse)?,
            });
        }
        Ok(sorting)
    }

    // =========================================================================
    // Lineage rows
    // =========================================================================

    /// All active (report, source) pairs across active reports, by route.
    pub fn active_dependencies(&self) -> StoreResult<Vec<DependencyRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.id, r.route, r.title, n.alias, n.schema_name, n.table_name, n.source_kind
             FROM source_nodes n
             JOIN reports r ON r.id = n.report_id
             WHERE n.is_active = 1 AND r.is_active = 1
             ORDER BY r.route, n.declare_order, n.id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;
        let mut deps = Vec::new();
        for row in rows {
            let (id, route, title, alias, schema, table, kind) = row?;
            deps.push(DependencyRow {
                report_id: ReportId::from(id),
                route,
                title,
                alias,
                schema,
                table,
                kind: vocab("source_kind", &kind, SourceKind::parse)?,
            });
        }
        Ok(deps)
    }
}

fn vocab<T>(
    vocabulary: &str,
    value: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, GraphIntegrityError> {
    parse(value).ok_or_else(|| GraphIntegrityError::UnknownVocabulary {
        vocabulary: vocabulary.to_string(),
        value: value.to_string(),
    })
}

fn row_to_report(row: &Row<'_>) -> rusqlite::Result<StoreResult<Report>> {
    let id: String = row.get(0)?;
    let route: String = row.get(1)?;
    let title: String = row.get(2)?;
    let category: String = row.get(3)?;
    let description: Option<String> = row.get(4)?;
    let is_active: bool = row.get(5)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;

    Ok((|| {
        Ok(Report {
            id: ReportId::from(id),
            route,
            title,
            category,
            description,
            is_active,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    })())
}

fn parse_timestamp(s: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| StoreError::BadTimestamp(s.to_string()))
}
