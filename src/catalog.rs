//! Relational data sources and schema analysis.
//!
//! [`DataSource`] is the seam between the engine and a database: table,
//! column and foreign-key introspection, row sampling, and parameterized
//! reads. [`SqliteSource`] implements it over a sqlx pool.
//!
//! [`SchemaCatalog::analyze`] turns a source into a [`SchemaSnapshot`]. It
//! never fails: each table's columns, foreign keys and sample rows are read
//! independently, and a failing step leaves that field empty. An
//! unreachable source or one with no tables yields an empty snapshot whose
//! status says why.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Column, Row as _, ValueRef};
use tracing::{debug, info, warn};

use hybrid_query_core::models::{
    ColumnMeta, ForeignKeyMeta, Row, SchemaSnapshot, TableMeta, SAMPLE_ROWS,
};
use hybrid_query_core::planner::{quote_ident, SqlValue};
use hybrid_query_core::schema_map::{map_terms_to_schema, SchemaCandidates};

use crate::db;

/// A relational source the engine can introspect and read from.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// User tables, in a stable order.
    async fn table_names(&self) -> Result<Vec<String>>;

    async fn columns(&self, table: &str) -> Result<Vec<ColumnMeta>>;

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyMeta>>;

    async fn sample_rows(&self, table: &str, limit: usize) -> Result<Vec<Row>>;

    /// Run a read statement with positional `?NNN` parameters.
    async fn fetch(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>>;
}

/// SQLite via a sqlx pool.
#[derive(Clone)]
pub struct SqliteSource {
    pool: SqlitePool,
}

impl SqliteSource {
    pub async fn connect(url: &str) -> Result<Self> {
        Ok(Self {
            pool: db::connect(url).await?,
        })
    }

    /// Parse `url` without connecting; failures surface on first use.
    pub fn connect_lazy(url: &str) -> Result<Self> {
        Ok(Self {
            pool: db::connect_lazy(url)?,
        })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl DataSource for SqliteSource {
    async fn table_names(&self) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list tables")?;
        Ok(names)
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnMeta>> {
        let rows = sqlx::query(
            "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to read columns of {}", table))?;

        rows.iter()
            .map(|row| -> Result<ColumnMeta> {
                let not_null: i64 = row.try_get("notnull")?;
                let pk: i64 = row.try_get("pk")?;
                Ok(ColumnMeta {
                    name: row.try_get("name")?,
                    data_type: row.try_get::<Option<String>, _>("type")?.unwrap_or_default(),
                    nullable: not_null == 0,
                    default: row.try_get::<Option<String>, _>("dflt_value").ok().flatten(),
                    primary_key: pk > 0,
                })
            })
            .collect()
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyMeta>> {
        let rows = sqlx::query(
            "SELECT \"from\", \"table\", \"to\" FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to read foreign keys of {}", table))?;

        rows.iter()
            .map(|row| -> Result<ForeignKeyMeta> {
                Ok(ForeignKeyMeta {
                    constrained_column: row.try_get("from")?,
                    referred_table: row.try_get("table")?,
                    referred_column: row.try_get::<Option<String>, _>("to")?,
                })
            })
            .collect()
    }

    async fn sample_rows(&self, table: &str, limit: usize) -> Result<Vec<Row>> {
        let sql = format!("SELECT * FROM {} LIMIT ?1", quote_ident(table));
        self.fetch(&sql, &[SqlValue::Integer(limit as i64)]).await
    }

    async fn fetch(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let mut query = sqlx::query(sql);
        for value in params {
            query = match value {
                SqlValue::Integer(v) => query.bind(*v),
                SqlValue::Real(v) => query.bind(*v),
                SqlValue::Text(v) => query.bind(v.clone()),
                SqlValue::Null => query.bind(None::<String>),
            };
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Query failed: {}", sql))?;
        Ok(rows.iter().map(row_to_json).collect())
    }
}

/// Convert a row to a JSON object, keeping each value's storage class.
///
/// BLOBs become base64 strings.
pub fn row_to_json(row: &SqliteRow) -> Row {
    let mut out = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        out.insert(column.name().to_string(), cell_to_json(row, i));
    }
    out
}

fn cell_to_json(row: &SqliteRow, i: usize) -> Value {
    match row.try_get_raw(i) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Err(_) => return Value::Null,
        Ok(_) => {}
    }
    if let Ok(v) = row.try_get::<i64, _>(i) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<f64, _>(i) {
        return serde_json::Number::from_f64(v)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<String, _>(i) {
        return Value::String(v);
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(i) {
        return Value::String(base64::engine::general_purpose::STANDARD.encode(v));
    }
    Value::Null
}

/// Schema analysis and term mapping.
pub struct SchemaCatalog;

impl SchemaCatalog {
    /// Connect to `url` and analyze it.
    ///
    /// A connection failure is reported in the snapshot, not returned.
    pub async fn analyze(url: &str) -> SchemaSnapshot {
        match SqliteSource::connect(url).await {
            Ok(source) => Self::analyze_source(&source).await,
            Err(e) => {
                warn!(url = %url, error = %format!("{:#}", e), "data source unavailable");
                SchemaSnapshot::unavailable(format!("{:#}", e))
            }
        }
    }

    /// Analyze an open source.
    pub async fn analyze_source(source: &dyn DataSource) -> SchemaSnapshot {
        let names = match source.table_names().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "table enumeration failed");
                return SchemaSnapshot::unavailable(format!("{:#}", e));
            }
        };

        if names.is_empty() {
            info!("data source has no tables");
            return SchemaSnapshot::empty("No tables found in database");
        }

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let columns = source.columns(&name).await.unwrap_or_else(|e| {
                warn!(table = %name, error = %e, "column introspection failed");
                Vec::new()
            });
            let foreign_keys = source.foreign_keys(&name).await.unwrap_or_else(|e| {
                warn!(table = %name, error = %e, "foreign key introspection failed");
                Vec::new()
            });
            let sample = source
                .sample_rows(&name, SAMPLE_ROWS)
                .await
                .unwrap_or_else(|e| {
                    warn!(table = %name, error = %e, "sampling failed");
                    Vec::new()
                });
            debug!(
                table = %name,
                columns = columns.len(),
                foreign_keys = foreign_keys.len(),
                sample = sample.len(),
                "analyzed table"
            );
            tables.push(TableMeta {
                name,
                columns,
                foreign_keys,
                sample,
            });
        }

        info!(tables = tables.len(), "schema analyzed");
        SchemaSnapshot::ready(tables)
    }

    /// Fuzzy-match query words to table and column names.
    pub fn map_terms(query: &str, snapshot: &SchemaSnapshot) -> SchemaCandidates {
        map_terms_to_schema(query, snapshot)
    }
}
