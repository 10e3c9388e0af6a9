//! Core data models shared by the planner, the vector store, and the
//! orchestrator.
//!
//! Everything here is plain data: a schema snapshot is an owned,
//! point-in-time copy of the relational source, chunks are immutable once
//! built, and job/history records are simple value types that the
//! application layer stores behind its own locks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single result or sample row, keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Maximum number of sample rows captured per table.
pub const SAMPLE_ROWS: usize = 5;

/// Outcome of a schema analysis.
///
/// Analysis never fails outright; problems are reported through this tag
/// so callers can tell an empty database apart from an unreachable one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SchemaStatus {
    /// At least one table was discovered.
    Ready,
    /// The source was reachable but exposes no tables.
    Empty { reason: String },
    /// The source could not be reached or enumerated.
    Unavailable { reason: String },
}

/// Column description from introspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    /// Declared type as reported by the source (may be empty in SQLite).
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    #[serde(default)]
    pub primary_key: bool,
}

/// A foreign-key edge from a column of this table to another table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyMeta {
    pub constrained_column: String,
    pub referred_table: String,
    /// `None` when the source refers implicitly to the primary key.
    pub referred_column: Option<String>,
}

/// Everything known about one table at snapshot time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMeta {
    pub name: String,
    pub columns: Vec<ColumnMeta>,
    pub foreign_keys: Vec<ForeignKeyMeta>,
    /// At most [`SAMPLE_ROWS`] rows.
    pub sample: Vec<Row>,
}

impl TableMeta {
    /// Column names in declaration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Point-in-time description of a relational source.
///
/// Tables are kept in discovery order; that order is the tie-breaker for
/// table selection in the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub tables: Vec<TableMeta>,
    pub status: SchemaStatus,
    pub analyzed_at: DateTime<Utc>,
}

impl SchemaSnapshot {
    /// Build a ready snapshot from discovered tables.
    pub fn ready(tables: Vec<TableMeta>) -> Self {
        Self {
            tables,
            status: SchemaStatus::Ready,
            analyzed_at: Utc::now(),
        }
    }

    /// An empty snapshot for a reachable source with no tables.
    pub fn empty(reason: impl Into<String>) -> Self {
        Self {
            tables: Vec::new(),
            status: SchemaStatus::Empty {
                reason: reason.into(),
            },
            analyzed_at: Utc::now(),
        }
    }

    /// An empty snapshot annotated with a connection or enumeration failure.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            tables: Vec::new(),
            status: SchemaStatus::Unavailable {
                reason: reason.into(),
            },
            analyzed_at: Utc::now(),
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableMeta> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// The failure or emptiness reason, if any.
    pub fn error(&self) -> Option<&str> {
        match &self.status {
            SchemaStatus::Ready => None,
            SchemaStatus::Empty { reason } | SchemaStatus::Unavailable { reason } => Some(reason),
        }
    }
}

/// A stored span of document text.
///
/// `chunk_id` is deterministic: `<source>_chunk_<index>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub source: String,
    pub chunk_id: String,
    pub text: String,
}

/// A ranked vector-search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub source: String,
    pub text: String,
    /// `vector_score + lexical_weight * lexical_score`.
    pub score: f32,
    pub vector_score: f32,
    pub lexical_score: f32,
}

/// Routing decision for a natural-language query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Structured,
    Unstructured,
    Hybrid,
}

impl QueryKind {
    /// Whether the SQL path runs for this kind.
    pub fn wants_sql(self) -> bool {
        matches!(self, QueryKind::Structured | QueryKind::Hybrid)
    }

    /// Whether the vector path runs for this kind.
    pub fn wants_documents(self) -> bool {
        matches!(self, QueryKind::Unstructured | QueryKind::Hybrid)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueryKind::Structured => "structured",
            QueryKind::Unstructured => "unstructured",
            QueryKind::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for QueryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One processed query, as kept in the bounded history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub query: String,
    pub kind: QueryKind,
    pub elapsed_secs: f64,
    pub at: DateTime<Utc>,
}

/// Progress counters for one ingestion batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionJobStatus {
    pub job_id: String,
    pub total: usize,
    pub processed: usize,
    pub vectors: usize,
    pub errors: usize,
    pub done: bool,
}
