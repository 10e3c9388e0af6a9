//! Query routing across the SQL and document paths.
//!
//! [`HybridOrchestrator::process`] classifies a query, runs the SQL path
//! (plan, then execute through the cache) and/or the document path (vector
//! search), records the query in a bounded history, and always returns a
//! [`QueryEnvelope`]. Failures become [`QueryEnvelope::Error`] instead of
//! propagating.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use hybrid_query_core::classify::classify;
use hybrid_query_core::history::QueryHistory;
use hybrid_query_core::models::{
    IngestionJobStatus, QueryKind, QueryRecord, Row, SchemaSnapshot, SearchHit,
};
use hybrid_query_core::planner::{self, PlannerOptions, SqlPlan, SqlValue};
use hybrid_query_core::schema_map::SchemaCandidates;

use crate::catalog::{DataSource, SchemaCatalog, SqliteSource};
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::executor::SqlExecutor;
use crate::vector_store::VectorStore;

/// Timing and cache information for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryMetrics {
    /// Wall-clock seconds, rounded to milliseconds.
    pub time_seconds: f64,
    pub cache_hit: bool,
}

/// Result of [`HybridOrchestrator::process`], tagged by `status`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryEnvelope {
    Ok {
        query: String,
        kind: QueryKind,
        /// Executed statement with `:name` placeholders, if any.
        sql: Option<String>,
        params: BTreeMap<String, SqlValue>,
        /// `None` when the SQL path did not run.
        results: Option<Vec<Row>>,
        /// `None` when the document path did not run.
        documents: Option<Vec<SearchHit>>,
        metrics: QueryMetrics,
    },
    Error {
        query: String,
        kind: QueryKind,
        message: String,
        metrics: QueryMetrics,
    },
}

impl QueryEnvelope {
    pub fn is_ok(&self) -> bool {
        matches!(self, QueryEnvelope::Ok { .. })
    }

    pub fn kind(&self) -> QueryKind {
        match self {
            QueryEnvelope::Ok { kind, .. } | QueryEnvelope::Error { kind, .. } => *kind,
        }
    }

    pub fn metrics(&self) -> &QueryMetrics {
        match self {
            QueryEnvelope::Ok { metrics, .. } | QueryEnvelope::Error { metrics, .. } => metrics,
        }
    }
}

#[derive(Default)]
struct Answer {
    plan: Option<SqlPlan>,
    results: Option<Vec<Row>>,
    documents: Option<Vec<SearchHit>>,
    cache_hit: bool,
}

pub struct HybridOrchestrator {
    executor: SqlExecutor,
    store: Arc<VectorStore>,
    schema: RwLock<Arc<SchemaSnapshot>>,
    history: Mutex<QueryHistory>,
    planner: PlannerOptions,
    top_k: usize,
}

impl HybridOrchestrator {
    /// Wire up from explicit collaborators and analyze `source` once.
    pub async fn new(source: Arc<dyn DataSource>, store: Arc<VectorStore>, config: &Config) -> Self {
        let snapshot = SchemaCatalog::analyze_source(source.as_ref()).await;
        Self {
            executor: SqlExecutor::new(source, config.cache.sql_capacity),
            store,
            schema: RwLock::new(Arc::new(snapshot)),
            history: Mutex::new(QueryHistory::new(config.history.capacity)),
            planner: config.planner.options(),
            top_k: config.retrieval.top_k,
        }
    }

    /// Build everything the config describes.
    ///
    /// The database is connected lazily: an unreachable database shows up
    /// in the schema status and in per-query errors, not here.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let source: Arc<dyn DataSource> = Arc::new(SqliteSource::connect_lazy(&config.db.url)?);
        let embedder = create_embedder(&config.embedding)?;
        let store = Arc::new(VectorStore::new(
            config.index.dir.clone(),
            embedder,
            config.chunking.max_chars,
            config.retrieval.rank_params(),
        ));
        Ok(Self::new(source, store, config).await)
    }

    /// Answer `query`. Never fails; errors are reported in the envelope.
    pub async fn process(&self, query: &str) -> QueryEnvelope {
        let started = Instant::now();
        let kind = classify(query);
        debug!(query, kind = %kind, "classified query");

        let outcome = self.answer(query, kind).await;

        let elapsed = started.elapsed().as_secs_f64();
        self.history.lock().await.push(QueryRecord {
            query: query.to_string(),
            kind,
            elapsed_secs: elapsed,
            at: Utc::now(),
        });

        match outcome {
            Ok(answer) => {
                let (sql, params) = match answer.plan {
                    Some(plan) => (Some(plan.to_sql()), plan.params),
                    None => (None, BTreeMap::new()),
                };
                QueryEnvelope::Ok {
                    query: query.to_string(),
                    kind,
                    sql,
                    params,
                    results: answer.results,
                    documents: answer.documents,
                    metrics: QueryMetrics {
                        time_seconds: round_millis(elapsed),
                        cache_hit: answer.cache_hit,
                    },
                }
            }
            Err(e) => {
                warn!(query, error = %format!("{:#}", e), "query failed");
                QueryEnvelope::Error {
                    query: query.to_string(),
                    kind,
                    message: format!("{:#}", e),
                    metrics: QueryMetrics {
                        time_seconds: round_millis(elapsed),
                        cache_hit: false,
                    },
                }
            }
        }
    }

    async fn answer(&self, query: &str, kind: QueryKind) -> Result<Answer> {
        let mut answer = Answer::default();

        if kind.wants_sql() {
            let snapshot = self.schema().await;
            match planner::plan(query, &snapshot, &self.planner) {
                Some(plan) => {
                    let execution = self.executor.execute(&plan).await?;
                    answer.cache_hit = execution.cache_hit;
                    answer.results = Some(execution.rows);
                    answer.plan = Some(plan);
                }
                None => {
                    debug!("no table matched; empty structured result");
                    answer.results = Some(Vec::new());
                }
            }
        }

        if kind.wants_documents() {
            answer.documents = Some(self.store.search(query, self.top_k).await?);
        }

        Ok(answer)
    }

    /// The most recent queries, oldest first.
    pub async fn history(&self) -> Vec<QueryRecord> {
        self.history.lock().await.snapshot()
    }

    /// Current schema snapshot.
    pub async fn schema(&self) -> Arc<SchemaSnapshot> {
        Arc::clone(&*self.schema.read().await)
    }

    /// Re-analyze the data source, swap the snapshot and drop cached results.
    pub async fn refresh_schema(&self) -> Arc<SchemaSnapshot> {
        let snapshot = Arc::new(SchemaCatalog::analyze_source(self.executor.source().as_ref()).await);
        *self.schema.write().await = Arc::clone(&snapshot);
        self.executor.invalidate().await;
        info!(tables = snapshot.tables.len(), "schema refreshed");
        snapshot
    }

    pub async fn map_terms(&self, query: &str) -> SchemaCandidates {
        SchemaCatalog::map_terms(query, &*self.schema().await)
    }

    /// The plan `process` would execute for `query`, without running it.
    pub async fn plan(&self, query: &str) -> Option<SqlPlan> {
        planner::plan(query, &*self.schema().await, &self.planner)
    }

    /// Ingest documents, then refresh the schema and SQL cache.
    pub async fn ingest(
        &self,
        paths: &[PathBuf],
        job_id: Option<&str>,
    ) -> Result<IngestionJobStatus> {
        let status = self.store.ingest(paths, job_id).await?;
        self.refresh_schema().await;
        Ok(status)
    }

    pub async fn ingestion_status(&self, job_id: &str) -> IngestionJobStatus {
        self.store.status(job_id).await
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }
}

fn round_millis(secs: f64) -> f64 {
    (secs * 1000.0).round() / 1000.0
}
