//! Plan execution with a result cache for parameterless statements.
//!
//! Only plans without bound values are cached, keyed by their exact SQL
//! text; parameterized plans always hit the data source. The cache is
//! least-recently-used with a fixed capacity and is cleared by
//! [`SqlExecutor::invalidate`] whenever the data may have changed. A fetch
//! that started before an invalidation does not repopulate the cache.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::debug;

use hybrid_query_core::models::Row;
use hybrid_query_core::planner::SqlPlan;

use crate::catalog::DataSource;

/// Rows returned by one execution.
#[derive(Debug, Clone)]
pub struct Execution {
    pub rows: Vec<Row>,
    pub cache_hit: bool,
}

pub struct SqlExecutor {
    source: Arc<dyn DataSource>,
    cache: Mutex<LruCache<String, Vec<Row>>>,
    /// Bumped by every invalidation, under the cache lock.
    generation: AtomicU64,
}

impl SqlExecutor {
    /// A `capacity` of zero is raised to one.
    pub fn new(source: Arc<dyn DataSource>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            source,
            cache: Mutex::new(LruCache::new(capacity)),
            generation: AtomicU64::new(0),
        }
    }

    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    /// Run `plan`. Data source failures propagate.
    pub async fn execute(&self, plan: &SqlPlan) -> Result<Execution> {
        let (sql, params) = plan.positional();

        if plan.has_params() {
            let rows = self.source.fetch(&sql, &params).await?;
            return Ok(Execution {
                rows,
                cache_hit: false,
            });
        }

        if let Some(rows) = self.cache.lock().await.get(&sql) {
            debug!(sql = %sql, "sql cache hit");
            return Ok(Execution {
                rows: rows.clone(),
                cache_hit: true,
            });
        }

        let generation = self.generation.load(Ordering::Acquire);
        let rows = self.source.fetch(&sql, &params).await?;
        let mut cache = self.cache.lock().await;
        if self.generation.load(Ordering::Acquire) == generation {
            cache.put(sql, rows.clone());
        } else {
            debug!(sql = %sql, "cache invalidated during fetch; not caching");
        }
        drop(cache);
        Ok(Execution {
            rows,
            cache_hit: false,
        })
    }

    /// Drop every cached result.
    pub async fn invalidate(&self) {
        let mut cache = self.cache.lock().await;
        cache.clear();
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Number of cached statements.
    pub async fn cached(&self) -> usize {
        self.cache.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hybrid_query_core::models::{ColumnMeta, ForeignKeyMeta};
    use hybrid_query_core::planner::SqlValue;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct CountingSource {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl DataSource for CountingSource {
        async fn table_names(&self) -> Result<Vec<String>> {
            Ok(vec!["employees".to_string()])
        }
        async fn columns(&self, _table: &str) -> Result<Vec<ColumnMeta>> {
            Ok(Vec::new())
        }
        async fn foreign_keys(&self, _table: &str) -> Result<Vec<ForeignKeyMeta>> {
            Ok(Vec::new())
        }
        async fn sample_rows(&self, _table: &str, _limit: usize) -> Result<Vec<Row>> {
            Ok(Vec::new())
        }
        async fn fetch(&self, _sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let mut row = Row::new();
            row.insert("params".to_string(), serde_json::json!(params.len()));
            Ok(vec![row])
        }
    }

    /// Holds every fetch until released.
    #[derive(Default)]
    struct SlowSource {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl DataSource for SlowSource {
        async fn table_names(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn columns(&self, _table: &str) -> Result<Vec<ColumnMeta>> {
            Ok(Vec::new())
        }
        async fn foreign_keys(&self, _table: &str) -> Result<Vec<ForeignKeyMeta>> {
            Ok(Vec::new())
        }
        async fn sample_rows(&self, _table: &str, _limit: usize) -> Result<Vec<Row>> {
            Ok(Vec::new())
        }
        async fn fetch(&self, _sql: &str, _params: &[SqlValue]) -> Result<Vec<Row>> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(vec![Row::new()])
        }
    }

    fn plan(params: BTreeMap<String, SqlValue>) -> SqlPlan {
        SqlPlan {
            table: "employees".to_string(),
            columns: vec!["id".to_string(), "name".to_string()],
            predicates: params
                .keys()
                .map(|k| format!("salary > :{}", k))
                .collect(),
            params,
            limit: 200,
        }
    }

    #[tokio::test]
    async fn test_parameterless_plan_is_cached() {
        let source = Arc::new(CountingSource::default());
        let exec = SqlExecutor::new(source.clone(), 4);
        let p = plan(BTreeMap::new());

        let first = exec.execute(&p).await.unwrap();
        let second = exec.execute(&p).await.unwrap();
        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(first.rows, second.rows);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

        exec.invalidate().await;
        assert_eq!(exec.cached().await, 0);
        assert!(!exec.execute(&p).await.unwrap().cache_hit);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_parameterized_plan_bypasses_cache() {
        let source = Arc::new(CountingSource::default());
        let exec = SqlExecutor::new(source.clone(), 4);
        let mut params = BTreeMap::new();
        params.insert("salary_min".to_string(), SqlValue::Integer(70000));
        let p = plan(params);

        exec.execute(&p).await.unwrap();
        let again = exec.execute(&p).await.unwrap();
        assert!(!again.cache_hit);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(exec.cached().await, 0);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let source = Arc::new(CountingSource::default());
        let exec = SqlExecutor::new(source, 1);
        let mut a = plan(BTreeMap::new());
        let mut b = plan(BTreeMap::new());
        a.limit = 10;
        b.limit = 20;
        exec.execute(&a).await.unwrap();
        exec.execute(&b).await.unwrap();
        assert!(!exec.execute(&a).await.unwrap().cache_hit);
    }

    #[tokio::test]
    async fn test_fetch_overlapping_invalidate_is_not_cached() {
        let source = Arc::new(SlowSource::default());
        let exec = Arc::new(SqlExecutor::new(source.clone(), 4));
        let running = {
            let exec = exec.clone();
            tokio::spawn(async move { exec.execute(&plan(BTreeMap::new())).await })
        };

        source.entered.notified().await;
        exec.invalidate().await;
        source.release.notify_one();

        let result = running.await.unwrap().unwrap();
        assert!(!result.cache_hit);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(exec.cached().await, 0);
    }
}
