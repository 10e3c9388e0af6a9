//! Ingestion job status registry.
//!
//! Owned by one [`VectorStore`](crate::vector_store::VectorStore); statuses
//! live as long as the store does. A job id is registered once: after a job
//! is done its status is final.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use hybrid_query_core::models::IngestionJobStatus;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("ingestion job '{0}' already exists")]
    Duplicate(String),
}

/// A fresh job id for a batch submitted without one.
pub fn new_job_id() -> String {
    format!("job_{}", Uuid::new_v4().simple())
}

#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, IngestionJobStatus>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `job_id` for a batch of `total` files.
    ///
    /// # Errors
    ///
    /// [`JobError::Duplicate`] if the id was registered before, running or
    /// done. Its status is left untouched.
    pub async fn start(&self, job_id: &str, total: usize) -> Result<(), JobError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(job_id) {
            return Err(JobError::Duplicate(job_id.to_string()));
        }
        let status = IngestionJobStatus {
            job_id: job_id.to_string(),
            total,
            ..IngestionJobStatus::default()
        };
        jobs.insert(job_id.to_string(), status);
        Ok(())
    }

    /// Apply `f` to the job's counters. Unknown and finished ids are ignored.
    pub async fn update<F>(&self, job_id: &str, f: F)
    where
        F: FnOnce(&mut IngestionJobStatus),
    {
        if let Some(status) = self.jobs.write().await.get_mut(job_id) {
            if !status.done {
                f(status);
            }
        }
    }

    /// Mark the job done and return its final status.
    pub async fn finish(&self, job_id: &str) -> IngestionJobStatus {
        let mut jobs = self.jobs.write().await;
        let status = jobs
            .entry(job_id.to_string())
            .or_insert_with(|| IngestionJobStatus {
                job_id: job_id.to_string(),
                ..IngestionJobStatus::default()
            });
        status.done = true;
        status.clone()
    }

    /// Current status; all zeros and not done for an unknown id.
    pub async fn status(&self, job_id: &str) -> IngestionJobStatus {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .unwrap_or_else(|| IngestionJobStatus {
                job_id: job_id.to_string(),
                ..IngestionJobStatus::default()
            })
    }
}
