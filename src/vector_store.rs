//! Document vector store: ingestion, persistence and hybrid search.
//!
//! Holds one [`FlatIndex`] and its positional chunk metadata behind a single
//! `RwLock`, so a search never sees a half-applied ingestion. Whole
//! ingestion batches are serialised by a separate mutex.
//!
//! # Ingestion
//!
//! Each file is extracted, chunked and embedded on its own. A failure on one
//! file is counted in the job's `errors` and the batch moves on, except for
//! fatal embedding errors (see [`EmbedError::is_fatal`]), which stop the
//! batch without persisting anything and are returned to the caller.
//!
//! Vectors from the batch are appended to the index only after every file
//! has been seen. If the stored index has a different dimension, it is
//! discarded together with all prior metadata and rebuilt at the new
//! dimension. The updated pair is persisted before it replaces the
//! in-memory state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use hybrid_query_core::chunk::make_chunks;
use hybrid_query_core::embedding::{embed_normalized, embed_query, EmbedError, Embedder};
use hybrid_query_core::index::FlatIndex;
use hybrid_query_core::models::{Chunk, IngestionJobStatus, SearchHit};
use hybrid_query_core::search::{rank, RankParams};

use crate::extract::extract_file;
use crate::jobs::{new_job_id, JobRegistry};
use crate::persist;

#[derive(Debug, Default)]
struct IndexState {
    index: Option<FlatIndex>,
    metadata: Vec<Chunk>,
    /// Whether the persisted pair has been looked for yet.
    loaded: bool,
}

/// Outcome of processing one file.
enum FileOutcome {
    Embedded(Vec<Chunk>, Vec<Vec<f32>>),
    Failed(String),
}

pub struct VectorStore {
    dir: PathBuf,
    embedder: Arc<dyn Embedder>,
    max_chars: usize,
    rank_params: RankParams,
    state: RwLock<IndexState>,
    ingest_lock: Mutex<()>,
    jobs: JobRegistry,
}

impl VectorStore {
    pub fn new(
        dir: impl Into<PathBuf>,
        embedder: Arc<dyn Embedder>,
        max_chars: usize,
        rank_params: RankParams,
    ) -> Self {
        Self {
            dir: dir.into(),
            embedder,
            max_chars,
            rank_params,
            state: RwLock::new(IndexState::default()),
            ingest_lock: Mutex::new(()),
            jobs: JobRegistry::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Ingest `paths` under `job_id` and return the final job status.
    ///
    /// Without a `job_id` a fresh one is generated; it comes back in the
    /// status.
    ///
    /// # Errors
    ///
    /// A job id already used on this store, a fatal embedding error, a
    /// failure to persist the index, or a corrupt persisted index that
    /// cannot be loaded to append to.
    pub async fn ingest(
        &self,
        paths: &[PathBuf],
        job_id: Option<&str>,
    ) -> Result<IngestionJobStatus> {
        let _batch = self.ingest_lock.lock().await;
        let job_id = job_id.map_or_else(new_job_id, str::to_string);
        let job_id = job_id.as_str();
        self.jobs.start(job_id, paths.len()).await?;
        info!(job_id, files = paths.len(), "ingestion started");

        if let Err(e) = self.ensure_loaded().await {
            self.jobs.finish(job_id).await;
            return Err(e);
        }

        let mut new_chunks: Vec<Chunk> = Vec::new();
        let mut new_vectors: Vec<Vec<f32>> = Vec::new();

        for path in paths {
            let batch_dims = new_vectors.first().map(Vec::len);
            let outcome = match self.process_file(path, batch_dims).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "embedding failed; aborting batch");
                    self.jobs
                        .update(job_id, |s| {
                            s.processed += 1;
                            s.errors += 1;
                        })
                        .await;
                    self.jobs.finish(job_id).await;
                    return Err(anyhow::Error::new(e)
                        .context(format!("Failed to embed {}", path.display())));
                }
            };

            match outcome {
                FileOutcome::Embedded(chunks, vectors) => {
                    let count = vectors.len();
                    new_chunks.extend(chunks);
                    new_vectors.extend(vectors);
                    self.jobs
                        .update(job_id, |s| {
                            s.processed += 1;
                            s.vectors += count;
                        })
                        .await;
                    debug!(path = %path.display(), vectors = count, "file embedded");
                }
                FileOutcome::Failed(reason) => {
                    warn!(path = %path.display(), reason = %reason, "skipping file");
                    self.jobs
                        .update(job_id, |s| {
                            s.processed += 1;
                            s.errors += 1;
                        })
                        .await;
                }
            }
        }

        if !new_vectors.is_empty() {
            if let Err(e) = self.commit(new_chunks, new_vectors).await {
                self.jobs.finish(job_id).await;
                return Err(e);
            }
        }

        let status = self.jobs.finish(job_id).await;
        info!(
            job_id,
            processed = status.processed,
            vectors = status.vectors,
            errors = status.errors,
            "ingestion finished"
        );
        Ok(status)
    }

    /// Extract, chunk and embed one file.
    ///
    /// Only fatal embedding errors come back as `Err`; everything else is a
    /// [`FileOutcome::Failed`].
    async fn process_file(
        &self,
        path: &Path,
        batch_dims: Option<usize>,
    ) -> Result<FileOutcome, EmbedError> {
        let owned = path.to_path_buf();
        let text = match tokio::task::spawn_blocking(move || extract_file(&owned)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Ok(FileOutcome::Failed(e.to_string())),
            Err(e) => return Ok(FileOutcome::Failed(format!("extraction task failed: {}", e))),
        };
        if text.trim().is_empty() {
            return Ok(FileOutcome::Failed("no text extracted".to_string()));
        }

        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let chunks = make_chunks(&source, &text, self.max_chars);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

        let vectors = match embed_normalized(self.embedder.as_ref(), &texts).await {
            Ok(vectors) => vectors,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => return Ok(FileOutcome::Failed(e.to_string())),
        };

        if let (Some(expected), Some(first)) = (batch_dims, vectors.first()) {
            if first.len() != expected {
                return Ok(FileOutcome::Failed(format!(
                    "embedding dimension {} differs from batch dimension {}",
                    first.len(),
                    expected
                )));
            }
        }
        Ok(FileOutcome::Embedded(chunks, vectors))
    }

    /// Append a batch to the index, persist, then publish.
    async fn commit(&self, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<()> {
        let dims = vectors[0].len();
        let mut state = self.state.write().await;

        let (mut index, mut metadata) = match &state.index {
            Some(existing) if existing.dims() == dims => (existing.clone(), state.metadata.clone()),
            Some(existing) => {
                warn!(
                    old_dims = existing.dims(),
                    new_dims = dims,
                    discarded = existing.len(),
                    "embedding dimension changed; rebuilding index without prior documents"
                );
                (FlatIndex::new(dims)?, Vec::new())
            }
            None => (FlatIndex::new(dims)?, Vec::new()),
        };
        index.add(&vectors)?;
        metadata.extend(chunks);

        persist::save(&self.dir, &index, &metadata)
            .with_context(|| format!("Failed to persist index to {}", self.dir.display()))?;

        state.index = Some(index);
        state.metadata = metadata;
        state.loaded = true;
        Ok(())
    }

    /// Load the persisted pair once, if present.
    async fn ensure_loaded(&self) -> Result<()> {
        if self.state.read().await.loaded {
            return Ok(());
        }
        let mut state = self.state.write().await;
        if state.loaded {
            return Ok(());
        }
        let loaded = persist::load(&self.dir)
            .with_context(|| format!("Failed to load index from {}", self.dir.display()))?;
        if let Some((index, metadata)) = loaded {
            info!(vectors = index.len(), dir = %self.dir.display(), "loaded persisted index");
            state.index = Some(index);
            state.metadata = metadata;
        }
        state.loaded = true;
        Ok(())
    }

    /// Rank stored chunks against `query`. Empty when no index exists.
    ///
    /// The query is embedded before the state lock is taken, so a slow
    /// embedding call never holds up a commit.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        self.ensure_loaded().await?;
        if !self.has_vectors().await {
            return Ok(Vec::new());
        }

        let query_vec = embed_query(self.embedder.as_ref(), query)
            .await
            .context("Failed to embed query")?;

        let state = self.state.read().await;
        let index = match &state.index {
            Some(index) if !index.is_empty() => index,
            _ => return Ok(Vec::new()),
        };
        if query_vec.len() != index.dims() {
            anyhow::bail!(
                "query embedding dimension {} does not match index dimension {}",
                query_vec.len(),
                index.dims()
            );
        }

        let params = self.rank_params.clone().with_top_k(top_k);
        Ok(rank(index, &state.metadata, query, &query_vec, &params))
    }

    async fn has_vectors(&self) -> bool {
        matches!(&self.state.read().await.index, Some(index) if !index.is_empty())
    }

    /// Status of `job_id`; zeros when unknown.
    pub async fn status(&self, job_id: &str) -> IngestionJobStatus {
        self.jobs.status(job_id).await
    }

    /// Number of stored chunks.
    pub async fn len(&self) -> Result<usize> {
        self.ensure_loaded().await?;
        Ok(self.state.read().await.metadata.len())
    }

    /// Copy of the stored chunk metadata, in index order.
    pub async fn metadata(&self) -> Result<Vec<Chunk>> {
        self.ensure_loaded().await?;
        Ok(self.state.read().await.metadata.clone())
    }
}
