//! Embedder trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that every embedding backend implements,
//! the [`EmbedError`] taxonomy, and pure helpers for normalization,
//! similarity and serialization.
//!
//! Concrete providers (OpenAI-compatible HTTP, fastembed, disabled) live in
//! the `hybrid-query` app crate.

use async_trait::async_trait;
use thiserror::Error;

/// Failures an embedding backend can report.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding provider is disabled")]
    Disabled,
    #[error("embedding transport error: {0}")]
    Transport(String),
    #[error("embedding provider rejected credentials: {0}")]
    Auth(String),
    #[error("embedding provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
    #[error("local embedding failed: {0}")]
    Local(String),
}

impl EmbedError {
    /// Transport and credential failures abort an ingestion batch;
    /// everything else is charged to the file being embedded.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EmbedError::Disabled | EmbedError::Transport(_) | EmbedError::Auth(_)
        )
    }
}

/// Maps a batch of strings to equal-length float vectors, one per input.
///
/// Implementations need not normalize; callers go through [`embed_normalized`].
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Embed `texts` and L2-normalize every vector.
///
/// Rejects responses whose count differs from the input or whose vectors
/// disagree on dimension.
pub async fn embed_normalized(
    embedder: &dyn Embedder,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, EmbedError> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let mut vectors = embedder.embed(texts).await?;
    if vectors.len() != texts.len() {
        return Err(EmbedError::InvalidResponse(format!(
            "expected {} vectors, got {}",
            texts.len(),
            vectors.len()
        )));
    }
    let dims = vectors[0].len();
    if dims == 0 || vectors.iter().any(|v| v.len() != dims) {
        return Err(EmbedError::InvalidResponse(
            "vectors have inconsistent or zero dimension".to_string(),
        ));
    }
    for v in &mut vectors {
        l2_normalize(v);
    }
    Ok(vectors)
}

/// Embed a single query string, normalized.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>, EmbedError> {
    embed_normalized(embedder, &[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| EmbedError::InvalidResponse("empty embedding response".to_string()))
}

/// Scale `v` to unit length in place. A zero vector stays zero.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Dot product. Returns `0.0` when lengths differ.
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Encode a float vector as little-endian f32 bytes.
///
/// # Example
///
/// ```rust
/// use hybrid_query_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Reverses [`vec_to_blob`]. Trailing bytes that do not form a full `f32`
/// are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
