//! Embedding providers.
//!
//! Concrete [`Embedder`] implementations:
//! - **[`DisabledEmbedder`]**: fails every call; used when embeddings are not configured.
//! - **[`OpenAiEmbedder`]**: any OpenAI-compatible `/embeddings` endpoint.
//! - **`LocalEmbedder`**: in-process fastembed models (feature `local-embeddings-fastembed`).
//!
//! Use [`create_embedder`] to build the one named in `[embedding].provider`.
//!
//! # Retries
//!
//! `max_retries` defaults to 0: a failed request is reported to the caller
//! immediately. When raised, HTTP 429, 5xx and network errors are retried
//! with exponential backoff (1s, 2s, 4s, ... capped at 32s). Other 4xx
//! responses never retry.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use hybrid_query_core::embedding::{EmbedError, Embedder};

use crate::config::EmbeddingConfig;

/// Build the configured embedder.
///
/// # Errors
///
/// Unknown provider names, a `local` provider without the fastembed feature,
/// or an HTTP client that cannot be constructed.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Disabled ============

pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Err(EmbedError::Disabled)
    }
}

// ============ OpenAI-compatible ============

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    /// Read once at construction; a missing key surfaces as [`EmbedError::Auth`].
    api_key: Option<String>,
    api_key_env: String,
    batch_size: usize,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            model,
            api_key: std::env::var(&config.api_key_env).ok(),
            api_key_env: config.api_key_env.clone(),
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
        })
    }

    async fn embed_batch(&self, api_key: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(attempt, delay_secs = delay.as_secs(), "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.url)
                .bearer_auth(api_key)
                .json(&body)
                .send()
                .await;

            let response = match resp {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, "embedding request failed");
                    last_err = Some(EmbedError::Transport(e.to_string()));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                let json: serde_json::Value = response
                    .json()
                    .await
                    .map_err(|e| EmbedError::InvalidResponse(e.to_string()))?;
                return parse_openai_response(&json, texts.len());
            }

            let body_text = response.text().await.unwrap_or_default();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(EmbedError::Auth(format!("{}: {}", status, body_text)));
            }
            let err = EmbedError::Status {
                status: status.as_u16(),
                body: body_text,
            };
            if status.as_u16() == 429 || status.is_server_error() {
                warn!(status = status.as_u16(), "embedding provider unavailable");
                last_err = Some(err);
                continue;
            }
            return Err(err);
        }

        Err(last_err.unwrap_or_else(|| EmbedError::Transport("embedding failed after retries".into())))
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| EmbedError::Auth(format!("{} not set", self.api_key_env)))?;

        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.embed_batch(api_key, batch).await?);
        }
        Ok(out)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index` when present.
fn parse_openai_response(
    json: &serde_json::Value,
    expected: usize,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbedError::InvalidResponse("missing data array".into()))?;

    let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| EmbedError::InvalidResponse("missing embedding".into()))?;
        let vec = embedding
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| EmbedError::InvalidResponse("non-numeric embedding value".into()))
            })
            .collect::<Result<Vec<f32>, _>>()?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        indexed.push((index, vec));
    }
    indexed.sort_by_key(|(i, _)| *i);

    if indexed.len() != expected {
        return Err(EmbedError::InvalidResponse(format!(
            "expected {} embeddings, got {}",
            expected,
            indexed.len()
        )));
    }
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Local (fastembed) ============

/// In-process embeddings. The model is downloaded on first use and kept
/// loaded for the life of the embedder.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalEmbedder {
    model_name: String,
    model: fastembed::EmbeddingModel,
    batch_size: usize,
    loaded: Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
        let model = fastembed_model(&model_name)?;
        Ok(Self {
            model_name,
            model,
            batch_size: config.batch_size,
            loaded: Arc::new(std::sync::Mutex::new(None)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, \
             nomic-embed-text-v1.5, multilingual-e5-small",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let texts = texts.to_vec();
        let model = self.model.clone();
        let batch_size = self.batch_size;
        let loaded = Arc::clone(&self.loaded);

        tokio::task::spawn_blocking(move || {
            let mut guard = loaded
                .lock()
                .map_err(|_| EmbedError::Local("model lock poisoned".into()))?;
            if guard.is_none() {
                let init = fastembed::InitOptions::new(model).with_show_download_progress(true);
                let te = fastembed::TextEmbedding::try_new(init)
                    .map_err(|e| EmbedError::Local(format!("failed to load model: {}", e)))?;
                *guard = Some(te);
            }
            match guard.as_mut() {
                Some(te) => te
                    .embed(texts, Some(batch_size))
                    .map_err(|e| EmbedError::Local(e.to_string())),
                None => Err(EmbedError::Local("model not loaded".into())),
            }
        })
        .await
        .map_err(|e| EmbedError::Local(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_is_fatal() {
        let e = DisabledEmbedder.embed(&["x".to_string()]).await.unwrap_err();
        assert!(matches!(e, EmbedError::Disabled));
        assert!(e.is_fatal());
    }

    #[tokio::test]
    async fn test_missing_api_key_is_auth_error() {
        let config = EmbeddingConfig {
            provider: "openai".into(),
            model: Some("text-embedding-3-small".into()),
            api_key_env: "HQ_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..EmbeddingConfig::default()
        };
        let embedder = OpenAiEmbedder::new(&config).unwrap();
        let e = embedder.embed(&["x".to_string()]).await.unwrap_err();
        assert!(matches!(e, EmbedError::Auth(_)));
        assert!(e.is_fatal());
    }

    #[test]
    fn test_parse_response_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let vectors = parse_openai_response(&json, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_response_count_mismatch() {
        let json = serde_json::json!({"data": [{"embedding": [1.0]}]});
        assert!(matches!(
            parse_openai_response(&json, 2),
            Err(EmbedError::InvalidResponse(_))
        ));
        assert!(parse_openai_response(&serde_json::json!({}), 0).is_err());
    }

    #[test]
    fn test_create_embedder() {
        assert_eq!(
            create_embedder(&EmbeddingConfig::default()).unwrap().model_name(),
            "disabled"
        );
        let bad = EmbeddingConfig {
            provider: "nope".into(),
            ..EmbeddingConfig::default()
        };
        assert!(create_embedder(&bad).is_err());
    }
}
