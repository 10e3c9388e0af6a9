//! TOML configuration.
//!
//! Every section has defaults, so a file containing only `[db] url = ...`
//! is valid. [`load_config`] parses and validates; [`Config::minimal`]
//! builds the same defaults in code for tests and ad-hoc use.
//!
//! ```toml
//! [db]
//! url = "sqlite://./data/demo.sqlite"
//!
//! [index]
//! dir = "./data/index"
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use hybrid_query_core::planner::PlannerOptions;
use hybrid_query_core::search::RankParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    /// sqlx connection URL, e.g. `sqlite://./data/demo.sqlite`.
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_dir")]
    pub dir: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: default_index_dir(),
        }
    }
}

fn default_index_dir() -> PathBuf {
    PathBuf::from("./data/index")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    hybrid_query_core::chunk::DEFAULT_MAX_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            candidate_multiplier: default_candidate_multiplier(),
            lexical_weight: default_lexical_weight(),
        }
    }
}

impl RetrievalConfig {
    pub fn rank_params(&self) -> RankParams {
        RankParams {
            top_k: self.top_k,
            candidate_multiplier: self.candidate_multiplier,
            lexical_weight: self.lexical_weight,
        }
    }
}

fn default_top_k() -> usize {
    hybrid_query_core::search::DEFAULT_TOP_K
}
fn default_candidate_multiplier() -> usize {
    2
}
fn default_lexical_weight() -> f32 {
    hybrid_query_core::search::DEFAULT_LEXICAL_WEIGHT
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlannerConfig {
    #[serde(default = "default_row_limit")]
    pub row_limit: usize,
    #[serde(default = "default_max_columns")]
    pub max_columns: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            row_limit: default_row_limit(),
            max_columns: default_max_columns(),
        }
    }
}

impl PlannerConfig {
    pub fn options(&self) -> PlannerOptions {
        PlannerOptions {
            row_limit: self.row_limit,
            max_columns: self.max_columns,
        }
    }
}

fn default_row_limit() -> usize {
    hybrid_query_core::planner::DEFAULT_ROW_LIMIT
}
fn default_max_columns() -> usize {
    hybrid_query_core::planner::DEFAULT_MAX_COLUMNS
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_sql_capacity")]
    pub sql_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sql_capacity: default_sql_capacity(),
        }
    }
}

fn default_sql_capacity() -> usize {
    512
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
        }
    }
}

fn default_history_capacity() -> usize {
    hybrid_query_core::history::DEFAULT_HISTORY_CAPACITY
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_include_globs() -> Vec<String> {
    ["txt", "md", "csv", "pdf", "docx", "xlsx"]
        .iter()
        .map(|ext| format!("**/*.{}", ext))
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_embedding_url")]
    pub url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: default_embedding_url(),
            api_key_env: default_api_key_env(),
            batch_size: default_batch_size(),
            max_retries: 0,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_embedding_url() -> String {
    "https://api.openai.com/v1/embeddings".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_timeout_secs() -> u64 {
    60
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl Config {
    /// Defaults for every section, pointed at `db_url`.
    pub fn minimal(db_url: impl Into<String>) -> Self {
        Self {
            db: DbConfig { url: db_url.into() },
            index: IndexConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            planner: PlannerConfig::default(),
            cache: CacheConfig::default(),
            history: HistoryConfig::default(),
            ingest: IngestConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.max_chars == 0 {
            bail!("chunking.max_chars must be > 0");
        }

        if self.retrieval.top_k < 1 {
            bail!("retrieval.top_k must be >= 1");
        }
        if self.retrieval.candidate_multiplier < 1 {
            bail!("retrieval.candidate_multiplier must be >= 1");
        }
        if !self.retrieval.lexical_weight.is_finite() || self.retrieval.lexical_weight < 0.0 {
            bail!("retrieval.lexical_weight must be a finite number >= 0");
        }

        if self.planner.row_limit < 1 {
            bail!("planner.row_limit must be >= 1");
        }
        if self.planner.max_columns < 1 {
            bail!("planner.max_columns must be >= 1");
        }

        if self.cache.sql_capacity < 1 {
            bail!("cache.sql_capacity must be >= 1");
        }
        if self.history.capacity < 1 {
            bail!("history.capacity must be >= 1");
        }

        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "local" => {}
            "openai" => {
                if self.embedding.model.is_none() {
                    bail!("embedding.model must be specified when provider is 'openai'");
                }
            }
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, or local.",
                other
            ),
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_minimal_file_gets_defaults() {
        let f = write_config("[db]\nurl = \"sqlite::memory:\"\n");
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.chunking.max_chars, 1000);
        assert_eq!(cfg.retrieval.top_k, 6);
        assert_eq!(cfg.retrieval.candidate_multiplier, 2);
        assert!((cfg.retrieval.lexical_weight - 0.2).abs() < 1e-6);
        assert_eq!(cfg.planner.row_limit, 200);
        assert_eq!(cfg.planner.max_columns, 6);
        assert_eq!(cfg.cache.sql_capacity, 512);
        assert_eq!(cfg.history.capacity, 50);
        assert_eq!(cfg.embedding.provider, "disabled");
        assert_eq!(cfg.embedding.max_retries, 0);
        assert!(cfg.ingest.include_globs.contains(&"**/*.pdf".to_string()));
    }

    #[test]
    fn test_openai_requires_model() {
        let f = write_config("[db]\nurl = \"sqlite::memory:\"\n[embedding]\nprovider = \"openai\"\n");
        let err = load_config(f.path()).unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn test_unknown_provider() {
        let f = write_config("[db]\nurl = \"sqlite::memory:\"\n[embedding]\nprovider = \"ollama\"\n");
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_rejects_zero_chunk_budget() {
        let f = write_config("[db]\nurl = \"sqlite::memory:\"\n[chunking]\nmax_chars = 0\n");
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_rejects_negative_lexical_weight() {
        let mut cfg = Config::minimal("sqlite::memory:");
        cfg.retrieval.lexical_weight = -0.1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
