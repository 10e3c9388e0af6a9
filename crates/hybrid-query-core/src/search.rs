//! Two-stage ranking: dense candidates, then a lexical nudge.
//!
//! The index returns `candidate_multiplier × top_k` nearest neighbours by
//! inner product. Each candidate gets a lexical-overlap score and the final
//! score is
//!
//! ```text
//! score = vector_score + lexical_weight × lexical_overlap
//! ```
//!
//! Results are sorted by descending score and truncated to `top_k`.
//!
//! # Lexical overlap
//!
//! Both strings are split on whitespace into sets of lowercased words, with
//! `, . ( ) " ' \`` trimmed from each word's ends. The overlap is
//! `|query ∩ text| / sqrt(|query|)`, and `0.0` for an empty query.

use std::collections::HashSet;

use crate::index::FlatIndex;
use crate::models::{Chunk, SearchHit};

/// Default number of hits returned to the caller.
pub const DEFAULT_TOP_K: usize = 6;
/// Default lexical weight.
pub const DEFAULT_LEXICAL_WEIGHT: f32 = 0.2;

/// Ranking parameters.
#[derive(Debug, Clone)]
pub struct RankParams {
    pub top_k: usize,
    /// Candidates fetched per requested hit.
    pub candidate_multiplier: usize,
    pub lexical_weight: f32,
}

impl Default for RankParams {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            candidate_multiplier: 2,
            lexical_weight: DEFAULT_LEXICAL_WEIGHT,
        }
    }
}

impl RankParams {
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    fn candidate_k(&self) -> usize {
        self.top_k.saturating_mul(self.candidate_multiplier).max(1)
    }
}

fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| {
            w.to_lowercase()
                .trim_matches(|c| matches!(c, ',' | '.' | '(' | ')' | '"' | '\'' | '`'))
                .to_string()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Share of query words present in `text`, scaled by `1/sqrt(|query|)`.
pub fn lexical_overlap(query: &str, text: &str) -> f32 {
    let q = word_set(query);
    if q.is_empty() {
        return 0.0;
    }
    let t = word_set(text);
    let common = q.intersection(&t).count();
    common as f32 / (q.len() as f32).sqrt()
}

/// Rank `query_vec` against `index`, reranking with lexical overlap.
///
/// `metadata[i]` describes index position `i`; positions without metadata
/// are skipped, so every returned hit names a stored chunk.
pub fn rank(
    index: &FlatIndex,
    metadata: &[Chunk],
    query: &str,
    query_vec: &[f32],
    params: &RankParams,
) -> Vec<SearchHit> {
    if params.top_k == 0 {
        return Vec::new();
    }

    let mut hits: Vec<SearchHit> = index
        .search(query_vec, params.candidate_k())
        .into_iter()
        .filter_map(|(pos, vector_score)| {
            let chunk = metadata.get(pos)?;
            let lexical_score = lexical_overlap(query, &chunk.text);
            Some(SearchHit {
                chunk_id: chunk.chunk_id.clone(),
                source: chunk.source.clone(),
                text: chunk.text.clone(),
                score: vector_score + params.lexical_weight * lexical_score,
                vector_score,
                lexical_score,
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(params.top_k);
    hits
}
