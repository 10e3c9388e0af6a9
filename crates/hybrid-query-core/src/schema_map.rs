//! Fuzzy mapping from query words to schema names.
//!
//! Advisory only: the planner does its own table scoring. This surface lets
//! a caller show which tables and columns a query probably refers to.

use serde::{Deserialize, Serialize};
use similar::TextDiff;

use crate::models::SchemaSnapshot;

/// Minimum similarity ratio for a match.
pub const MATCH_CUTOFF: f32 = 0.6;
const MAX_TABLES_PER_WORD: usize = 3;
const MAX_COLUMNS_PER_WORD: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

/// Candidate tables and columns, de-duplicated in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaCandidates {
    pub tables: Vec<String>,
    pub columns: Vec<ColumnRef>,
}

/// Similarity in `[0, 1]`, `2 × matches / total length` over characters.
pub fn similarity(a: &str, b: &str) -> f32 {
    TextDiff::from_chars(a, b).ratio()
}

/// Up to `n` of `possibilities` scoring at least `cutoff` against `word`,
/// best first. Equal scores keep their input order.
pub fn close_matches<'a>(
    word: &str,
    possibilities: &[&'a str],
    n: usize,
    cutoff: f32,
) -> Vec<&'a str> {
    let mut scored: Vec<(f32, &'a str)> = possibilities
        .iter()
        .map(|p| (similarity(word, &p.to_lowercase()), *p))
        .filter(|(score, _)| *score >= cutoff)
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(n).map(|(_, p)| p).collect()
}

fn query_words(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c| matches!(c, ',' | '.' | '(' | ')' | '"' | '\''))
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Map each query word to similar table names (top 3) and column names
/// (top 5, across all tables).
///
/// A matched column name is reported once for every table that has it.
pub fn map_terms_to_schema(query: &str, snapshot: &SchemaSnapshot) -> SchemaCandidates {
    let words = query_words(query);
    let mut out = SchemaCandidates::default();

    let table_names: Vec<&str> = snapshot.tables.iter().map(|t| t.name.as_str()).collect();
    let all_columns: Vec<(&str, &str)> = snapshot
        .tables
        .iter()
        .flat_map(|t| t.columns.iter().map(move |c| (t.name.as_str(), c.name.as_str())))
        .collect();
    let column_names: Vec<&str> = all_columns.iter().map(|(_, c)| *c).collect();

    for w in &words {
        for table in close_matches(w, &table_names, MAX_TABLES_PER_WORD, MATCH_CUTOFF) {
            if !out.tables.iter().any(|t| t == table) {
                out.tables.push(table.to_string());
            }
        }
    }

    for w in &words {
        for column in close_matches(w, &column_names, MAX_COLUMNS_PER_WORD, MATCH_CUTOFF) {
            for (table, col) in &all_columns {
                if *col != column {
                    continue;
                }
                let candidate = ColumnRef {
                    table: table.to_string(),
                    column: col.to_string(),
                };
                if !out.columns.contains(&candidate) {
                    out.columns.push(candidate);
                }
            }
        }
    }

    out
}
