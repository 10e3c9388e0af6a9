//! Rule-based query routing.
//!
//! Labels a natural-language query as [`QueryKind::Structured`],
//! [`QueryKind::Unstructured`], or [`QueryKind::Hybrid`] from two fixed
//! keyword families. The decision table is evaluated in this order:
//!
//! | # | Document terms | Structured terms | Result |
//! |---|----------------|------------------|--------|
//! | 1 | present | absent | `Unstructured` |
//! | 2 | present | present | `Hybrid` |
//! | 3 | absent | present | `Structured` |
//! | 4 | absent | absent | `Hybrid` |
//!
//! Terms match whole words, allowing one inflection suffix (`resumes`,
//! `mentioning`, `listed`), so that `resume` never trips over `sum`.

use crate::models::QueryKind;

/// Terms signalling intent to search unstructured documents.
pub const DOCUMENT_TERMS: &[&str] = &["resume", "cv", "document", "find", "mention", "search"];

/// Terms signalling intent to query the relational source.
pub const STRUCTURED_TERMS: &[&str] = &[
    "how many",
    "count",
    "avg",
    "average",
    "sum",
    "top",
    "highest",
    "lowest",
    "list",
    "where",
    "select",
    "employees",
    "salary",
    "hired",
];

const INFLECTIONS: &[&str] = &["s", "es", "ing", "ed", "d"];

/// Classify a query. Pure and deterministic.
pub fn classify(query: &str) -> QueryKind {
    let tokens = tokenize(query);
    let has_doc = DOCUMENT_TERMS.iter().any(|t| contains_term(&tokens, t));
    let has_sql = STRUCTURED_TERMS.iter().any(|t| contains_term(&tokens, t));

    if has_doc && !has_sql {
        return QueryKind::Unstructured;
    }
    if has_sql {
        if has_doc {
            return QueryKind::Hybrid;
        }
        return QueryKind::Structured;
    }
    QueryKind::Hybrid
}

/// Lowercased alphanumeric words.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

fn contains_term(tokens: &[String], term: &str) -> bool {
    let parts: Vec<&str> = term.split_whitespace().collect();
    match parts.as_slice() {
        [] => false,
        [single] => tokens.iter().any(|t| word_matches(t, single)),
        phrase => tokens
            .windows(phrase.len())
            .any(|w| w.iter().zip(phrase.iter()).all(|(t, p)| t == p)),
    }
}

fn word_matches(token: &str, term: &str) -> bool {
    if token == term {
        return true;
    }
    INFLECTIONS.iter().any(|suffix| {
        token
            .strip_suffix(suffix)
            .is_some_and(|stem| stem == term)
    })
}
