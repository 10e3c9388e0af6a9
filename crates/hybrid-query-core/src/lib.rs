//! # Hybrid Query Core
//!
//! Pure logic for the hybrid query engine: data models, paragraph chunking,
//! query classification, heuristic SQL planning, fuzzy schema mapping, the
//! embedder trait with vector math, a flat inner-product index, lexical
//! reranking, and bounded query history.
//!
//! This crate contains no tokio, sqlx, filesystem or network I/O. The
//! `hybrid-query` app crate supplies data sources, embedding providers and
//! persistence.

pub mod chunk;
pub mod classify;
pub mod embedding;
pub mod history;
pub mod index;
pub mod models;
pub mod planner;
pub mod schema_map;
pub mod search;
