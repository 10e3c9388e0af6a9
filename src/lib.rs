//! # Hybrid Query
//!
//! Answers natural-language questions over a relational database and an
//! unstructured document corpus at once.
//!
//! A query is classified as structured, unstructured or hybrid. The
//! structured path synthesizes a read-only parameterized `SELECT` from the
//! analyzed schema; the document path runs a dense vector search with a
//! lexical rerank. Both results come back in one envelope.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌────────────────────┐
//!   query ──────────▶│ HybridOrchestrator │
//!                    └─────┬────────┬─────┘
//!             classify/plan│        │search
//!                          ▼        ▼
//!                ┌────────────┐  ┌─────────────┐
//!                │SqlExecutor │  │ VectorStore │◀── ingest (extract+chunk+embed)
//!                │ + LRU cache│  │ CURRENT →   │
//!                └─────┬──────┘  │ gen-N/ pair │
//!                      ▼         └─────────────┘
//!                   SQLite
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! hq schema                          # analyze the configured database
//! hq ingest ./resumes                # embed documents
//! hq query "employees in Engineering over 70000"
//! hq query "find resumes mentioning Python"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | SQLite pool construction |
//! | [`catalog`] | Data source seam and schema analysis |
//! | [`executor`] | Plan execution and result cache |
//! | [`extract`] | Text extraction by file format |
//! | [`files`] | Ingestion path expansion |
//! | [`embedding`] | Embedding providers |
//! | [`persist`] | Index and metadata persistence |
//! | [`jobs`] | Ingestion job status |
//! | [`vector_store`] | Ingestion and vector search |
//! | [`orchestrator`] | Query routing and history |
//!
//! Pure logic (classifier, planner, chunker, index, ranking) lives in the
//! `hybrid-query-core` crate.

pub mod catalog;
pub mod config;
pub mod db;
pub mod embedding;
pub mod executor;
pub mod extract;
pub mod files;
pub mod jobs;
pub mod orchestrator;
pub mod persist;
pub mod vector_store;
