use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

/// Open a pool on an existing SQLite database.
///
/// The database is never created here: a missing file is a connection
/// failure, which schema analysis reports as an unavailable source.
pub async fn connect(url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("Invalid database URL: {}", url))?
        .create_if_missing(false)
        .read_only(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to {}", url))?;

    Ok(pool)
}

/// Like [`connect`], but defers the first connection until the pool is used.
///
/// Only an unparseable URL fails here. Use this where an unreachable
/// database should surface later, per operation.
pub fn connect_lazy(url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("Invalid database URL: {}", url))?
        .create_if_missing(false)
        .read_only(true);

    Ok(SqlitePoolOptions::new()
        .max_connections(5)
        .connect_lazy_with(options))
}
