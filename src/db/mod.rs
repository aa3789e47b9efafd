use std::path::Path;

use anyhow::{Context, Result};
use tokio_rusqlite::Connection;

pub mod jobs;

/// Open (or create) the job database at `path` and apply the schema.
pub async fn init(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let conn = Connection::open(path)
        .await
        .with_context(|| format!("Failed to open database {}", path.display()))?;

    conn.call(|conn| {
        // Every committed mutation must survive a crash right after it returns.
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = FULL;")?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok::<(), tokio_rusqlite::rusqlite::Error>(())
    })
    .await
    .context("Failed to apply database schema")?;

    Ok(conn)
}

/// In-memory database with the same schema; used by tests.
pub async fn init_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().await?;

    conn.call(|conn| {
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok::<(), tokio_rusqlite::rusqlite::Error>(())
    })
    .await?;

    Ok(conn)
}
