use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

pub mod merge;
pub mod queries;

/// Schema shared by per-worker stores and the consolidated store.
const SCHEMA: &str = include_str!("../../migrations/001_init.sql");

/// Open (creating if missing) a local store file and ensure its schema.
pub async fn open_store(path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await?;

    sqlx::raw_sql(SCHEMA).execute(&pool).await?;
    Ok(pool)
}

/// Open an in-memory store with the full schema. Test-only convenience.
pub async fn open_memory_store() -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    sqlx::raw_sql(SCHEMA).execute(&pool).await?;
    Ok(pool)
}

/// Path convention for a named worker's store.
pub fn worker_store_path(data_dir: &str, worker_name: &str) -> String {
    format!("{data_dir}/{worker_name}.db")
}

/// Path of the consolidated store produced by the merge step.
pub fn consolidated_store_path(data_dir: &str) -> String {
    format!("{data_dir}/consolidated.db")
}
