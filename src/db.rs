use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;

/// Open a pool on a corpus file.
///
/// Writers get a fresh file in rollback-journal mode so that, once the pool
/// is closed, the single `.sqlite` file is complete and can be renamed into
/// place. Readers open read-only.
pub async fn connect(path: &Path, writable: bool) -> Result<SqlitePool> {
    if writable {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(writable)
        .read_only(!writable);
    if writable {
        options = options.journal_mode(SqliteJournalMode::Delete);
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(if writable { 1 } else { 4 })
        .connect_with(options)
        .await?;

    Ok(pool)
}
