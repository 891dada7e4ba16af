use anyhow::Result;
use sqlx::SqlitePool;

/// Create the corpus schema in a freshly opened file.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Key/value facts about the corpus (embedder id, model, dims).
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS corpus_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per chunk; seq preserves insertion order for tie-breaking.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            seq INTEGER PRIMARY KEY,
            batch INTEGER NOT NULL,
            source TEXT NOT NULL,
            page INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_batch ON chunks(batch)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source)")
        .execute(pool)
        .await?;

    Ok(())
}
