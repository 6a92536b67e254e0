use sqlx::SqlitePool;

use crate::error::Result;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Per-source sync cursor. A row is written only after a successful
    // change-detection call; there is no partial advance.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS checkpoints (
            source_id TEXT PRIMARY KEY,
            last_sync_at INTEGER NOT NULL,
            deletion_strategy TEXT NOT NULL DEFAULT 'periodic',
            last_reconciled_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Page records keyed by the external page id. hierarchy_path is a
    // materialized ancestor chain, indexed for prefix queries.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pages (
            page_id TEXT PRIMARY KEY,
            source_id TEXT NOT NULL,
            space_key TEXT NOT NULL,
            title TEXT NOT NULL,
            version INTEGER NOT NULL,
            last_modified INTEGER NOT NULL,
            hierarchy_path TEXT NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            metadata_json TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            chunk_id TEXT PRIMARY KEY,
            page_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            section_heading TEXT,
            pending_deletion INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (page_id) REFERENCES pages(page_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_runs (
            run_id TEXT PRIMARY KEY,
            source_id TEXT NOT NULL,
            metrics_json TEXT NOT NULL,
            started_at INTEGER NOT NULL,
            finished_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_page_id ON chunks(page_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_pages_source ON pages(source_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_pages_hierarchy ON pages(hierarchy_path)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sync_runs_source ON sync_runs(source_id, started_at DESC)")
        .execute(pool)
        .await?;

    Ok(())
}
