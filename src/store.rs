//! Storage abstraction for wikisync.
//!
//! [`PageStore`] covers checkpoints, page records, and run metrics.
//! [`ChunkStore`] is the boundary to the chunk-storage/embedding
//! collaborator: the replacement protocol in [`crate::replace`] only ever
//! talks to this trait, so the engine never depends on how chunks are
//! embedded or indexed downstream.
//!
//! Implementations must be `Send + Sync`. [`MemoryStore`] backs unit and
//! integration tests; [`SqliteStore`] is the production backend.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::error::{Result, SyncError};
use crate::models::{ContentChunk, PageRecord, SourceCheckpoint, SyncMetrics};

/// Checkpoint, page-record, and run-metrics persistence.
#[async_trait]
pub trait PageStore: Send + Sync {
    async fn get_checkpoint(&self, source_id: &str) -> Result<Option<SourceCheckpoint>>;

    /// Write the whole checkpoint row. Callers only invoke this after the
    /// change-detection call that produced it has succeeded.
    async fn put_checkpoint(&self, checkpoint: &SourceCheckpoint) -> Result<()>;

    /// Stored version for a page, or `None` if the page is unknown.
    /// Soft-deleted pages still report their version so a revived page
    /// classifies as an update, not a create.
    async fn get_page_version(&self, page_id: &str) -> Result<Option<i64>>;

    async fn get_page(&self, page_id: &str) -> Result<Option<PageRecord>>;

    async fn upsert_page(&self, source_id: &str, page: &PageRecord) -> Result<()>;

    /// Ids of all non-deleted pages for a source. Used by the deletion
    /// reconciler to diff against the live-id probe.
    async fn list_active_page_ids(&self, source_id: &str) -> Result<HashSet<String>>;

    async fn mark_page_deleted(&self, page_id: &str) -> Result<()>;

    /// Pages whose hierarchy path starts with `prefix`, excluding deleted.
    async fn pages_under(&self, prefix: &str) -> Result<Vec<PageRecord>>;

    /// Remove a source entirely: its pages and their chunks.
    async fn delete_source(&self, source_id: &str) -> Result<()>;

    /// Persist run metrics. Called at run end even on partial failure,
    /// and again to overwrite the in-progress row when the run finishes.
    async fn persist_run(&self, metrics: &SyncMetrics) -> Result<()>;

    async fn get_run(&self, run_id: &str) -> Result<Option<SyncMetrics>>;

    async fn latest_run(&self, source_id: &str) -> Result<Option<SyncMetrics>>;
}

/// Chunk persistence boundary.
///
/// Visibility contract: [`visible_chunks`](ChunkStore::visible_chunks)
/// returns the non-pending set when one exists, otherwise the pending set.
/// Combined with an atomic [`insert_chunks`](ChunkStore::insert_chunks)
/// (all rows in one transaction), search flips from the old set to the
/// full new set in a single step and never observes a mix.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Insert all chunks atomically. Either every chunk becomes visible
    /// or none does.
    async fn insert_chunks(&self, chunks: &[ContentChunk]) -> Result<()>;

    /// The chunk set search currently serves for a page, ordered by index.
    async fn visible_chunks(&self, page_id: &str) -> Result<Vec<ContentChunk>>;

    async fn count_pending(&self, page_id: &str) -> Result<u64>;

    /// Flag every chunk of the page as pending deletion (still served).
    async fn mark_pending(&self, page_id: &str) -> Result<()>;

    /// Roll back: clear pending flags, old chunks stay authoritative.
    async fn clear_pending(&self, page_id: &str) -> Result<()>;

    /// Commit: physically remove the superseded chunks.
    async fn delete_pending(&self, page_id: &str) -> Result<()>;

    /// Remove every chunk for a page (soft-delete and cascade paths).
    async fn delete_all(&self, page_id: &str) -> Result<()>;
}

fn select_visible(mut chunks: Vec<ContentChunk>) -> Vec<ContentChunk> {
    let has_live = chunks.iter().any(|c| !c.pending_deletion);
    if has_live {
        chunks.retain(|c| !c.pending_deletion);
    }
    chunks.sort_by_key(|c| c.chunk_index);
    chunks
}

// ============ In-memory store ============

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct MemoryInner {
    checkpoints: HashMap<String, SourceCheckpoint>,
    pages: HashMap<String, (String, PageRecord)>, // page_id -> (source_id, record)
    chunks: Vec<ContentChunk>,
    runs: HashMap<String, SyncMetrics>,
}

/// In-memory store for tests. A single mutex makes every operation,
/// including multi-row chunk inserts, atomic with respect to readers.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total chunk rows, pending included. Test helper.
    pub fn chunk_count(&self) -> usize {
        self.inner.lock().unwrap().chunks.len()
    }

    /// Number of stored (non-deleted or deleted) page records. Test helper.
    pub fn page_count(&self) -> usize {
        self.inner.lock().unwrap().pages.len()
    }
}

#[async_trait]
impl PageStore for MemoryStore {
    async fn get_checkpoint(&self, source_id: &str) -> Result<Option<SourceCheckpoint>> {
        Ok(self.inner.lock().unwrap().checkpoints.get(source_id).cloned())
    }

    async fn put_checkpoint(&self, checkpoint: &SourceCheckpoint) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .checkpoints
            .insert(checkpoint.source_id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn get_page_version(&self, page_id: &str) -> Result<Option<i64>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .pages
            .get(page_id)
            .map(|(_, p)| p.version))
    }

    async fn get_page(&self, page_id: &str) -> Result<Option<PageRecord>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .pages
            .get(page_id)
            .map(|(_, p)| p.clone()))
    }

    async fn upsert_page(&self, source_id: &str, page: &PageRecord) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .pages
            .insert(page.page_id.clone(), (source_id.to_string(), page.clone()));
        Ok(())
    }

    async fn list_active_page_ids(&self, source_id: &str) -> Result<HashSet<String>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .pages
            .values()
            .filter(|(src, p)| src == source_id && !p.is_deleted)
            .map(|(_, p)| p.page_id.clone())
            .collect())
    }

    async fn mark_page_deleted(&self, page_id: &str) -> Result<()> {
        if let Some((_, page)) = self.inner.lock().unwrap().pages.get_mut(page_id) {
            page.is_deleted = true;
        }
        Ok(())
    }

    async fn pages_under(&self, prefix: &str) -> Result<Vec<PageRecord>> {
        // Segment boundary: "/Home/Guides" must not match "/Home/Guidesbook".
        let child_prefix = format!("{}/", prefix);
        let mut pages: Vec<PageRecord> = self
            .inner
            .lock()
            .unwrap()
            .pages
            .values()
            .filter(|(_, p)| {
                !p.is_deleted
                    && (p.hierarchy_path == prefix
                        || p.hierarchy_path.starts_with(&child_prefix))
            })
            .map(|(_, p)| p.clone())
            .collect();
        pages.sort_by(|a, b| a.hierarchy_path.cmp(&b.hierarchy_path));
        Ok(pages)
    }

    async fn delete_source(&self, source_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let page_ids: HashSet<String> = inner
            .pages
            .iter()
            .filter(|(_, (src, _))| src == source_id)
            .map(|(id, _)| id.clone())
            .collect();
        inner.pages.retain(|id, _| !page_ids.contains(id));
        inner.chunks.retain(|c| !page_ids.contains(&c.page_id));
        inner.checkpoints.remove(source_id);
        Ok(())
    }

    async fn persist_run(&self, metrics: &SyncMetrics) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .runs
            .insert(metrics.run_id.clone(), metrics.clone());
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<SyncMetrics>> {
        Ok(self.inner.lock().unwrap().runs.get(run_id).cloned())
    }

    async fn latest_run(&self, source_id: &str) -> Result<Option<SyncMetrics>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .runs
            .values()
            .filter(|m| m.source_id == source_id)
            .max_by_key(|m| m.started_at)
            .cloned())
    }
}

#[async_trait]
impl ChunkStore for MemoryStore {
    async fn insert_chunks(&self, chunks: &[ContentChunk]) -> Result<()> {
        // Single lock acquisition: readers see all new chunks or none.
        self.inner.lock().unwrap().chunks.extend(chunks.iter().cloned());
        Ok(())
    }

    async fn visible_chunks(&self, page_id: &str) -> Result<Vec<ContentChunk>> {
        let chunks: Vec<ContentChunk> = self
            .inner
            .lock()
            .unwrap()
            .chunks
            .iter()
            .filter(|c| c.page_id == page_id)
            .cloned()
            .collect();
        Ok(select_visible(chunks))
    }

    async fn count_pending(&self, page_id: &str) -> Result<u64> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .chunks
            .iter()
            .filter(|c| c.page_id == page_id && c.pending_deletion)
            .count() as u64)
    }

    async fn mark_pending(&self, page_id: &str) -> Result<()> {
        for chunk in self.inner.lock().unwrap().chunks.iter_mut() {
            if chunk.page_id == page_id {
                chunk.pending_deletion = true;
            }
        }
        Ok(())
    }

    async fn clear_pending(&self, page_id: &str) -> Result<()> {
        for chunk in self.inner.lock().unwrap().chunks.iter_mut() {
            if chunk.page_id == page_id {
                chunk.pending_deletion = false;
            }
        }
        Ok(())
    }

    async fn delete_pending(&self, page_id: &str) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .chunks
            .retain(|c| !(c.page_id == page_id && c.pending_deletion));
        Ok(())
    }

    async fn delete_all(&self, page_id: &str) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .chunks
            .retain(|c| c.page_id != page_id);
        Ok(())
    }
}

// ============ SQLite store ============

/// SQLite-backed store. Schema in [`crate::migrate`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn ts(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn from_ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn row_to_page(row: &sqlx::sqlite::SqliteRow) -> PageRecord {
    let metadata: String = row.get("metadata_json");
    PageRecord {
        page_id: row.get("page_id"),
        space_key: row.get("space_key"),
        title: row.get("title"),
        version: row.get("version"),
        last_modified: from_ts(row.get("last_modified")),
        hierarchy_path: row.get("hierarchy_path"),
        is_deleted: row.get::<i64, _>("is_deleted") != 0,
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::json!({})),
    }
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> ContentChunk {
    ContentChunk {
        chunk_id: row.get("chunk_id"),
        page_id: row.get("page_id"),
        chunk_index: row.get("chunk_index"),
        text: row.get("text"),
        section_heading: row.get("section_heading"),
        pending_deletion: row.get::<i64, _>("pending_deletion") != 0,
    }
}

#[async_trait]
impl PageStore for SqliteStore {
    async fn get_checkpoint(&self, source_id: &str) -> Result<Option<SourceCheckpoint>> {
        let row = sqlx::query(
            "SELECT source_id, last_sync_at, deletion_strategy, last_reconciled_at
             FROM checkpoints WHERE source_id = ?",
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let strategy: String = row.get("deletion_strategy");
            SourceCheckpoint {
                source_id: row.get("source_id"),
                last_sync_at: from_ts(row.get("last_sync_at")),
                deletion_strategy: crate::models::DeletionStrategy::parse(&strategy)
                    .unwrap_or_default(),
                last_reconciled_at: row
                    .get::<Option<i64>, _>("last_reconciled_at")
                    .map(from_ts),
            }
        }))
    }

    async fn put_checkpoint(&self, checkpoint: &SourceCheckpoint) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO checkpoints (source_id, last_sync_at, deletion_strategy, last_reconciled_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(source_id) DO UPDATE SET
                last_sync_at = excluded.last_sync_at,
                deletion_strategy = excluded.deletion_strategy,
                last_reconciled_at = excluded.last_reconciled_at
            "#,
        )
        .bind(&checkpoint.source_id)
        .bind(ts(checkpoint.last_sync_at))
        .bind(checkpoint.deletion_strategy.as_str())
        .bind(checkpoint.last_reconciled_at.map(ts))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_page_version(&self, page_id: &str) -> Result<Option<i64>> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM pages WHERE page_id = ?")
                .bind(page_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(version)
    }

    async fn get_page(&self, page_id: &str) -> Result<Option<PageRecord>> {
        let row = sqlx::query("SELECT * FROM pages WHERE page_id = ?")
            .bind(page_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_page))
    }

    async fn upsert_page(&self, source_id: &str, page: &PageRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pages (page_id, source_id, space_key, title, version, last_modified, hierarchy_path, is_deleted, metadata_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(page_id) DO UPDATE SET
                space_key = excluded.space_key,
                title = excluded.title,
                version = excluded.version,
                last_modified = excluded.last_modified,
                hierarchy_path = excluded.hierarchy_path,
                is_deleted = excluded.is_deleted,
                metadata_json = excluded.metadata_json
            "#,
        )
        .bind(&page.page_id)
        .bind(source_id)
        .bind(&page.space_key)
        .bind(&page.title)
        .bind(page.version)
        .bind(ts(page.last_modified))
        .bind(&page.hierarchy_path)
        .bind(page.is_deleted as i64)
        .bind(page.metadata.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_active_page_ids(&self, source_id: &str) -> Result<HashSet<String>> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT page_id FROM pages WHERE source_id = ? AND is_deleted = 0",
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn mark_page_deleted(&self, page_id: &str) -> Result<()> {
        sqlx::query("UPDATE pages SET is_deleted = 1 WHERE page_id = ?")
            .bind(page_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn pages_under(&self, prefix: &str) -> Result<Vec<PageRecord>> {
        // The page at `prefix` itself, or anything below a path
        // separator; a sibling sharing the title prefix must not match.
        // ESCAPE keeps user-controlled prefixes literal under LIKE.
        let pattern = format!(
            "{}/%",
            prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
        );
        let rows = sqlx::query(
            "SELECT * FROM pages WHERE is_deleted = 0
             AND (hierarchy_path = ? OR hierarchy_path LIKE ? ESCAPE '\\')
             ORDER BY hierarchy_path",
        )
        .bind(prefix)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_page).collect())
    }

    async fn delete_source(&self, source_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "DELETE FROM chunks WHERE page_id IN (SELECT page_id FROM pages WHERE source_id = ?)",
        )
        .bind(source_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM pages WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM checkpoints WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn persist_run(&self, metrics: &SyncMetrics) -> Result<()> {
        let json = serde_json::to_string(metrics)
            .map_err(|e| SyncError::storage(e))?;
        sqlx::query(
            r#"
            INSERT INTO sync_runs (run_id, source_id, metrics_json, started_at, finished_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(run_id) DO UPDATE SET
                metrics_json = excluded.metrics_json,
                finished_at = excluded.finished_at
            "#,
        )
        .bind(&metrics.run_id)
        .bind(&metrics.source_id)
        .bind(json)
        .bind(ts(metrics.started_at))
        .bind(metrics.finished_at.map(ts))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<SyncMetrics>> {
        let json: Option<String> =
            sqlx::query_scalar("SELECT metrics_json FROM sync_runs WHERE run_id = ?")
                .bind(run_id)
                .fetch_optional(&self.pool)
                .await?;
        json.map(|j| serde_json::from_str(&j).map_err(SyncError::storage))
            .transpose()
    }

    async fn latest_run(&self, source_id: &str) -> Result<Option<SyncMetrics>> {
        let json: Option<String> = sqlx::query_scalar(
            "SELECT metrics_json FROM sync_runs WHERE source_id = ?
             ORDER BY started_at DESC, rowid DESC LIMIT 1",
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;
        json.map(|j| serde_json::from_str(&j).map_err(SyncError::storage))
            .transpose()
    }
}

#[async_trait]
impl ChunkStore for SqliteStore {
    async fn insert_chunks(&self, chunks: &[ContentChunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            sqlx::query(
                "INSERT INTO chunks (chunk_id, page_id, chunk_index, text, section_heading, pending_deletion)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.page_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.section_heading)
            .bind(chunk.pending_deletion as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn visible_chunks(&self, page_id: &str) -> Result<Vec<ContentChunk>> {
        let rows = sqlx::query("SELECT * FROM chunks WHERE page_id = ?")
            .bind(page_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(select_visible(rows.iter().map(row_to_chunk).collect()))
    }

    async fn count_pending(&self, page_id: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM chunks WHERE page_id = ? AND pending_deletion = 1",
        )
        .bind(page_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn mark_pending(&self, page_id: &str) -> Result<()> {
        sqlx::query("UPDATE chunks SET pending_deletion = 1 WHERE page_id = ?")
            .bind(page_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear_pending(&self, page_id: &str) -> Result<()> {
        sqlx::query("UPDATE chunks SET pending_deletion = 0 WHERE page_id = ?")
            .bind(page_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_pending(&self, page_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM chunks WHERE page_id = ? AND pending_deletion = 1")
            .bind(page_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_all(&self, page_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM chunks WHERE page_id = ?")
            .bind(page_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(page_id: &str, index: i64, pending: bool) -> ContentChunk {
        ContentChunk {
            chunk_id: format!("{}-{}", page_id, index),
            page_id: page_id.to_string(),
            chunk_index: index,
            text: format!("chunk {}", index),
            section_heading: None,
            pending_deletion: pending,
        }
    }

    #[test]
    fn visible_prefers_live_chunks() {
        let visible = select_visible(vec![
            chunk("p1", 0, true),
            chunk("p1", 1, true),
            chunk("p1", 0, false),
        ]);
        assert_eq!(visible.len(), 1);
        assert!(!visible[0].pending_deletion);
    }

    #[test]
    fn visible_serves_pending_when_nothing_else_exists() {
        let visible = select_visible(vec![chunk("p1", 0, true), chunk("p1", 1, true)]);
        assert_eq!(visible.len(), 2);
    }

    #[tokio::test]
    async fn memory_store_pending_lifecycle() {
        let store = MemoryStore::new();
        store
            .insert_chunks(&[chunk("p1", 0, false), chunk("p1", 1, false)])
            .await
            .unwrap();

        store.mark_pending("p1").await.unwrap();
        assert_eq!(store.count_pending("p1").await.unwrap(), 2);
        // Still served while superseding.
        assert_eq!(store.visible_chunks("p1").await.unwrap().len(), 2);

        store.clear_pending("p1").await.unwrap();
        assert_eq!(store.count_pending("p1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn pages_under_stops_at_path_segments() {
        let store = MemoryStore::new();
        for (id, path) in [
            ("p1", "/Home/Guides"),
            ("p2", "/Home/Guides/Setup"),
            ("p3", "/Home/Guidesbook"),
        ] {
            let page = PageRecord {
                page_id: id.to_string(),
                space_key: "ENG".to_string(),
                title: path.rsplit('/').next().unwrap_or_default().to_string(),
                version: 1,
                last_modified: Utc::now(),
                hierarchy_path: path.to_string(),
                is_deleted: false,
                metadata: serde_json::json!({}),
            };
            store.upsert_page("src1", &page).await.unwrap();
        }

        let under = store.pages_under("/Home/Guides").await.unwrap();
        let ids: Vec<&str> = under.iter().map(|p| p.page_id.as_str()).collect();
        // The shared-title sibling is not a descendant.
        assert_eq!(ids, vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn memory_store_delete_source_cascades() {
        let store = MemoryStore::new();
        let page = PageRecord {
            page_id: "p1".to_string(),
            space_key: "ENG".to_string(),
            title: "Home".to_string(),
            version: 1,
            last_modified: Utc::now(),
            hierarchy_path: "/Home".to_string(),
            is_deleted: false,
            metadata: serde_json::json!({}),
        };
        store.upsert_page("src1", &page).await.unwrap();
        store.insert_chunks(&[chunk("p1", 0, false)]).await.unwrap();

        store.delete_source("src1").await.unwrap();
        assert_eq!(store.page_count(), 0);
        assert_eq!(store.chunk_count(), 0);
    }
}
