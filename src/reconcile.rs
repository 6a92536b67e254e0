//! Deletion reconciliation.
//!
//! The change feed only reports edits, never deletions, so removed pages
//! would otherwise linger in the store forever. Reconciliation fetches the
//! full set of live page ids for a space (ids only, no content) and diffs
//! it against the stored active set: anything stored but not live is
//! soft-deleted and its chunks removed.
//!
//! How often this runs is the source's [`DeletionStrategy`]: on every run,
//! periodically (default, at least [`RECONCILE_INTERVAL_DAYS`] apart), or
//! only when asked explicitly.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::error::Result;
use crate::feed::{retry_backoff, ChangeFeed};
use crate::models::{DeletionStrategy, SourceCheckpoint, RECONCILE_INTERVAL_DAYS};
use crate::store::{ChunkStore, PageStore};

/// What one reconciliation pass did.
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    /// False when the strategy said not to run this time.
    pub ran: bool,
    /// Page ids soft-deleted by this pass.
    pub deleted: Vec<String>,
}

/// Whether the checkpoint's strategy calls for a pass right now.
pub fn is_due(checkpoint: &SourceCheckpoint, now: DateTime<Utc>) -> bool {
    match checkpoint.deletion_strategy {
        DeletionStrategy::EveryRun => true,
        DeletionStrategy::Periodic => match checkpoint.last_reconciled_at {
            // Never reconciled counts as overdue.
            None => true,
            Some(last) => now - last >= Duration::days(RECONCILE_INTERVAL_DAYS),
        },
        DeletionStrategy::Manual => false,
    }
}

/// Run one reconciliation pass if due (or `force`d, as from the CLI).
/// Updates `checkpoint.last_reconciled_at` in memory; persisting the
/// checkpoint is the caller's job.
pub async fn reconcile(
    feed: &dyn ChangeFeed,
    pages: &dyn PageStore,
    chunks: &dyn ChunkStore,
    checkpoint: &mut SourceCheckpoint,
    space_key: &str,
    max_retries: u32,
    force: bool,
) -> Result<ReconcileOutcome> {
    let now = Utc::now();
    if !force && !is_due(checkpoint, now) {
        return Ok(ReconcileOutcome::default());
    }

    let live = retry_backoff(max_retries, || feed.live_ids(space_key)).await?;
    let stored = pages.list_active_page_ids(&checkpoint.source_id).await?;

    let mut deleted = Vec::new();
    for page_id in stored {
        if live.contains(&page_id) {
            continue;
        }
        pages.mark_page_deleted(&page_id).await?;
        chunks.delete_all(&page_id).await?;
        deleted.push(page_id);
    }

    if !deleted.is_empty() {
        info!(
            source_id = %checkpoint.source_id,
            count = deleted.len(),
            "reconciliation removed pages no longer live"
        );
    }

    checkpoint.last_reconciled_at = Some(now);
    Ok(ReconcileOutcome { ran: true, deleted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentChunk, PageRecord};
    use crate::store::{MemoryStore, PageStore};
    use crate::testing::{remote_page, MockFeed};

    fn checkpoint(strategy: DeletionStrategy, last: Option<DateTime<Utc>>) -> SourceCheckpoint {
        SourceCheckpoint {
            source_id: "eng".into(),
            last_sync_at: Utc::now(),
            deletion_strategy: strategy,
            last_reconciled_at: last,
        }
    }

    fn page(id: &str) -> PageRecord {
        PageRecord {
            page_id: id.to_string(),
            space_key: "ENG".into(),
            title: id.to_string(),
            version: 1,
            last_modified: Utc::now(),
            hierarchy_path: format!("/{}", id),
            is_deleted: false,
            metadata: serde_json::Value::Null,
        }
    }

    fn chunk(page_id: &str) -> ContentChunk {
        ContentChunk {
            chunk_id: format!("{}-0", page_id),
            page_id: page_id.to_string(),
            chunk_index: 0,
            text: "body".into(),
            section_heading: None,
            pending_deletion: false,
        }
    }

    #[test]
    fn every_run_is_always_due() {
        assert!(is_due(&checkpoint(DeletionStrategy::EveryRun, None), Utc::now()));
    }

    #[test]
    fn periodic_due_after_interval() {
        let now = Utc::now();
        let cp = checkpoint(DeletionStrategy::Periodic, Some(now - Duration::days(10)));
        assert!(is_due(&cp, now));

        let cp = checkpoint(DeletionStrategy::Periodic, Some(now - Duration::days(2)));
        assert!(!is_due(&cp, now));
    }

    #[test]
    fn periodic_never_reconciled_is_due() {
        assert!(is_due(&checkpoint(DeletionStrategy::Periodic, None), Utc::now()));
    }

    #[test]
    fn manual_is_never_due() {
        assert!(!is_due(&checkpoint(DeletionStrategy::Manual, None), Utc::now()));
    }

    #[tokio::test]
    async fn removes_pages_missing_from_live_set() {
        let store = MemoryStore::new();
        store.upsert_page("eng", &page("p1")).await.unwrap();
        store.upsert_page("eng", &page("p2")).await.unwrap();
        store.insert_chunks(&[chunk("p1"), chunk("p2")]).await.unwrap();

        let feed = MockFeed::new()
            .with_page(remote_page("p1", "P1", 1, "<p>x</p>"))
            .with_live_ids(["p1".to_string()]);

        let mut cp = checkpoint(DeletionStrategy::EveryRun, None);
        let outcome = reconcile(&feed, &store, &store, &mut cp, "ENG", 3, false)
            .await
            .unwrap();

        assert!(outcome.ran);
        assert_eq!(outcome.deleted, vec!["p2".to_string()]);
        assert!(store.get_page("p2").await.unwrap().unwrap().is_deleted);
        assert!(store.visible_chunks("p2").await.unwrap().is_empty());
        // Survivor untouched.
        assert_eq!(store.visible_chunks("p1").await.unwrap().len(), 1);
        assert!(cp.last_reconciled_at.is_some());
    }

    #[tokio::test]
    async fn manual_strategy_skips_unless_forced() {
        let store = MemoryStore::new();
        store.upsert_page("eng", &page("p1")).await.unwrap();

        let feed = MockFeed::new().with_live_ids(Vec::<String>::new());

        let mut cp = checkpoint(DeletionStrategy::Manual, None);
        let outcome = reconcile(&feed, &store, &store, &mut cp, "ENG", 3, false)
            .await
            .unwrap();
        assert!(!outcome.ran);
        assert!(!store.get_page("p1").await.unwrap().unwrap().is_deleted);

        let outcome = reconcile(&feed, &store, &store, &mut cp, "ENG", 3, true)
            .await
            .unwrap();
        assert!(outcome.ran);
        assert!(store.get_page("p1").await.unwrap().unwrap().is_deleted);
    }
}
