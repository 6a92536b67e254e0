//! Zero-downtime chunk replacement.
//!
//! A page's chunk set moves through three states:
//!
//! - **Active**: current chunks served, nothing pending.
//! - **Superseding**: old chunks flagged `pending_deletion` but still
//!   served; the new set is being written.
//! - **Committed**: new chunks inserted atomically, old ones physically
//!   removed.
//!
//! Search visibility flips from the old set to the new set in a single
//! step (see `select_visible` in [`crate::store`]); a reader never sees an
//! empty set or a mix of old and new. Any failure before the new set is
//! inserted rolls back by clearing the pending flags, leaving the old
//! chunks authoritative.

use tracing::warn;

use crate::error::{Result, SyncError};
use crate::models::ContentChunk;
use crate::store::ChunkStore;

/// Replace a page's chunk set with `new_chunks`, atomically from the
/// point of view of search.
pub async fn replace_page_chunks(
    store: &dyn ChunkStore,
    page_id: &str,
    new_chunks: &[ContentChunk],
) -> Result<()> {
    // Replacing with nothing would leave the page unsearchable mid-flight;
    // deletion goes through its own path.
    if new_chunks.is_empty() {
        return Err(SyncError::Consistency {
            page_id: page_id.to_string(),
            detail: "refusing to replace chunk set with an empty set".into(),
        });
    }
    if let Some(stray) = new_chunks.iter().find(|c| c.page_id != page_id) {
        return Err(SyncError::Consistency {
            page_id: page_id.to_string(),
            detail: format!("new chunk addressed to foreign page {}", stray.page_id),
        });
    }

    // Pending chunks before we started means an earlier replacement died
    // between mark and commit. Roll back to Active and fail this page;
    // the next run retries from a clean state.
    let stale = store.count_pending(page_id).await?;
    if stale > 0 {
        warn!(page_id, stale, "pending flags from an interrupted replacement; rolling back");
        store.clear_pending(page_id).await?;
        return Err(SyncError::Consistency {
            page_id: page_id.to_string(),
            detail: format!("{} chunks already pending deletion", stale),
        });
    }

    store.mark_pending(page_id).await?;

    if let Err(err) = store.insert_chunks(new_chunks).await {
        // Insert is all-or-nothing, so the old set is still intact;
        // un-mark it and report the failure.
        if let Err(rollback_err) = store.clear_pending(page_id).await {
            warn!(page_id, error = %rollback_err, "rollback after failed insert also failed");
        }
        return Err(err);
    }

    store.delete_pending(page_id).await?;
    Ok(())
}
