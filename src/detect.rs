//! Change detection against the external feed.
//!
//! Queries pages modified since the checkpoint and classifies each one
//! against the locally stored version: unknown page → create, newer
//! version → update, same-or-older version → ignored (idempotent replay).
//! Feed calls go through the retry/backoff policy; if retries are
//! exhausted the whole detection call fails and the caller must not
//! advance the checkpoint.

use tracing::debug;

use crate::error::Result;
use crate::feed::{retry_backoff, ChangeFeed};
use crate::models::{RemotePage, SourceCheckpoint};
use crate::store::PageStore;

/// Classified output of one detection call.
#[derive(Debug, Default)]
pub struct ChangeSet {
    pub creates: Vec<RemotePage>,
    pub updates: Vec<RemotePage>,
    /// Pages whose reported version is ≤ the stored version.
    pub ignored: u64,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty()
    }

    pub fn total(&self) -> u64 {
        (self.creates.len() + self.updates.len()) as u64
    }
}

pub async fn detect_changes(
    feed: &dyn ChangeFeed,
    pages: &dyn PageStore,
    checkpoint: &SourceCheckpoint,
    space_key: &str,
    max_retries: u32,
) -> Result<ChangeSet> {
    let changed = retry_backoff(max_retries, || {
        feed.changed_since(space_key, checkpoint.last_sync_at)
    })
    .await?;

    let mut set = ChangeSet::default();

    for page in changed {
        match pages.get_page_version(&page.id).await? {
            None => set.creates.push(page),
            Some(stored) if page.version > stored => set.updates.push(page),
            Some(stored) => {
                debug!(
                    page_id = %page.id,
                    remote = page.version,
                    stored,
                    "ignoring replayed page"
                );
                set.ignored += 1;
            }
        }
    }

    Ok(set)
}
