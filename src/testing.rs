//! Mock collaborators for tests.
//!
//! [`MockFeed`] is an in-memory [`ChangeFeed`] with scripted pages,
//! transient-failure injection, and an api-call counter. Used by the unit
//! tests here and the integration tests under `tests/`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{Result, SyncError};
use crate::feed::ChangeFeed;
use crate::models::RemotePage;

/// Build a remote page with sensible test defaults in space `ENG`.
pub fn remote_page(id: &str, title: &str, version: i64, body: &str) -> RemotePage {
    RemotePage {
        id: id.to_string(),
        space_key: "ENG".to_string(),
        title: title.to_string(),
        version,
        modified: Utc::now(),
        author: Some("test-user".to_string()),
        parent_id: None,
        ancestor_titles: Vec::new(),
        body: body.to_string(),
    }
}

/// Scriptable in-memory change feed.
pub struct MockFeed {
    pages: Mutex<Vec<RemotePage>>,
    /// Live ids override; when unset, ids derive from the scripted pages.
    live: Mutex<Option<HashSet<String>>>,
    fail_next: AtomicU32,
    calls: AtomicU64,
}

impl MockFeed {
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(Vec::new()),
            live: Mutex::new(None),
            fail_next: AtomicU32::new(0),
            calls: AtomicU64::new(0),
        }
    }

    pub fn with_page(self, page: RemotePage) -> Self {
        self.pages.lock().unwrap().push(page);
        self
    }

    pub fn with_live_ids<I: IntoIterator<Item = String>>(self, ids: I) -> Self {
        *self.live.lock().unwrap() = Some(ids.into_iter().collect());
        self
    }

    /// Make the next `n` feed calls fail with a transient error.
    pub fn fail_next(self, n: u32) -> Self {
        self.fail_next.store(n, Ordering::SeqCst);
        self
    }

    /// Replace the scripted pages after construction.
    pub fn set_pages(&self, pages: Vec<RemotePage>) {
        *self.pages.lock().unwrap() = pages;
    }

    pub fn set_live_ids<I: IntoIterator<Item = String>>(&self, ids: I) {
        *self.live.lock().unwrap() = Some(ids.into_iter().collect());
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn check_failure(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(SyncError::Transient("injected feed failure".into()));
        }
        Ok(())
    }
}

impl Default for MockFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChangeFeed for MockFeed {
    async fn changed_since(
        &self,
        space_key: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<RemotePage>> {
        self.check_failure()?;
        Ok(self
            .pages
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.space_key == space_key && p.modified > since)
            .cloned()
            .collect())
    }

    async fn live_ids(&self, space_key: &str) -> Result<HashSet<String>> {
        self.check_failure()?;
        if let Some(ids) = self.live.lock().unwrap().as_ref() {
            return Ok(ids.clone());
        }
        Ok(self
            .pages
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.space_key == space_key)
            .map(|p| p.id.clone())
            .collect())
    }
}
