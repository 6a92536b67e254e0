//! Sync orchestration.
//!
//! One run of [`SyncEngine::run_sync`] drives the whole pipeline for a
//! single source:
//!
//! 1. load the checkpoint (fresh sources start at the epoch),
//! 2. detect changes against the feed; a detection failure aborts the
//!    run with the checkpoint untouched,
//! 3. process changed pages on a bounded worker pool (convert, extract,
//!    chunk, replace), one writer per page, failures isolated per page,
//! 4. reconcile deletions per the source's strategy,
//! 5. advance the checkpoint to the run's start time and persist metrics.
//!
//! The checkpoint moves to the moment detection started, not the newest
//! page timestamp: overlap on the next run is free because replaying a
//! page at or below its stored version is a no-op. Cancellation is
//! honored at page boundaries; pages already in flight complete.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chunk::chunk_markdown;
use crate::config::{Config, SourceConfig};
use crate::detect::detect_changes;
use crate::error::{Result, SyncError};
use crate::feed::ChangeFeed;
use crate::markup;
use crate::metadata;
use crate::models::{PageRecord, RemotePage, SyncMetrics};
use crate::progress::{percent, ProgressEvent, ProgressReporter};
use crate::reconcile;
use crate::replace::replace_page_chunks;
use crate::store::{ChunkStore, PageStore};

/// Tunables lifted out of [`Config`] so the engine does not carry the
/// whole config around.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub concurrency: usize,
    pub progress_every: u64,
    pub max_retries: u32,
    pub max_tokens: usize,
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.sync.concurrency,
            progress_every: config.sync.progress_every,
            max_retries: config.feed.max_retries,
            max_tokens: config.chunking.max_tokens,
        }
    }
}

pub struct SyncEngine {
    pages: Arc<dyn PageStore>,
    chunks: Arc<dyn ChunkStore>,
    feed: Arc<dyn ChangeFeed>,
    progress: Arc<dyn ProgressReporter>,
    opts: SyncOptions,
    /// One async mutex per page id: a page is only ever written by one
    /// worker at a time, even across overlapping runs.
    page_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SyncEngine {
    pub fn new(
        pages: Arc<dyn PageStore>,
        chunks: Arc<dyn ChunkStore>,
        feed: Arc<dyn ChangeFeed>,
        progress: Arc<dyn ProgressReporter>,
        opts: SyncOptions,
    ) -> Self {
        Self {
            pages,
            chunks,
            feed,
            progress,
            opts,
            page_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn pages(&self) -> &Arc<dyn PageStore> {
        &self.pages
    }

    fn page_lock(&self, page_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.page_locks.lock().unwrap();
        locks.entry(page_id.to_string()).or_default().clone()
    }

    fn report(&self, status: &'static str, pct: u8, message: String) {
        self.progress.report(ProgressEvent {
            status,
            percent: pct,
            message,
        });
    }

    /// Run one full sync for `source_id`. Returns the run's metrics; the
    /// metrics row is persisted even when the run ends in an error.
    pub async fn run_sync(
        self: &Arc<Self>,
        run_id: &str,
        source_id: &str,
        source: &SourceConfig,
        cancel: CancellationToken,
    ) -> Result<SyncMetrics> {
        let mut metrics = SyncMetrics::new(run_id, source_id);
        // In-progress row so status queries can see the run immediately.
        self.pages.persist_run(&metrics).await?;

        let mut checkpoint = self
            .pages
            .get_checkpoint(source_id)
            .await?
            .unwrap_or_else(|| {
                crate::models::SourceCheckpoint::new(source_id, source.deletion_strategy)
            });
        // Config is authoritative for the strategy.
        checkpoint.deletion_strategy = source.deletion_strategy;

        // Checkpoint candidate, captured before the feed call so edits
        // racing the call are picked up next run.
        let next_sync_at = Utc::now();

        self.report("detecting", 0, format!("detecting changes in {}", source.space_key));
        metrics.api_calls += 1;
        let changes = match detect_changes(
            self.feed.as_ref(),
            self.pages.as_ref(),
            &checkpoint,
            &source.space_key,
            self.opts.max_retries,
        )
        .await
        {
            Ok(changes) => changes,
            Err(err) => {
                // Abort: checkpoint untouched, metrics still persisted.
                metrics.errors.push(format!("change detection: {}", err));
                metrics.finished_at = Some(Utc::now());
                self.pages.persist_run(&metrics).await?;
                return Err(err);
            }
        };

        let total = changes.total();
        info!(
            source_id,
            creates = changes.creates.len(),
            updates = changes.updates.len(),
            ignored = changes.ignored,
            "change detection complete"
        );

        let semaphore = Arc::new(Semaphore::new(self.opts.concurrency));
        let mut tasks: JoinSet<(String, bool, Result<bool>)> = JoinSet::new();

        let work = changes
            .creates
            .into_iter()
            .map(|p| (p, false))
            .chain(changes.updates.into_iter().map(|p| (p, true)));
        for (page, is_update) in work {
            let engine = Arc::clone(self);
            let source_id = source_id.to_string();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                if cancel.is_cancelled() {
                    return (page.id.clone(), is_update, Err(SyncError::Cancelled));
                }
                let lock = engine.page_lock(&page.id);
                let _guard = lock.lock().await;
                let result = engine.process_page(&source_id, &page).await;
                (page.id, is_update, result)
            });
        }

        let mut done: u64 = 0;
        let mut skipped: u64 = 0;
        while let Some(joined) = tasks.join_next().await {
            let (page_id, is_update, result) = match joined {
                Ok(tuple) => tuple,
                Err(join_err) => {
                    metrics.pages_failed += 1;
                    metrics.errors.push(format!("worker panicked: {}", join_err));
                    continue;
                }
            };
            done += 1;
            match result {
                Ok(degraded) => {
                    if is_update {
                        metrics.pages_updated += 1;
                    } else {
                        metrics.pages_created += 1;
                    }
                    if degraded {
                        metrics.pages_degraded += 1;
                    }
                }
                Err(SyncError::Cancelled) => skipped += 1,
                Err(err) => {
                    warn!(page_id = %page_id, error = %err, "page failed; continuing");
                    metrics.record_error(&page_id, &err);
                }
            }
            if done % self.opts.progress_every == 0 || done == total {
                self.report(
                    "syncing",
                    percent(done, total),
                    format!("{} / {} pages", done, total),
                );
            }
        }
        if skipped > 0 {
            info!(source_id, skipped, "cancellation requested; remaining pages skipped");
        }

        // Workers are done; drop lock entries no overlapping run still
        // holds so the map does not grow with every page ever synced.
        self.page_locks
            .lock()
            .unwrap()
            .retain(|_, lock| Arc::strong_count(lock) > 1);

        if !cancel.is_cancelled() {
            self.report("reconciling", percent(done, total.max(1)), "checking for deletions".into());
            match reconcile::reconcile(
                self.feed.as_ref(),
                self.pages.as_ref(),
                self.chunks.as_ref(),
                &mut checkpoint,
                &source.space_key,
                self.opts.max_retries,
                false,
            )
            .await
            {
                Ok(outcome) => {
                    if outcome.ran {
                        metrics.api_calls += 1;
                        metrics.pages_deleted += outcome.deleted.len() as u64;
                    }
                }
                // Reconciliation failure loses one pass, not the run.
                Err(err) => {
                    warn!(source_id, error = %err, "reconciliation failed; will retry next time");
                    metrics.errors.push(format!("reconciliation: {}", err));
                }
            }
        }

        // Advance only after detection succeeded; a cancelled run keeps
        // the old cursor so skipped pages are seen again.
        if !cancel.is_cancelled() {
            checkpoint.last_sync_at = next_sync_at;
            if let Err(err) = self.pages.put_checkpoint(&checkpoint).await {
                metrics.errors.push(format!("checkpoint persist: {}", err));
                metrics.finished_at = Some(Utc::now());
                self.pages.persist_run(&metrics).await?;
                return Err(err);
            }
        }

        metrics.finished_at = Some(Utc::now());
        self.pages.persist_run(&metrics).await?;
        self.report(
            "completed",
            100,
            format!(
                "{} created, {} updated, {} deleted, {} failed",
                metrics.pages_created,
                metrics.pages_updated,
                metrics.pages_deleted,
                metrics.pages_failed
            ),
        );
        Ok(metrics)
    }

    /// Convert, extract, persist, and re-chunk a single changed page.
    async fn process_page(&self, source_id: &str, page: &RemotePage) -> Result<bool> {
        // Monotonic guard: a replay at or below the stored version is a
        // no-op even if classification raced another writer.
        let stored = self.pages.get_page_version(&page.id).await?;
        if let Some(stored) = stored {
            if page.version <= stored {
                debug!(page_id = %page.id, version = page.version, stored, "replay ignored");
                return Ok(false);
            }
        }

        let processed = markup::process(&page.body, &page.id);
        let extracted = metadata::aggregate(&processed.candidates, &processed.markdown);

        // The page row must exist before its chunks can reference it, but
        // the version advances only after the chunk set commits. A chunk
        // failure leaves the stored version behind the remote one, so the
        // page stays due for retry on the next run.
        let mut record = PageRecord {
            page_id: page.id.clone(),
            space_key: page.space_key.clone(),
            title: page.title.clone(),
            version: stored.unwrap_or(0),
            last_modified: page.modified,
            hierarchy_path: page.hierarchy_path(),
            is_deleted: false,
            metadata: serde_json::to_value(&extracted).map_err(SyncError::storage)?,
        };
        self.pages.upsert_page(source_id, &record).await?;

        let chunks = chunk_markdown(&page.id, &processed.markdown, self.opts.max_tokens);
        replace_page_chunks(self.chunks.as_ref(), &page.id, &chunks).await?;

        record.version = page.version;
        self.pages.upsert_page(source_id, &record).await?;

        Ok(processed.degraded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeletionStrategy;
    use crate::progress::NoProgress;
    use crate::store::MemoryStore;
    use crate::testing::{remote_page, MockFeed};

    fn engine(store: Arc<MemoryStore>, feed: Arc<MockFeed>) -> Arc<SyncEngine> {
        Arc::new(SyncEngine::new(
            store.clone(),
            store,
            feed,
            Arc::new(NoProgress),
            SyncOptions {
                concurrency: 4,
                progress_every: 25,
                max_retries: 2,
                max_tokens: 700,
            },
        ))
    }

    fn source(strategy: DeletionStrategy) -> SourceConfig {
        SourceConfig {
            space_key: "ENG".into(),
            deletion_strategy: strategy,
        }
    }

    #[tokio::test]
    async fn first_run_creates_pages_and_chunks() {
        let store = Arc::new(MemoryStore::new());
        let feed = Arc::new(
            MockFeed::new()
                .with_page(remote_page("p1", "Alpha", 1, "<p>alpha body</p>"))
                .with_page(remote_page("p2", "Beta", 1, "<p>beta body</p>"))
                .with_live_ids(["p1".to_string(), "p2".to_string()]),
        );
        let engine = engine(store.clone(), feed);

        let metrics = engine
            .run_sync("r1", "eng", &source(DeletionStrategy::Manual), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(metrics.pages_created, 2);
        assert_eq!(metrics.pages_failed, 0);
        let visible = store.visible_chunks("p1").await.unwrap();
        assert_eq!(visible.len(), 1);
        assert!(visible[0].text.contains("alpha body"));
        assert!(store.get_checkpoint("eng").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn replaying_same_versions_is_a_noop() {
        let store = Arc::new(MemoryStore::new());
        let feed = Arc::new(
            MockFeed::new().with_page(remote_page("p1", "Alpha", 3, "<p>v3</p>")),
        );
        let engine = engine(store.clone(), feed.clone());
        let src = source(DeletionStrategy::Manual);

        engine
            .run_sync("r1", "eng", &src, CancellationToken::new())
            .await
            .unwrap();
        let before = store.visible_chunks("p1").await.unwrap();

        // Same pages come back (checkpoint overlap); nothing changes.
        let metrics = engine
            .run_sync("r2", "eng", &src, CancellationToken::new())
            .await
            .unwrap();
        let after = store.visible_chunks("p1").await.unwrap();
        assert_eq!(metrics.pages_failed, 0);
        assert_eq!(
            before.iter().map(|c| &c.chunk_id).collect::<Vec<_>>(),
            after.iter().map(|c| &c.chunk_id).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn update_replaces_chunk_set() {
        let store = Arc::new(MemoryStore::new());
        let feed = Arc::new(
            MockFeed::new().with_page(remote_page("p1", "Alpha", 1, "<p>old text</p>")),
        );
        let engine = engine(store.clone(), feed.clone());
        let src = source(DeletionStrategy::Manual);

        engine
            .run_sync("r1", "eng", &src, CancellationToken::new())
            .await
            .unwrap();

        feed.set_pages(vec![remote_page("p1", "Alpha", 2, "<p>new text</p>")]);
        let metrics = engine
            .run_sync("r2", "eng", &src, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(metrics.pages_updated, 1);

        let visible = store.visible_chunks("p1").await.unwrap();
        assert_eq!(visible.len(), 1);
        assert!(visible[0].text.contains("new text"));
        assert!(!visible[0].text.contains("old text"));
    }

    #[tokio::test]
    async fn degraded_page_counts_as_success() {
        let store = Arc::new(MemoryStore::new());
        // Unterminated code macro: placeholder, not failure.
        let body = r#"<p>ok</p><ac:structured-macro ac:name="code"><ac:plain-text-body>"#;
        let feed = Arc::new(MockFeed::new().with_page(remote_page("p1", "Alpha", 1, body)));
        let engine = engine(store.clone(), feed);

        let metrics = engine
            .run_sync("r1", "eng", &source(DeletionStrategy::Manual), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(metrics.pages_created, 1);
        assert_eq!(metrics.pages_degraded, 1);
        assert_eq!(metrics.pages_failed, 0);
    }

    #[tokio::test]
    async fn detection_failure_aborts_without_advancing_checkpoint() {
        let store = Arc::new(MemoryStore::new());
        // More transient failures than retries.
        let feed = Arc::new(
            MockFeed::new()
                .with_page(remote_page("p1", "Alpha", 1, "<p>x</p>"))
                .fail_next(10),
        );
        let engine = engine(store.clone(), feed);

        let err = engine
            .run_sync("r1", "eng", &source(DeletionStrategy::Manual), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(store.get_checkpoint("eng").await.unwrap().is_none());
        // Metrics persisted despite the abort.
        let run = store.get_run("r1").await.unwrap().unwrap();
        assert!(run.finished_at.is_some());
        assert!(!run.errors.is_empty());
    }

    #[tokio::test]
    async fn pre_cancelled_run_skips_pages_and_keeps_cursor() {
        let store = Arc::new(MemoryStore::new());
        let feed = Arc::new(
            MockFeed::new().with_page(remote_page("p1", "Alpha", 1, "<p>x</p>")),
        );
        let engine = engine(store.clone(), feed);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let metrics = engine
            .run_sync("r1", "eng", &source(DeletionStrategy::Manual), cancel)
            .await
            .unwrap();
        assert_eq!(metrics.pages_created, 0);
        assert_eq!(metrics.pages_failed, 0);
        // Cursor untouched so the skipped page reappears next run.
        assert!(store.get_checkpoint("eng").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn page_lock_map_is_emptied_after_a_run() {
        let store = Arc::new(MemoryStore::new());
        let feed = Arc::new(
            MockFeed::new()
                .with_page(remote_page("p1", "Alpha", 1, "<p>x</p>"))
                .with_page(remote_page("p2", "Beta", 1, "<p>y</p>")),
        );
        let engine = engine(store, feed);

        engine
            .run_sync("r1", "eng", &source(DeletionStrategy::Manual), CancellationToken::new())
            .await
            .unwrap();

        assert!(engine.page_locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn every_run_strategy_deletes_missing_pages() {
        let store = Arc::new(MemoryStore::new());
        let feed = Arc::new(
            MockFeed::new()
                .with_page(remote_page("p1", "Alpha", 1, "<p>x</p>"))
                .with_page(remote_page("p2", "Beta", 1, "<p>y</p>"))
                .with_live_ids(["p1".to_string(), "p2".to_string()]),
        );
        let engine = engine(store.clone(), feed.clone());
        let src = source(DeletionStrategy::EveryRun);

        engine
            .run_sync("r1", "eng", &src, CancellationToken::new())
            .await
            .unwrap();

        // p2 disappears from the remote.
        feed.set_pages(vec![]);
        feed.set_live_ids(["p1".to_string()]);
        let metrics = engine
            .run_sync("r2", "eng", &src, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(metrics.pages_deleted, 1);
        assert!(store.get_page("p2").await.unwrap().unwrap().is_deleted);
        assert!(store.visible_chunks("p2").await.unwrap().is_empty());
    }
}
