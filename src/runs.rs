//! Run lifecycle management.
//!
//! [`RunManager`] is the operation surface above the engine: start a sync
//! and get a run id back, poll a run's status, cancel, and remove a source
//! entirely. At most one run per source is in flight at a time; a second
//! trigger while one is active is rejected with
//! [`SyncError::RunInProgress`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::models::SyncMetrics;
use crate::sync::SyncEngine;

/// Where a triggered run currently stands.
#[derive(Debug)]
pub enum RunStatus {
    InProgress(SyncMetrics),
    Finished(SyncMetrics),
    /// No persisted row for this run id.
    Unknown,
}

pub struct RunManager {
    engine: Arc<SyncEngine>,
    config: Config,
    /// Cancellation handles for in-flight runs, keyed by source id.
    active: Mutex<HashMap<String, CancellationToken>>,
}

impl RunManager {
    pub fn new(engine: Arc<SyncEngine>, config: Config) -> Arc<Self> {
        Arc::new(Self {
            engine,
            config,
            active: Mutex::new(HashMap::new()),
        })
    }

    /// Start a sync for `source_id` in the background and return its run
    /// id. Fails fast on an unknown source or a run already in flight.
    pub fn trigger_sync(self: &Arc<Self>, source_id: &str) -> Result<String> {
        let source = self.config.source(source_id)?.clone();

        let cancel = CancellationToken::new();
        {
            let mut active = self.active.lock().unwrap();
            if active.contains_key(source_id) {
                return Err(SyncError::RunInProgress(source_id.to_string()));
            }
            active.insert(source_id.to_string(), cancel.clone());
        }

        let run_id = Uuid::new_v4().to_string();
        let manager = Arc::clone(self);
        let source_id = source_id.to_string();
        let task_run_id = run_id.clone();
        tokio::spawn(async move {
            let result = manager
                .engine
                .run_sync(&task_run_id, &source_id, &source, cancel)
                .await;
            match result {
                Ok(metrics) => info!(
                    source_id = %source_id,
                    run_id = %task_run_id,
                    failed = metrics.pages_failed,
                    "sync run finished"
                ),
                Err(err) => error!(
                    source_id = %source_id,
                    run_id = %task_run_id,
                    error = %err,
                    "sync run failed"
                ),
            }
            manager.active.lock().unwrap().remove(&source_id);
        });

        Ok(run_id)
    }

    /// Run a sync in the foreground (the CLI path).
    pub async fn run_sync_blocking(
        self: &Arc<Self>,
        source_id: &str,
        cancel: CancellationToken,
    ) -> Result<SyncMetrics> {
        let source = self.config.source(source_id)?.clone();
        {
            let mut active = self.active.lock().unwrap();
            if active.contains_key(source_id) {
                return Err(SyncError::RunInProgress(source_id.to_string()));
            }
            active.insert(source_id.to_string(), cancel.clone());
        }
        let run_id = Uuid::new_v4().to_string();
        let result = self
            .engine
            .run_sync(&run_id, source_id, &source, cancel)
            .await;
        self.active.lock().unwrap().remove(source_id);
        result
    }

    /// Status of a previously triggered run. A run just triggered may
    /// briefly report `Unknown` until its in-progress row lands.
    pub async fn sync_status(&self, run_id: &str) -> Result<RunStatus> {
        Ok(match self.engine.pages().get_run(run_id).await? {
            Some(metrics) if metrics.finished_at.is_some() => RunStatus::Finished(metrics),
            Some(metrics) => RunStatus::InProgress(metrics),
            None => RunStatus::Unknown,
        })
    }

    /// Most recent run for a source, if any.
    pub async fn latest_run(&self, source_id: &str) -> Result<Option<SyncMetrics>> {
        self.engine.pages().latest_run(source_id).await
    }

    /// Ask an in-flight run for `source_id` to stop at the next page
    /// boundary. No-op when nothing is running.
    pub fn cancel(&self, source_id: &str) {
        if let Some(token) = self.active.lock().unwrap().get(source_id) {
            token.cancel();
        }
    }

    /// Remove a source and everything derived from it: pages, chunks,
    /// checkpoint. An in-flight run is cancelled first.
    pub async fn delete_source(&self, source_id: &str) -> Result<()> {
        self.cancel(source_id);
        self.engine.pages().delete_source(source_id).await?;
        info!(source_id, "source deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChunkingConfig, DbConfig, FeedConfig, SourceConfig, SyncConfig};
    use crate::models::DeletionStrategy;
    use crate::progress::NoProgress;
    use crate::store::{MemoryStore, PageStore};
    use crate::sync::SyncOptions;
    use crate::testing::{remote_page, MockFeed};

    fn test_config() -> Config {
        Config {
            db: DbConfig {
                path: "unused.sqlite".into(),
            },
            feed: FeedConfig {
                base_url: "https://wiki.example.com".into(),
                token_env: "WIKISYNC_TOKEN".into(),
                timeout_secs: 30,
                max_retries: 2,
            },
            sync: SyncConfig::default(),
            chunking: ChunkingConfig::default(),
            sources: [(
                "eng".to_string(),
                SourceConfig {
                    space_key: "ENG".into(),
                    deletion_strategy: DeletionStrategy::Manual,
                },
            )]
            .into_iter()
            .collect(),
        }
    }

    fn manager(store: Arc<MemoryStore>, feed: Arc<MockFeed>) -> Arc<RunManager> {
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            store,
            feed,
            Arc::new(NoProgress),
            SyncOptions {
                concurrency: 2,
                progress_every: 25,
                max_retries: 2,
                max_tokens: 700,
            },
        ));
        RunManager::new(engine, test_config())
    }

    #[tokio::test]
    async fn blocking_run_syncs_and_reports_finished() {
        let store = Arc::new(MemoryStore::new());
        let feed = Arc::new(
            MockFeed::new().with_page(remote_page("p1", "Alpha", 1, "<p>x</p>")),
        );
        let manager = manager(store.clone(), feed);

        let metrics = manager
            .run_sync_blocking("eng", CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(metrics.pages_created, 1);

        match manager.sync_status(&metrics.run_id).await.unwrap() {
            RunStatus::Finished(m) => assert_eq!(m.pages_created, 1),
            other => panic!("expected finished, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_source_fails_fast() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(store, Arc::new(MockFeed::new()));
        let err = manager.trigger_sync("nope").unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[tokio::test]
    async fn concurrent_same_source_run_rejected() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(store, Arc::new(MockFeed::new()));

        // Hold the slot as an in-flight run would.
        manager
            .active
            .lock()
            .unwrap()
            .insert("eng".to_string(), CancellationToken::new());

        let err = manager.trigger_sync("eng").unwrap_err();
        assert!(matches!(err, SyncError::RunInProgress(_)));
        let err = manager
            .run_sync_blocking("eng", CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::RunInProgress(_)));
    }

    #[tokio::test]
    async fn unknown_run_id_reports_unknown() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(store, Arc::new(MockFeed::new()));
        assert!(matches!(
            manager.sync_status("missing").await.unwrap(),
            RunStatus::Unknown
        ));
    }

    #[tokio::test]
    async fn delete_source_cascades() {
        let store = Arc::new(MemoryStore::new());
        let feed = Arc::new(
            MockFeed::new().with_page(remote_page("p1", "Alpha", 1, "<p>x</p>")),
        );
        let manager = manager(store.clone(), feed);

        manager
            .run_sync_blocking("eng", CancellationToken::new())
            .await
            .unwrap();
        assert!(store.get_page("p1").await.unwrap().is_some());

        manager.delete_source("eng").await.unwrap();
        assert!(store.get_page("p1").await.unwrap().is_none());
        assert!(store.get_checkpoint("eng").await.unwrap().is_none());
        use crate::store::ChunkStore;
        assert!(store.visible_chunks("p1").await.unwrap().is_empty());
    }
}
