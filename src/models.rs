//! Core data models used throughout wikisync.
//!
//! These types represent the checkpoints, page records, chunks, and metrics
//! that flow through the sync and ingestion pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How externally-deleted pages are detected for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionStrategy {
    /// Diff live ids against stored ids on every sync run.
    EveryRun,
    /// Only diff if at least [`RECONCILE_INTERVAL_DAYS`] have elapsed.
    /// Default; keeps the probe cheap on large sources.
    Periodic,
    /// Never reconcile automatically.
    Manual,
}

impl Default for DeletionStrategy {
    fn default() -> Self {
        DeletionStrategy::Periodic
    }
}

impl DeletionStrategy {
    /// Stable string form used in the checkpoints table.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionStrategy::EveryRun => "every_run",
            DeletionStrategy::Periodic => "periodic",
            DeletionStrategy::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "every_run" => Some(DeletionStrategy::EveryRun),
            "periodic" => Some(DeletionStrategy::Periodic),
            "manual" => Some(DeletionStrategy::Manual),
            _ => None,
        }
    }
}

/// Days between automatic reconciliations under [`DeletionStrategy::Periodic`].
pub const RECONCILE_INTERVAL_DAYS: i64 = 7;

/// Per-source sync cursor. Mutated only after a successful change-detection
/// call; never partially advanced.
#[derive(Debug, Clone)]
pub struct SourceCheckpoint {
    pub source_id: String,
    pub last_sync_at: DateTime<Utc>,
    pub deletion_strategy: DeletionStrategy,
    pub last_reconciled_at: Option<DateTime<Utc>>,
}

impl SourceCheckpoint {
    /// A fresh checkpoint that will pick up every page on the first run.
    pub fn new(source_id: &str, deletion_strategy: DeletionStrategy) -> Self {
        Self {
            source_id: source_id.to_string(),
            last_sync_at: DateTime::<Utc>::UNIX_EPOCH,
            deletion_strategy,
            last_reconciled_at: None,
        }
    }
}

/// A page as the external change feed reports it, content included.
#[derive(Debug, Clone, Deserialize)]
pub struct RemotePage {
    pub id: String,
    pub space_key: String,
    pub title: String,
    pub version: i64,
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Ancestor titles from the root down, excluding this page.
    #[serde(default)]
    pub ancestor_titles: Vec<String>,
    /// Raw storage-format markup.
    pub body: String,
}

impl RemotePage {
    /// Materialized hierarchy path: `/Root/Child/Leaf`.
    ///
    /// Recomputed on every write from the ancestor chain; never derived
    /// from a stored graph. A child's path is always a strict extension
    /// of its parent's.
    pub fn hierarchy_path(&self) -> String {
        materialized_path(&self.ancestor_titles, &self.title)
    }
}

/// Build a materialized path from ancestor titles plus the page title.
/// Slashes inside titles are replaced so the path stays prefix-queryable.
pub fn materialized_path(ancestors: &[String], title: &str) -> String {
    let mut path = String::new();
    for segment in ancestors.iter().map(String::as_str).chain([title]) {
        path.push('/');
        path.push_str(&segment.replace('/', "\u{2215}"));
    }
    path
}

/// Locally stored state for one external page. `page_id` is the external
/// identifier and is immutable; `version` is monotonic per page.
#[derive(Debug, Clone)]
pub struct PageRecord {
    pub page_id: String,
    pub space_key: String,
    pub title: String,
    pub version: i64,
    pub last_modified: DateTime<Utc>,
    pub hierarchy_path: String,
    pub is_deleted: bool,
    pub metadata: serde_json::Value,
}

/// A retrieval-sized fragment of a page's converted Markdown.
#[derive(Debug, Clone)]
pub struct ContentChunk {
    pub chunk_id: String,
    pub page_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub section_heading: Option<String>,
    /// Set while the chunk is being superseded; still served to search.
    pub pending_deletion: bool,
}

/// An issue-tracker reference discovered during extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueRef {
    pub key: String,
    pub url: Option<String>,
}

/// A user mention, deduplicated by account id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mention {
    pub account_id: String,
    pub display_name: Option<String>,
}

/// A link to another page in the same source, deduplicated by target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InternalLink {
    pub target_id: String,
    pub anchor_text: Option<String>,
}

/// Deduplicated relationship metadata for one processed page.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractedMetadata {
    pub issue_refs: Vec<IssueRef>,
    pub mentions: Vec<Mention>,
    pub internal_links: Vec<InternalLink>,
    pub external_links: Vec<String>,
    pub attachments: Vec<String>,
    pub word_count: usize,
    pub char_count: usize,
}

/// Counters and error samples for one sync run. Persisted at run end even
/// on partial failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMetrics {
    pub run_id: String,
    pub source_id: String,
    pub pages_created: u64,
    pub pages_updated: u64,
    pub pages_deleted: u64,
    pub pages_failed: u64,
    pub pages_degraded: u64,
    pub api_calls: u64,
    /// Bounded sample of recent per-page errors.
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Cap on [`SyncMetrics::errors`] so a bad run does not balloon the row.
pub const MAX_ERROR_SAMPLES: usize = 25;

impl SyncMetrics {
    pub fn new(run_id: &str, source_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            source_id: source_id.to_string(),
            pages_created: 0,
            pages_updated: 0,
            pages_deleted: 0,
            pages_failed: 0,
            pages_degraded: 0,
            api_calls: 0,
            errors: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Record a per-page failure, keeping the sample bounded.
    pub fn record_error(&mut self, page_id: &str, err: &crate::error::SyncError) {
        self.pages_failed += 1;
        if self.errors.len() < MAX_ERROR_SAMPLES {
            self.errors.push(format!("{}: {}", page_id, err));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn materialized_path_root_page() {
        assert_eq!(materialized_path(&[], "Home"), "/Home");
    }

    #[test]
    fn materialized_path_nested() {
        let ancestors = vec!["Home".to_string(), "Guides".to_string()];
        assert_eq!(materialized_path(&ancestors, "Setup"), "/Home/Guides/Setup");
    }

    #[test]
    fn child_path_extends_parent_path() {
        let parent_ancestors = vec!["Home".to_string()];
        let parent = materialized_path(&parent_ancestors, "Guides");

        let child_ancestors = vec!["Home".to_string(), "Guides".to_string()];
        let child = materialized_path(&child_ancestors, "Setup");

        assert!(child.starts_with(&parent));
        assert!(child.len() > parent.len());
    }

    #[test]
    fn slash_in_title_does_not_break_prefixes() {
        let path = materialized_path(&[], "CI/CD");
        // One leading separator only; the title slash must not create
        // a phantom hierarchy level.
        assert_eq!(path.matches('/').count(), 1);
    }

    #[test]
    fn error_sample_is_bounded() {
        let mut metrics = SyncMetrics::new("run1", "src1");
        for i in 0..100 {
            metrics.record_error(
                &format!("page-{}", i),
                &crate::error::SyncError::Transient("boom".into()),
            );
        }
        assert_eq!(metrics.pages_failed, 100);
        assert_eq!(metrics.errors.len(), MAX_ERROR_SAMPLES);
    }
}
