//! External change-feed boundary.
//!
//! [`ChangeFeed`] is the consumed interface to the wiki: a "what changed
//! since T" query and a cheap existence-only id probe. [`HttpChangeFeed`]
//! talks to the REST API; transient failures (HTTP 429, 5xx, network) are
//! surfaced as [`SyncError::Transient`] so callers can apply
//! [`retry_backoff`].

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::config::FeedConfig;
use crate::error::{Result, SyncError};
use crate::models::RemotePage;

/// The external source's change-feed capability.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Pages in `space_key` modified strictly after `since`, content
    /// included. Order is unspecified.
    async fn changed_since(
        &self,
        space_key: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<RemotePage>>;

    /// Ids of all live pages in `space_key`. No content payload; used
    /// exclusively by the deletion reconciler.
    async fn live_ids(&self, space_key: &str) -> Result<HashSet<String>>;
}

/// Retry a transient-failure-prone operation with bounded exponential
/// backoff: 1s, 2s, 4s, ... (capped at 2^5). Non-transient errors fail
/// immediately; exhausting retries returns the last transient error.
pub async fn retry_backoff<T, F, Fut>(max_retries: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1u64 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                warn!(attempt, error = %e, "transient error, will retry");
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| SyncError::Transient("retries exhausted".into())))
}

#[derive(Debug, Deserialize)]
struct ChangedPagesResponse {
    results: Vec<RemotePage>,
}

#[derive(Debug, Deserialize)]
struct LiveIdsResponse {
    ids: Vec<String>,
}

/// HTTP implementation of [`ChangeFeed`] against the wiki REST API.
pub struct HttpChangeFeed {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpChangeFeed {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: std::env::var(&config.token_env).ok(),
            client,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url).query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SyncError::Transient(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(SyncError::Transient(format!(
                "feed returned HTTP {} for {}",
                status, url
            )));
        }
        if !status.is_success() {
            // Auth/permission/URL problems are setup problems; no retry.
            return Err(SyncError::Config(format!(
                "feed rejected request (HTTP {}) for {}",
                status, url
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SyncError::Transient(format!("invalid feed response from {}: {}", url, e)))
    }
}

#[async_trait]
impl ChangeFeed for HttpChangeFeed {
    async fn changed_since(
        &self,
        space_key: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<RemotePage>> {
        let response: ChangedPagesResponse = self
            .get_json(
                "/api/pages",
                &[
                    ("space", space_key.to_string()),
                    ("modified-since", since.to_rfc3339()),
                ],
            )
            .await?;
        Ok(response.results)
    }

    async fn live_ids(&self, space_key: &str) -> Result<HashSet<String>> {
        let response: LiveIdsResponse = self
            .get_json("/api/pages/ids", &[("space", space_key.to_string())])
            .await?;
        Ok(response.ids.into_iter().collect())
    }
}
