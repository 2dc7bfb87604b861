//! Log store client (Loki `query_range`).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Local};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};
use vigil_common::{ConfigError, LogStream};

const QUERY_RANGE_ENDPOINT: &str = "/loki/api/v1/query_range";

/// One time-windowed log query
#[derive(Debug, Clone, PartialEq)]
pub struct LogQuery {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub level: Option<String>,
    pub search_text: Option<String>,
    pub limit: usize,
}

impl LogQuery {
    /// Window ending now
    pub fn last(window: ChronoDuration, limit: usize) -> Self {
        let end = Local::now();
        Self {
            start: end - window,
            end,
            level: None,
            search_text: None,
            limit,
        }
    }

    pub fn with_level(mut self, level: &str) -> Self {
        self.level = Some(level.to_string());
        self
    }

    pub fn with_search(mut self, text: &str) -> Self {
        self.search_text = Some(text.to_string());
        self
    }
}

#[async_trait]
pub trait LogSource: Send + Sync {
    async fn query(&self, query: &LogQuery) -> Result<Vec<LogStream>>;
}

/// LogQL selector for a job, optionally narrowed by level and a
/// case-insensitive search word
pub fn build_logql(job_name: &str, level: Option<&str>, search_word: Option<&str>) -> String {
    let mut logql = format!("{{job=\"{}\"}} | json", job_name);
    if let Some(level) = level {
        logql.push_str(&format!(" | level=\"{}\"", level.to_uppercase()));
    }
    if let Some(word) = search_word {
        logql.push_str(&format!(" |~ \"(?i){}\"", word));
    }
    logql
}

// ============================================================================
// Loki
// ============================================================================

#[derive(Debug, Deserialize)]
struct QueryRangeResponse {
    #[serde(default)]
    status: String,
    data: QueryRangeData,
}

#[derive(Debug, Deserialize)]
struct QueryRangeData {
    #[serde(default)]
    result: Vec<LogStream>,
}

pub struct LokiClient {
    http_client: reqwest::Client,
    base_url: String,
    job_name: String,
}

impl LokiClient {
    pub fn new(base_url: &str, job_name: &str) -> Result<Self> {
        if base_url.trim().is_empty() {
            return Err(ConfigError::EmptyLogSourceUrl.into());
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            job_name: job_name.to_string(),
        })
    }
}

fn nanos(ts: &DateTime<Local>) -> String {
    ts.timestamp_nanos_opt()
        .unwrap_or_else(|| ts.timestamp() * 1_000_000_000)
        .to_string()
}

#[async_trait]
impl LogSource for LokiClient {
    async fn query(&self, query: &LogQuery) -> Result<Vec<LogStream>> {
        let logql = build_logql(
            &self.job_name,
            query.level.as_deref(),
            query.search_text.as_deref(),
        );
        let url = format!("{}{}", self.base_url, QUERY_RANGE_ENDPOINT);
        debug!("Loki query: {}", logql);

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("query", logql),
                ("start", nanos(&query.start)),
                ("end", nanos(&query.end)),
                ("limit", query.limit.to_string()),
                ("direction", "backward".to_string()),
            ])
            .send()
            .await
            .context("Failed to reach log source")?
            .error_for_status()
            .context("Log source returned an error status")?;

        let body: QueryRangeResponse = response
            .json()
            .await
            .context("Failed to parse log source response")?;

        info!(
            "Fetched {} streams from log source (status={})",
            body.data.result.len(),
            body.status
        );
        Ok(body.data.result)
    }
}

// ============================================================================
// Fake log source (testing)
// ============================================================================

/// Canned streams keyed by level (`None` answers unfiltered queries)
#[derive(Clone, Default)]
pub struct FakeLogSource {
    streams: Arc<Mutex<HashMap<Option<String>, Vec<LogStream>>>>,
    failure: Arc<Mutex<Option<String>>>,
    queries: Arc<Mutex<Vec<LogQuery>>>,
}

impl FakeLogSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_streams(self, level: Option<&str>, streams: Vec<LogStream>) -> Self {
        if let Ok(mut map) = self.streams.lock() {
            map.insert(level.map(str::to_string), streams);
        }
        self
    }

    /// Every query fails with `message`
    pub fn failing(self, message: &str) -> Self {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some(message.to_string());
        }
        self
    }

    pub fn queries(&self) -> Vec<LogQuery> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LogSource for FakeLogSource {
    async fn query(&self, query: &LogQuery) -> Result<Vec<LogStream>> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.clone());
        }
        if let Some(message) = self.failure.lock().ok().and_then(|f| f.clone()) {
            anyhow::bail!(message);
        }
        let streams = self
            .streams
            .lock()
            .ok()
            .and_then(|map| map.get(&query.level).cloned())
            .unwrap_or_default();
        Ok(streams)
    }
}
