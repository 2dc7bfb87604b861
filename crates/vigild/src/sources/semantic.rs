//! Semantic log search over the vector index.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;
use vigil_common::SearchSettings;

#[async_trait]
pub trait SemanticSearch: Send + Sync {
    /// Up to `limit` payloads ranked by similarity to `query_text`
    async fn search(&self, query_text: &str, limit: usize) -> Result<Vec<Value>>;
}

/// Search service reached over HTTP. Posts
/// `{collection, query_text, limit}` to `{url}/search` and accepts either a
/// bare array or `{"result": [...]}`; hits wrapping a `payload` are unwrapped.
pub struct HttpSemanticSearch {
    http_client: reqwest::Client,
    url: String,
    collection: String,
}

impl HttpSemanticSearch {
    pub fn new(settings: &SearchSettings) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            url: settings.url.trim_end_matches('/').to_string(),
            collection: settings.collection.clone(),
        })
    }
}

fn unwrap_hits(body: Value) -> Vec<Value> {
    let hits = match body {
        Value::Array(hits) => hits,
        Value::Object(mut map) => match map.remove("result") {
            Some(Value::Array(hits)) => hits,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    hits.into_iter()
        .map(|hit| match hit {
            Value::Object(mut map) if map.contains_key("payload") => {
                map.remove("payload").unwrap_or(Value::Null)
            }
            other => other,
        })
        .collect()
}

#[async_trait]
impl SemanticSearch for HttpSemanticSearch {
    async fn search(&self, query_text: &str, limit: usize) -> Result<Vec<Value>> {
        info!(
            "Searching for '{}' in collection '{}'",
            query_text, self.collection
        );

        let body: Value = self
            .http_client
            .post(format!("{}/search", self.url))
            .json(&json!({
                "collection": self.collection,
                "query_text": query_text,
                "limit": limit,
            }))
            .send()
            .await
            .context("Failed to reach semantic search")?
            .error_for_status()
            .context("Semantic search returned an error status")?
            .json()
            .await
            .context("Failed to parse semantic search response")?;

        let mut hits = unwrap_hits(body);
        hits.truncate(limit);
        Ok(hits)
    }
}

// ============================================================================
// Fake semantic search (testing)
// ============================================================================

#[derive(Clone, Default)]
pub struct FakeSemanticSearch {
    hits: Vec<Value>,
    fail: bool,
    queries: Arc<Mutex<Vec<(String, usize)>>>,
}

impl FakeSemanticSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hits(hits: Vec<Value>) -> Self {
        Self {
            hits,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SemanticSearch for FakeSemanticSearch {
    async fn search(&self, query_text: &str, limit: usize) -> Result<Vec<Value>> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push((query_text.to_string(), limit));
        }
        if self.fail {
            anyhow::bail!("semantic search unavailable");
        }
        Ok(self.hits.iter().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_hits_shapes() {
        let wrapped = json!({"result": [{"id": 1, "score": 0.9, "payload": {"message": "cpu high"}}]});
        assert_eq!(unwrap_hits(wrapped), vec![json!({"message": "cpu high"})]);

        let bare = json!(["line one", {"message": "x"}]);
        assert_eq!(unwrap_hits(bare).len(), 2);

        assert!(unwrap_hits(json!("nope")).is_empty());
    }

    #[tokio::test]
    async fn test_fake_search_respects_limit() {
        let fake = FakeSemanticSearch::with_hits(vec![json!("a"), json!("b"), json!("c")]);
        let hits = fake.search("CPU", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(fake.queries(), vec![("CPU".to_string(), 2)]);
    }
}
