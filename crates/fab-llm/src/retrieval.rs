//! Retrieval service client
//!
//! The similarity-search backend is external. This module only defines the
//! boundary (`query + k -> ordered fragments`) and a thin HTTP client for it.
//!
//! Request: `POST {url}` with `{"query": "...", "k": 5, "collection": "..."}`.
//!
//! Accepted response shapes:
//! - `{"fragments": [{"text": "..."}, ...]}`
//! - `{"documents": [{"page_content": "..."}, ...]}`
//! - `["...", "..."]`

use anyhow::{Context, Result};
use async_trait::async_trait;
use fab_core::config::RetrievalSettings;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One retrieved document fragment; rank 0 is the most relevant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub text: String,
    pub rank: usize,
}

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Top-k fragments for a free-text query, most relevant first
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Fragment>>;
}

pub type BoxedRetriever = Arc<dyn Retriever>;

/// HTTP similarity-search client
pub struct HttpRetriever {
    client: Client,
    url: String,
    collection: Option<String>,
}

impl HttpRetriever {
    pub fn new(url: impl Into<String>, collection: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            url: url.into(),
            collection,
        }
    }

    pub fn from_settings(settings: &RetrievalSettings) -> Result<Self> {
        let url = settings
            .url
            .clone()
            .filter(|u| !u.is_empty())
            .context("retrieval.url is not configured (set RETRIEVAL_URL)")?;
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build retrieval HTTP client")?;
        Ok(Self {
            client,
            url,
            collection: settings.collection.clone(),
        })
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Fragment>> {
        let mut body = json!({ "query": query, "k": k });
        if let Some(collection) = &self.collection {
            body["collection"] = json!(collection);
        }

        debug!("Retrieval request to {} (k={})", self.url, k);
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .context("Failed to reach retrieval service")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Retrieval service error {}: {}", status, body));
        }

        let value: Value = response
            .json()
            .await
            .context("Failed to parse retrieval response")?;
        let mut fragments = parse_fragments(&value)?;
        fragments.truncate(k);
        Ok(fragments)
    }
}

/// Normalise any accepted response shape into ranked fragments
pub fn parse_fragments(value: &Value) -> Result<Vec<Fragment>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => map
            .get("fragments")
            .or_else(|| map.get("documents"))
            .and_then(Value::as_array)
            .context("retrieval response has neither 'fragments' nor 'documents'")?,
        _ => anyhow::bail!("unexpected retrieval response shape"),
    };

    Ok(items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Object(obj) => obj
                .get("text")
                .or_else(|| obj.get("page_content"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .enumerate()
        .map(|(rank, text)| Fragment { text, rank })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fragment_shapes() {
        let a = parse_fragments(&json!({"fragments": [{"text": "one"}, {"text": "two"}]})).unwrap();
        assert_eq!(a[1], Fragment { text: "two".into(), rank: 1 });

        let b = parse_fragments(&json!({"documents": [{"page_content": "doc"}]})).unwrap();
        assert_eq!(b[0].text, "doc");

        let c = parse_fragments(&json!(["x", 3, {"other": 1}, "y"])).unwrap();
        assert_eq!(c.len(), 2);
        assert_eq!(c[1], Fragment { text: "y".into(), rank: 1 });

        assert!(parse_fragments(&json!({"hits": []})).is_err());
    }

    #[tokio::test]
    async fn test_http_retriever_truncates_to_k() {
        use axum::{routing::post, Json, Router};

        async fn search(Json(body): Json<Value>) -> Json<Value> {
            assert_eq!(body["collection"], "REST_API_CONFIG_GUIDE");
            Json(json!({"fragments": [{"text": "a"}, {"text": "b"}, {"text": "c"}]}))
        }

        let app = Router::new().route("/search", post(search));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let retriever = HttpRetriever::new(
            format!("http://{}/search", addr),
            Some("REST_API_CONFIG_GUIDE".to_string()),
        );
        let fragments = retriever.search("tenants", 2).await.unwrap();
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].text, "a");
    }
}
