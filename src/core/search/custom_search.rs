use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::SearchProvider;
use crate::core::error::ProbeError;

/// The API serves at most ten results per page and refuses `start` past 91.
const PAGE_SIZE: usize = 10;
const MAX_START: usize = 91;

/// Google Custom Search JSON API.
pub struct CustomSearchProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    engine_id: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    link: String,
}

impl CustomSearchProvider {
    pub fn new(
        endpoint: String,
        api_key: String,
        engine_id: String,
        timeout: Duration,
    ) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Request(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            engine_id,
            timeout,
        })
    }

    async fn fetch_page(
        &self,
        keyword: &str,
        start: usize,
        num: usize,
    ) -> Result<Vec<String>, ProbeError> {
        let num = num.to_string();
        let start = start.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", keyword),
                ("num", num.as_str()),
                ("start", start.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ProbeError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProbeError::Request(e.to_string()))?;
        if !status.is_success() {
            return Err(ProbeError::Request(format!("HTTP {}: {}", status, body)));
        }

        let page: SearchPage =
            serde_json::from_str(&body).map_err(|e| ProbeError::Malformed(e.to_string()))?;
        Ok(page.items.into_iter().map(|i| i.link).collect())
    }

    async fn collect(&self, keyword: &str, limit: usize) -> Result<Vec<String>, ProbeError> {
        let mut urls = Vec::with_capacity(limit);
        let mut start = 1;
        while urls.len() < limit && start <= MAX_START {
            let num = (limit - urls.len()).min(PAGE_SIZE);
            let page = self.fetch_page(keyword, start, num).await?;
            debug!("'{}' page at {} returned {} result(s)", keyword, start, page.len());
            if page.is_empty() {
                break;
            }
            start += page.len();
            urls.extend(page);
        }
        urls.truncate(limit);
        Ok(urls)
    }
}

#[async_trait]
impl SearchProvider for CustomSearchProvider {
    async fn search(&self, keyword: &str, limit: u32) -> Result<Vec<String>, ProbeError> {
        tokio::time::timeout(self.timeout, self.collect(keyword, limit as usize))
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout.as_secs()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::{Json, Router, routing::get};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<HashMap<String, String>>>>;

    /// Serves `total` numbered results for any query.
    async fn spawn_mock_search(total: usize, fail: bool) -> (String, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let app = Router::new().route(
            "/customsearch/v1",
            get(move |Query(q): Query<HashMap<String, String>>| {
                let recorder = recorder.clone();
                async move {
                    recorder.lock().unwrap().push(q.clone());
                    if fail {
                        return (
                            StatusCode::TOO_MANY_REQUESTS,
                            Json(serde_json::json!({ "error": { "code": 429 } })),
                        );
                    }
                    let start: usize = q["start"].parse().unwrap();
                    let num: usize = q["num"].parse().unwrap();
                    let items: Vec<_> = (start..start + num)
                        .filter(|i| *i <= total)
                        .map(|i| serde_json::json!({ "link": format!("https://site{}.com/", i) }))
                        .collect();
                    (StatusCode::OK, Json(serde_json::json!({ "items": items })))
                }
            }),
        );
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://127.0.0.1:{}/customsearch/v1", port), seen)
    }

    fn provider(endpoint: String) -> CustomSearchProvider {
        CustomSearchProvider::new(
            endpoint,
            "key".to_string(),
            "cx".to_string(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn pages_until_limit() {
        let (endpoint, seen) = spawn_mock_search(100, false).await;
        let urls = provider(endpoint).search("rust", 15).await.unwrap();
        assert_eq!(urls.len(), 15);
        assert_eq!(urls[0], "https://site1.com/");
        assert_eq!(urls[14], "https://site15.com/");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0]["start"], "1");
        assert_eq!(seen[0]["num"], "10");
        assert_eq!(seen[1]["start"], "11");
        assert_eq!(seen[1]["num"], "5");
        assert_eq!(seen[0]["q"], "rust");
        assert_eq!(seen[0]["cx"], "cx");
    }

    #[tokio::test]
    async fn stops_on_empty_page() {
        let (endpoint, seen) = spawn_mock_search(12, false).await;
        let urls = provider(endpoint).search("rust", 30).await.unwrap();
        assert_eq!(urls.len(), 12);
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn error_status_is_a_probe_error() {
        let (endpoint, _) = spawn_mock_search(10, true).await;
        let err = provider(endpoint).search("rust", 10).await.unwrap_err();
        match err {
            ProbeError::Request(msg) => assert!(msg.contains("429"), "{}", msg),
            other => panic!("expected Request, got {:?}", other),
        }
    }
}
