//! HTTP fetch adapter for the external feed API
//!
//! Implements the core `FetchClient` port against the taxonomy/search API.
//! Pagination is cursor-based: every page hands back an opaque token that is
//! echoed on the next request. Response statuses are mapped onto the sync
//! error taxonomy so the orchestrator can classify run failures.

use std::time::Duration;

use async_trait::async_trait;
use jobfeed_core::{FetchClient, SyncError};
use jobfeed_domain::{FeedApiConfig, FetchedBatch, JobFeedError, JobUnit, Result, SyncType};
use reqwest::{Client as ReqwestClient, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// One page of the feed API wire format.
#[derive(Debug, Deserialize)]
struct FeedPage {
    items: Vec<FeedItem>,
    #[serde(default)]
    next_cursor: Option<String>,
    #[serde(default)]
    has_more: bool,
}

/// A single unit on the wire; everything beyond the id rides along as the
/// opaque payload.
#[derive(Debug, Deserialize)]
struct FeedItem {
    id: String,
    #[serde(flatten)]
    payload: serde_json::Value,
}

/// Feed API client backed by `reqwest`.
#[derive(Clone)]
pub struct HttpFeedClient {
    client: ReqwestClient,
    base_url: String,
    page_size: usize,
    timeout: Duration,
}

impl HttpFeedClient {
    /// Build a client from feed configuration.
    ///
    /// # Errors
    /// Returns `JobFeedError::Config` if the underlying HTTP client cannot
    /// be constructed.
    pub fn new(config: &FeedApiConfig) -> Result<Self> {
        let timeout = config.timeout();
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| JobFeedError::Config(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_size: config.page_size,
            timeout,
        })
    }

    fn endpoint(&self, sync_type: SyncType) -> String {
        let path = match sync_type {
            SyncType::JobListings => "job-listings",
            SyncType::Categories => "categories",
            SyncType::Skills => "skills",
        };
        format!("{}/{path}", self.base_url)
    }

    fn map_request_error(&self, err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            SyncError::Timeout(self.timeout)
        } else if err.is_decode() {
            SyncError::Validation(format!("feed response decode failed: {err}"))
        } else {
            SyncError::Network(err.to_string())
        }
    }
}

async fn classify_status(response: Response) -> std::result::Result<Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = format!("{status}: {}", body.chars().take(200).collect::<String>());

    match status {
        StatusCode::TOO_MANY_REQUESTS => Err(SyncError::RateLimit(detail)),
        s if s.is_server_error() => Err(SyncError::Server(detail)),
        _ => Err(SyncError::Client(detail)),
    }
}

#[async_trait]
impl FetchClient for HttpFeedClient {
    async fn fetch_batch(
        &self,
        sync_type: SyncType,
        cursor: Option<&str>,
    ) -> std::result::Result<FetchedBatch, SyncError> {
        let url = self.endpoint(sync_type);
        let mut request =
            self.client.get(url.as_str()).query(&[("limit", self.page_size.to_string())]);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        debug!(%url, cursor = cursor.unwrap_or("<start>"), "fetching feed batch");

        let response =
            request.send().await.map_err(|e| self.map_request_error(e))?;
        let response = classify_status(response).await?;

        let page: FeedPage = response
            .json()
            .await
            .map_err(|e| SyncError::Validation(format!("feed page decode failed: {e}")))?;

        let units = page
            .items
            .into_iter()
            .map(|item| JobUnit::new(item.id, sync_type, item.payload))
            .collect::<Vec<_>>();

        debug!(count = units.len(), has_more = page.has_more, "fetched feed batch");

        Ok(FetchedBatch { units, next_cursor: page.next_cursor, has_more: page.has_more })
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client_for(server: &MockServer) -> HttpFeedClient {
        let config = FeedApiConfig {
            base_url: server.uri(),
            timeout_seconds: 5,
            page_size: 2,
        };
        HttpFeedClient::new(&config).expect("client built")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetches_a_page_with_cursor() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/job-listings"))
            .and(query_param("limit", "2"))
            .and(query_param("cursor", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {"id": "job-10", "title": "platform engineer"},
                    {"id": "job-11", "title": "sre"}
                ],
                "next_cursor": "page-3",
                "has_more": true
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let batch = client
            .fetch_batch(SyncType::JobListings, Some("page-2"))
            .await
            .expect("batch fetched");

        assert_eq!(batch.units.len(), 2);
        assert_eq!(batch.units[0].external_id, "job-10");
        assert_eq!(batch.units[0].payload["title"], "platform engineer");
        assert_eq!(batch.next_cursor.as_deref(), Some("page-3"));
        assert!(batch.has_more);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn first_fetch_sends_no_cursor() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/skills"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [],
                "has_more": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let batch = client.fetch_batch(SyncType::Skills, None).await.expect("batch fetched");

        assert!(batch.units.is_empty());
        assert!(batch.next_cursor.is_none());
        assert!(!batch.has_more);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rate_limit_maps_to_rate_limit_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/categories"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.fetch_batch(SyncType::Categories, None).await.unwrap_err();
        assert!(matches!(err, SyncError::RateLimit(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn server_errors_map_to_server() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/job-listings"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.fetch_batch(SyncType::JobListings, None).await.unwrap_err();
        assert!(matches!(err, SyncError::Server(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn client_errors_map_to_client() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/job-listings"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.fetch_batch(SyncType::JobListings, None).await.unwrap_err();
        assert!(matches!(err, SyncError::Client(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn malformed_page_maps_to_validation() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/job-listings"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"unexpected": "shape"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.fetch_batch(SyncType::JobListings, None).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }
}
