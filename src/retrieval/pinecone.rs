//! Hosted vector index client (Pinecone data-plane REST API).
//!
//! The data-plane host is either configured directly or resolved once from
//! the control plane by index name and then cached for the process.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::RetrievalError;
use crate::retrieval::{ScoredMatch, VectorIndex};

/// API version header sent with every request.
pub const API_VERSION: &str = "2024-07";
/// Default control-plane endpoint.
pub const DEFAULT_CONTROLLER_URL: &str = "https://api.pinecone.io";
/// Metadata key holding the passage text.
const TEXT_KEY: &str = "text";
/// Metadata key holding the source document reference.
const SOURCE_KEY: &str = "source";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    #[serde(skip_serializing_if = "str::is_empty")]
    namespace: &'a str,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct DescribeIndexResponse {
    host: String,
}

/// One namespace of a hosted index.
#[derive(Debug)]
pub struct PineconeIndex {
    client: Client,
    api_key: String,
    controller_url: String,
    index_name: String,
    namespace: String,
    host: OnceCell<String>,
}

impl PineconeIndex {
    /// Creates a client for `index_name`/`namespace`.
    ///
    /// When `host` is `None` the data-plane host is looked up from
    /// `controller_url` on first query.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Configuration`] if the HTTP client cannot be
    /// built.
    pub fn new(
        api_key: &str,
        controller_url: &str,
        index_name: &str,
        namespace: &str,
        host: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RetrievalError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RetrievalError::Configuration(e.to_string()))?;

        let host = host
            .filter(|h| !h.trim().is_empty())
            .map(|h| normalize_host(&h));

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            controller_url: controller_url.trim_end_matches('/').to_string(),
            index_name: index_name.to_string(),
            namespace: namespace.to_string(),
            host: OnceCell::new_with(host),
        })
    }

    /// Namespace queried by this client.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn host(&self) -> Result<&str, RetrievalError> {
        self.host
            .get_or_try_init(|| self.describe_host())
            .await
            .map(String::as_str)
    }

    async fn describe_host(&self) -> Result<String, RetrievalError> {
        let url = format!("{}/indexes/{}", self.controller_url, self.index_name);
        debug!(index = %self.index_name, "resolving index host");

        let response = self
            .client
            .get(&url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &self.index_name, body));
        }

        let described: DescribeIndexResponse = response.json().await?;
        Ok(normalize_host(&described.host))
    }
}

/// Prefixes `https://` unless a scheme is already present.
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

fn status_error(status: StatusCode, index: &str, body: String) -> RetrievalError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            RetrievalError::Authentication(format!("index `{index}`: {body}"))
        }
        StatusCode::NOT_FOUND => {
            RetrievalError::Configuration(format!("index `{index}` not found: {body}"))
        }
        s if s == StatusCode::TOO_MANY_REQUESTS
            || s == StatusCode::REQUEST_TIMEOUT
            || s.is_server_error() =>
        {
            RetrievalError::Unavailable(format!("index `{index}` returned {s}: {body}"))
        }
        s => RetrievalError::Response {
            status: s.as_u16(),
            message: body,
        },
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    fn name(&self) -> &str {
        &self.index_name
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredMatch>, RetrievalError> {
        let host = self.host().await?;
        let body = QueryRequest {
            vector,
            top_k,
            namespace: &self.namespace,
            include_metadata: true,
            include_values: false,
        };

        let response = self
            .client
            .post(format!("{host}/query"))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, &self.index_name, text));
        }

        let parsed: QueryResponse = response.json().await?;
        let mut matches = Vec::with_capacity(parsed.matches.len());
        for m in parsed.matches {
            let metadata = m.metadata.unwrap_or_default();
            let Some(text) = metadata.get(TEXT_KEY).and_then(Value::as_str) else {
                warn!(index = %self.index_name, id = %m.id, "match has no text metadata, skipping");
                continue;
            };
            matches.push(ScoredMatch {
                id: m.id,
                score: m.score,
                text: text.to_string(),
                reference: metadata
                    .get(SOURCE_KEY)
                    .and_then(Value::as_str)
                    .map(str::to_string),
            });
        }
        Ok(matches)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn index_at(server: &MockServer) -> PineconeIndex {
        PineconeIndex::new(
            "pc-key",
            DEFAULT_CONTROLLER_URL,
            "livreto-base-evidencia",
            "livreto-metricis",
            Some(server.uri()),
            Duration::from_secs(5),
        )
        .unwrap_or_else(|e| panic!("client: {e}"))
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("idx.svc.pinecone.io"), "https://idx.svc.pinecone.io");
        assert_eq!(normalize_host("http://127.0.0.1:9/"), "http://127.0.0.1:9");
    }

    #[tokio::test]
    async fn test_query_maps_matches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .and(header("Api-Key", "pc-key"))
            .and(body_partial_json(json!({
                "topK": 3,
                "namespace": "livreto-metricis",
                "includeMetadata": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "matches": [
                    {"id": "a", "score": 0.91, "metadata": {"text": "Definição do problema", "source": "livreto.pdf"}},
                    {"id": "b", "score": 0.80, "metadata": {"text": "Mobilização"}},
                    {"id": "c", "score": 0.70, "metadata": {}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let hits = index_at(&server)
            .query(&[0.1, 0.2], 3)
            .await
            .unwrap_or_else(|e| panic!("query: {e}"));

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[0].reference.as_deref(), Some("livreto.pdf"));
        assert_eq!(hits[1].text, "Mobilização");
    }

    #[tokio::test]
    async fn test_empty_matches_ok() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"matches": []})))
            .mount(&server)
            .await;

        let hits = index_at(&server).query(&[0.1], 2).await;
        assert!(matches!(hits, Ok(ref v) if v.is_empty()));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = index_at(&server).query(&[0.1], 2).await.err();
        assert!(matches!(err, Some(RetrievalError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_unauthorized_is_final() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let err = index_at(&server).query(&[0.1], 2).await.err();
        assert!(matches!(err, Some(RetrievalError::Authentication(_))));
        assert!(!err.is_some_and(|e| e.is_transient()));
    }

    #[tokio::test]
    async fn test_host_resolved_once_from_controller() {
        let data_plane = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"matches": []})))
            .expect(2)
            .mount(&data_plane)
            .await;

        let controller = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/indexes/ods-onu"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"host": data_plane.uri()})),
            )
            .expect(1)
            .mount(&controller)
            .await;

        let index = PineconeIndex::new(
            "pc-key",
            &controller.uri(),
            "ods-onu",
            "catalogo-ods",
            None,
            Duration::from_secs(5),
        )
        .unwrap_or_else(|e| panic!("client: {e}"));

        assert!(index.query(&[0.1], 2).await.is_ok());
        assert!(index.query(&[0.1], 2).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_index_is_configuration_error() {
        let controller = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/indexes/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&controller)
            .await;

        let index = PineconeIndex::new(
            "pc-key",
            &controller.uri(),
            "missing",
            "",
            None,
            Duration::from_secs(5),
        )
        .unwrap_or_else(|e| panic!("client: {e}"));

        let err = index.query(&[0.1], 2).await.err();
        assert!(matches!(err, Some(RetrievalError::Configuration(_))));
    }
}
