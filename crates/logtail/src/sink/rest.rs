// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sink backed by a REST table endpoint.
//!
//! Records are posted as a JSON array to `{endpoint}/{table}`:
//!
//! ```text
//! POST /rest/v1/logs
//! Authorization: Bearer <token>
//! apikey: <api key>
//!
//! [{"user_id":"…","content":"GET / 200","source":"stdout"}]
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tracing::debug;

use crate::error::SinkError;
use crate::sink::{Record, Sink};

const API_KEY_HEADER: &str = "apikey";
const PREFER_HEADER: &str = "prefer";

#[derive(Debug, Clone)]
pub struct RestSinkConfig {
    /// Base URL; the table name is appended as the last path segment.
    pub endpoint: String,
    pub token: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RestSink {
    client: reqwest::Client,
    endpoint: String,
    headers: HeaderMap,
    timeout: Duration,
}

impl RestSink {
    pub fn new(config: RestSinkConfig) -> Result<Self, SinkError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|e| SinkError::Other(format!("invalid token header: {e}")))?;
        headers.insert(AUTHORIZATION, bearer);
        if let Some(api_key) = &config.api_key {
            let value = HeaderValue::from_str(api_key)
                .map_err(|e| SinkError::Other(format!("invalid api key header: {e}")))?;
            headers.insert(API_KEY_HEADER, value);
        }
        headers.insert(PREFER_HEADER, HeaderValue::from_static("return=minimal"));

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(RestSink {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            headers,
            timeout: config.timeout,
        })
    }

    fn url(&self, table: &str) -> String {
        format!("{}/{table}", self.endpoint)
    }
}

#[async_trait]
impl Sink for RestSink {
    async fn insert(&self, table: &str, records: &[Record]) -> Result<(), SinkError> {
        let body = serde_json::to_vec(records)?;
        let url = self.url(table);

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .headers(self.headers.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!("SINK | Inserted {} records into {table}", records.len());
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(SinkError::Status { status, body })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn record(content: &str) -> Record {
        let mut record = Record::new();
        record.insert("user_id".to_string(), json!("u-1"));
        record.insert("content".to_string(), json!(content));
        record
    }

    fn sink(endpoint: String, api_key: Option<&str>) -> RestSink {
        RestSink::new(RestSinkConfig {
            endpoint,
            token: "secret-token".to_string(),
            api_key: api_key.map(str::to_string),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_posts_json_array() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/rest/v1/logs")
            .match_header("authorization", "Bearer secret-token")
            .match_header("apikey", "anon-key")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!([
                {"user_id": "u-1", "content": "one"},
                {"user_id": "u-1", "content": "two"}
            ])))
            .with_status(201)
            .create_async()
            .await;

        let sink = sink(format!("{}/rest/v1/", server.url()), Some("anon-key"));
        sink.insert("logs", &[record("one"), record("two")])
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_reported_with_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/logs")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let sink = sink(server.url(), None);
        let err = sink.insert("logs", &[record("one")]).await.unwrap_err();
        match err {
            SinkError::Status { status, body } => {
                assert_eq!(status.as_u16(), 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_a_request_error() {
        let sink = RestSink::new(RestSinkConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            token: "t".to_string(),
            api_key: None,
            timeout: Duration::from_millis(500),
        })
        .unwrap();
        let err = sink.insert("logs", &[record("one")]).await.unwrap_err();
        assert!(matches!(err, SinkError::Request(_)));
    }

    #[test]
    fn test_invalid_token_is_rejected() {
        let err = RestSink::new(RestSinkConfig {
            endpoint: "http://localhost".to_string(),
            token: "bad\ntoken".to_string(),
            api_key: None,
            timeout: Duration::from_secs(1),
        })
        .unwrap_err();
        assert!(matches!(err, SinkError::Other(_)));
    }
}
