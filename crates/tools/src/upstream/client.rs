//! HTTP client for third-party APIs.

use super::config::UpstreamConfig;
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use toolhost_core::{ToolError, UpstreamError};
use tracing::{debug, warn};
use url::Url;

/// Longest slice of an error body kept in `UpstreamError::Status`.
const MAX_ERROR_BODY: usize = 512;

/// Shared HTTP client used by every tool.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    config: Arc<UpstreamConfig>,
}

impl UpstreamClient {
    /// Create a new client with the given configuration.
    pub fn new(config: UpstreamConfig) -> Result<Self, ToolError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ToolError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    /// Execute a request with retries.
    async fn execute_with_retry(&self, request_builder: RequestBuilder) -> Result<Response, UpstreamError> {
        let retry_config = &self.config.retry_config;
        let mut attempts = 0;

        loop {
            let request = request_builder
                .try_clone()
                .ok_or_else(|| UpstreamError::InvalidUrl("request cannot be cloned".to_string()))?;

            match request.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();

                    if response.status().is_success() {
                        return Ok(response);
                    }

                    if attempts < retry_config.max_retries
                        && retry_config.should_retry_status(status)
                    {
                        let backoff = retry_config.backoff_for_attempt(attempts);
                        warn!(
                            status = status,
                            attempt = attempts + 1,
                            backoff_ms = backoff.as_millis(),
                            "Upstream request failed, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        attempts += 1;
                        continue;
                    }

                    let mut body = response.text().await.unwrap_or_default();
                    if body.len() > MAX_ERROR_BODY {
                        let mut cut = MAX_ERROR_BODY;
                        while !body.is_char_boundary(cut) {
                            cut -= 1;
                        }
                        body.truncate(cut);
                    }
                    return Err(UpstreamError::Status { status, body });
                }
                Err(e) => {
                    let err = transport_error(&e);
                    if attempts < retry_config.max_retries && err.is_retryable() {
                        let backoff = retry_config.backoff_for_attempt(attempts);
                        warn!(
                            attempt = attempts + 1,
                            backoff_ms = backoff.as_millis(),
                            error = %err,
                            "Upstream request failed to complete, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        attempts += 1;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, UpstreamError> {
        let url = response.url().clone();
        let bytes = response.bytes().await.map_err(|e| UpstreamError::Transport {
            url: display_url(&url),
            message: e.to_string(),
        })?;
        serde_json::from_slice(&bytes).map_err(|e| UpstreamError::Decode(e.to_string()))
    }

    /// Execute a GET request and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, UpstreamError> {
        debug!(url = %display_url(&url), "GET request");

        let response = self.execute_with_retry(self.client.get(url)).await?;
        Self::decode(response).await
    }

    /// Execute a GET request with a bearer token.
    pub async fn get_json_bearer<T: DeserializeOwned>(
        &self,
        url: Url,
        token: &str,
    ) -> Result<T, UpstreamError> {
        debug!(url = %display_url(&url), "GET request (bearer)");

        let response = self
            .execute_with_retry(self.client.get(url).bearer_auth(token))
            .await?;
        Self::decode(response).await
    }

    /// Execute a form-encoded POST with HTTP Basic credentials.
    pub async fn post_form_basic<T: DeserializeOwned, F: Serialize + ?Sized>(
        &self,
        url: Url,
        username: &str,
        password: &str,
        form: &F,
    ) -> Result<T, UpstreamError> {
        debug!(url = %display_url(&url), "POST form request");

        let response = self
            .execute_with_retry(
                self.client
                    .post(url)
                    .basic_auth(username, Some(password))
                    .form(form),
            )
            .await?;
        Self::decode(response).await
    }
}

/// Build an endpoint URL: `base` + `path` segments + percent-encoded query.
pub fn endpoint(base: &Url, path: &str, query: &[(&str, &str)]) -> Result<Url, UpstreamError> {
    let mut url = base.clone();

    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| UpstreamError::InvalidUrl(format!("{} cannot be a base URL", base)))?;
        segments.pop_if_empty();
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
    }

    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }

    Ok(url)
}

/// URL without its query string, for logs and errors.
fn display_url(url: &Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.to_string()
}

fn transport_error(e: &reqwest::Error) -> UpstreamError {
    // Nothing was sent, so there is nothing to retry
    if e.is_builder() {
        return UpstreamError::InvalidUrl(e.to_string());
    }

    UpstreamError::Transport {
        url: e.url().map(display_url).unwrap_or_default(),
        message: e.to_string(),
    }
}
