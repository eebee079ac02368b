//! Upstream Messages API client
//!
//! Each call is a single attempt with a bounded timeout. Proxied message calls
//! are never retried because a failed attempt may already have been billed
//! against the subscription.

use super::beta::beta_header;
use super::types::AnthropicResponse;
use crate::config::UpstreamConfig;
use crate::core_types::ConversionRequest;
use crate::error::{RelayError, RelayResult};
use crate::logging::{log_debug, log_error};

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Client for `POST {base}/v1/messages`.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    config: UpstreamConfig,
}

impl UpstreamClient {
    pub fn new(config: UpstreamConfig) -> Self {
        log_debug!(
            base_url = %config.base_url,
            timeout_secs = config.timeout.as_secs(),
            interleaved_thinking = config.interleaved_thinking,
            "Upstream client initialized"
        );
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'))
    }

    fn headers(&self, access_token: &str) -> RelayResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {access_token}")).map_err(|e| {
                RelayError::auth_required(format!("Stored access token is not a valid header: {e}"))
            })?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(
            "anthropic-beta",
            HeaderValue::from_str(&beta_header(self.config.interleaved_thinking)).map_err(|e| {
                RelayError::configuration(format!("Invalid beta header: {e}"))
            })?,
        );
        Ok(headers)
    }

    /// Forward a repaired request and return the successful response unread.
    ///
    /// A non-success status is turned into
    /// [`RelayError::UpstreamUnavailable`] carrying the upstream body verbatim.
    pub async fn send(
        &self,
        access_token: &str,
        request: &ConversionRequest,
    ) -> RelayResult<reqwest::Response> {
        let url = self.messages_url();
        let response = self
            .client
            .post(&url)
            .headers(self.headers(access_token)?)
            .timeout(self.config.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                log_error!(
                    url = %url,
                    model = %request.model,
                    error = %e,
                    "Upstream HTTP request failed"
                );
                RelayError::upstream_transport(format!("Upstream request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::upstream_status(status.as_u16(), body));
        }

        log_debug!(
            model = %request.model,
            stream = request.stream,
            status = status.as_u16(),
            "Upstream accepted request"
        );
        Ok(response)
    }

    /// Non-streaming call: forward and decode the JSON body.
    pub async fn create_message(
        &self,
        access_token: &str,
        request: &ConversionRequest,
    ) -> RelayResult<AnthropicResponse> {
        let response = self.send(access_token, request).await?;
        let raw_body = response.text().await.map_err(|e| {
            RelayError::upstream_transport(format!("Failed to read upstream body: {e}"))
        })?;
        serde_json::from_str(&raw_body).map_err(|e| {
            log_error!(
                error = %e,
                body_len = raw_body.len(),
                "Upstream returned an undecodable message body"
            );
            RelayError::upstream_status(502, raw_body)
        })
    }
}
