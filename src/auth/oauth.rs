//! Refresh-token exchange against the Anthropic authorization server

use crate::config::OAuthConfig;
use crate::error::{RelayError, RelayResult};
use crate::internals::retry::RetryExecutor;
use crate::logging::{log_debug, log_warn};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Public OAuth client id of the first-party CLI.
pub const DEFAULT_CLIENT_ID: &str = "9d1c250a-e61b-44d9-88ed-5944d1962f5e";
pub const DEFAULT_TOKEN_URL: &str = "https://console.anthropic.com/v1/oauth/token";

/// Lifetime assumed when the server omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
    client_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Outcome of a successful refresh exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Rotated refresh token, when the server issued one.
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("rotated", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Exchanges a refresh token for a new access token.
#[async_trait]
pub trait TokenExchanger: Send + Sync + std::fmt::Debug {
    /// Rejections surface as [`RelayError::AuthRequired`]; transient failures
    /// as [`RelayError::UpstreamUnavailable`].
    async fn refresh(&self, refresh_token: &str) -> RelayResult<TokenGrant>;
}

/// HTTP implementation of [`TokenExchanger`] with bounded retries.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    client: reqwest::Client,
    config: OAuthConfig,
    retry_executor: RetryExecutor,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            retry_executor: RetryExecutor::new(config.retry_policy.clone()),
            config,
        }
    }

    async fn exchange_once(&self, refresh_token: &str) -> RelayResult<TokenGrant> {
        let body = RefreshRequest {
            grant_type: "refresh_token",
            refresh_token,
            client_id: &self.config.client_id,
        };

        let response = self
            .client
            .post(&self.config.token_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::upstream_transport(format!("Token refresh request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                400 | 401 => RelayError::auth_required(format!(
                    "Refresh token rejected by authorization server ({status}): {text}"
                )),
                code => RelayError::upstream_status(code, text),
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            RelayError::upstream_transport(format!("Unreadable token response: {e}"))
        })?;

        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token.filter(|rt| !rt.is_empty()),
            expires_in: token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS),
        })
    }
}

#[async_trait]
impl TokenExchanger for OAuthClient {
    async fn refresh(&self, refresh_token: &str) -> RelayResult<TokenGrant> {
        log_debug!(token_url = %self.config.token_url, "Refreshing OAuth access token");
        let result = self
            .retry_executor
            .execute(|| self.exchange_once(refresh_token))
            .await;
        if let Err(RelayError::UpstreamUnavailable { status, .. }) = &result {
            log_warn!(status = ?status, "Token refresh gave up after retries");
        }
        result
    }
}
