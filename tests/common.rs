//! Test helper utilities for claude-relay integration tests
//!
//! Fixtures for wiring a relay against wiremock servers standing in for the
//! Anthropic API and the OAuth token endpoint.
//!
//! IMPORTANT: These helpers are test-only and should NEVER be used in production code.

// Allow dead code in test utilities - functions are used across different test files
#![allow(dead_code)]

use chrono::Utc;
use claude_relay::config::{OAuthConfig, RelayConfig, UpstreamConfig};
use claude_relay::{Credential, KvStore, MemoryStore, OAuthClient, RetryPolicy, TokenManager};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::MockServer;

pub const TOKEN_PATH: &str = "/v1/oauth/token";

/// Retry policy with millisecond delays so retry tests stay fast.
pub fn fast_retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        backoff_multiplier: 2.0,
        total_timeout: Duration::from_secs(5),
        request_timeout: Duration::from_secs(2),
    }
}

pub fn oauth_config(server: &MockServer) -> OAuthConfig {
    OAuthConfig {
        token_url: format!("{}{TOKEN_PATH}", server.uri()),
        client_id: "test-client".to_string(),
        refresh_margin: Duration::from_secs(60),
        retry_policy: fast_retry_policy(),
    }
}

/// Relay configuration pointing both upstreams at mock servers.
pub fn relay_config(upstream: &MockServer, oauth: &MockServer) -> RelayConfig {
    RelayConfig {
        upstream: UpstreamConfig {
            base_url: upstream.uri(),
            timeout: Duration::from_secs(5),
            interleaved_thinking: false,
        },
        oauth: oauth_config(oauth),
        ..RelayConfig::default()
    }
}

pub fn token_manager(server: &MockServer) -> (TokenManager, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let exchanger = Arc::new(OAuthClient::new(oauth_config(server)));
    let manager = TokenManager::new(
        store.clone() as Arc<dyn KvStore>,
        exchanger,
        Duration::from_secs(60),
    );
    (manager, store)
}

/// Credential whose access token expired one second ago.
pub fn expired_credential() -> Credential {
    Credential::new("rt-original", "at-expired", Utc::now().timestamp() - 1)
}

pub fn fresh_credential() -> Credential {
    Credential::new("rt-original", "at-fresh", Utc::now().timestamp() + 3600)
}

pub fn token_grant(access_token: &str) -> Value {
    json!({
        "access_token": access_token,
        "refresh_token": "rt-rotated",
        "expires_in": 28800,
        "token_type": "Bearer"
    })
}

/// Non-streaming upstream message with signed thinking followed by a tool call.
pub fn thinking_tool_message() -> Value {
    json!({
        "id": "msg_01",
        "type": "message",
        "role": "assistant",
        "model": "claude-sonnet-4-20250514",
        "content": [
            {"type": "thinking", "thinking": "Need the file first.", "signature": "EqQBCkYI"},
            {"type": "text", "text": "Reading it now."},
            {"type": "tool_use", "id": "toolu_01", "name": "read_file", "input": {"path": "lib.rs"}}
        ],
        "stop_reason": "tool_use",
        "stop_sequence": null,
        "usage": {"input_tokens": 120, "output_tokens": 45}
    })
}

/// Upstream SSE body of a short text-only answer.
pub const TEXT_STREAM: &str = "event: message_start\n\
data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_02\",\"type\":\"message\",\"role\":\"assistant\",\"model\":\"claude-sonnet-4-20250514\",\"content\":[],\"usage\":{\"input_tokens\":25,\"output_tokens\":1}}}\n\n\
event: content_block_start\n\
data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n\
event: content_block_delta\n\
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello from Claude\"}}\n\n\
event: content_block_stop\n\
data: {\"type\":\"content_block_stop\",\"index\":0}\n\n\
event: message_delta\n\
data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\",\"stop_sequence\":null},\"usage\":{\"output_tokens\":6}}\n\n\
event: message_stop\n\
data: {\"type\":\"message_stop\"}\n\n";

/// Inbound body from an OpenAI-protocol client (no first-party identity).
pub fn third_party_body(stream: bool) -> Value {
    json!({
        "model": "claude-sonnet-4-20250514",
        "max_tokens": 1024,
        "stream": stream,
        "messages": [{"role": "user", "content": "Say hello"}]
    })
}
