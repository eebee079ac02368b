//! # claude-relay
//!
//! Gateway that lets OpenAI-protocol clients and third-party Anthropic clients
//! use a subscription Claude account over the Anthropic Messages API.
//!
//! ## Key Features
//!
//! - **OAuth lifecycle**: persisted credential, proactive refresh, exactly one
//!   refresh exchange per stale token however many requests are waiting
//! - **Request repair**: identity framing, forced extended thinking, thinking
//!   block healing and output-limit enforcement, all idempotent
//! - **Response conversion**: Anthropic messages and event streams to OpenAI
//!   `chat.completion` / `chat.completion.chunk`, in constant memory
//!
//! ## Example
//!
//! ```rust,no_run
//! use claude_relay::{gateway, OAuthClient, RelayConfig, SqliteStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = RelayConfig::from_env()?;
//! let store = Arc::new(SqliteStore::open(&config.store_path)?);
//! let exchanger = Arc::new(OAuthClient::new(config.oauth.clone()));
//! let state = gateway::AppState::new(&config, store, exchanger)?;
//!
//! let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
//! axum::serve(listener, gateway::router(Arc::new(state))).await?;
//! # Ok(())
//! # }
//! ```

// Allow missing errors documentation - errors are self-documenting via type signatures
#![allow(clippy::missing_errors_doc)]

pub mod core_types;

// Logging utilities (re-exports tracing with log_* naming)
pub mod logging;

pub mod anthropic;
pub mod auth;
pub mod config;
pub mod convert;
pub mod error;
pub mod gateway;
pub(crate) mod internals;
pub mod openai;
pub mod repair;
pub mod store;
pub mod usage;

#[cfg(test)]
pub mod tests;

// Re-export main types
pub use auth::{Credential, OAuthClient, TokenExchanger, TokenGrant, TokenManager};
pub use config::{OAuthConfig, RelayConfig, UpstreamConfig};
pub use convert::{convert_response, StreamConverter};
pub use core_types::{ConversionRequest, ModelCapability};
pub use error::{RelayError, RelayResult};
pub use internals::retry::RetryPolicy;
pub use repair::{IdentityFraming, RepairOutcome, RepairPolicy, RequestRepairer};
pub use store::{KvStore, MemoryStore, SqliteStore};
pub use usage::{UsageReport, UsageSink};
