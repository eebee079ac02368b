//! HTTP boundary of the relay
//!
//! The only layer that knows about HTTP on the inbound side. Everything it
//! calls is transport-agnostic.

pub mod debug_log;
pub mod error;
pub mod handlers;

pub use debug_log::RequestLog;
pub use error::error_response;

use crate::anthropic::UpstreamClient;
use crate::auth::{TokenExchanger, TokenManager};
use crate::config::RelayConfig;
use crate::error::RelayResult;
use crate::repair::RequestRepairer;
use crate::store::{ConversationCache, KvStore};
use crate::usage::{InputTokenEstimator, TracingUsageSink, UsageSink};

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Shared state of all handlers.
#[derive(Debug)]
pub struct AppState {
    pub tokens: TokenManager,
    pub upstream: UpstreamClient,
    pub repairer: RequestRepairer,
    /// Present when healing from the conversation cache is enabled.
    pub cache: Option<ConversationCache>,
    pub request_log: Option<RequestLog>,
    pub usage: Arc<dyn UsageSink>,
    pub estimator: InputTokenEstimator,
}

impl AppState {
    /// Wire the relay from configuration, a store and a token exchanger.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RelayError::Configuration`] if the tokenizer used for
    /// input estimation cannot be loaded.
    pub fn new(
        config: &RelayConfig,
        store: Arc<dyn KvStore>,
        exchanger: Arc<dyn TokenExchanger>,
    ) -> RelayResult<Self> {
        Ok(Self {
            tokens: TokenManager::new(store.clone(), exchanger, config.oauth.refresh_margin),
            upstream: UpstreamClient::new(config.upstream.clone()),
            repairer: RequestRepairer::new(config.repair.clone()),
            cache: config
                .heal_from_cache
                .then(|| ConversationCache::with_ttl(store, config.cache_ttl)),
            request_log: config.debug_log.clone().map(RequestLog::new),
            usage: Arc::new(TracingUsageSink),
            estimator: InputTokenEstimator::new()?,
        })
    }

    pub fn with_usage_sink(mut self, sink: Arc<dyn UsageSink>) -> Self {
        self.usage = sink;
        self
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/messages", post(handlers::messages))
        .route("/v1/models", get(handlers::list_models))
        .route("/health", get(handlers::health))
        .with_state(state)
}
