//! Upstream side: Anthropic Messages API wire types and client

pub mod beta;
pub mod client;
pub mod types;

pub use client::UpstreamClient;
pub use types::{AnthropicResponse, BlockDelta, StreamEvent, Usage, UsageDelta};
