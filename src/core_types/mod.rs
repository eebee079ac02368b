//! Core request types shared across the relay
//!
//! ## Organization
//! - `messages` - Inbound request model (Anthropic Messages wire shape)
//! - `capability` - Static per-model output caps and thinking support

pub mod capability;
pub mod messages;

pub use capability::{ModelCapability, MIN_THINKING_BUDGET};
pub use messages::{
    ContentBlock, ConversionRequest, MessageContent, Role, SystemBlock, SystemPrompt,
    ThinkingConfig, Turn,
};
