//! Static model capability table
//!
//! Lookup is by longest matching prefix of the lowercased model name, so dated
//! snapshots (`claude-sonnet-4-20250514`) and aliases (`claude-sonnet-4-0`)
//! resolve to their family entry.

use once_cell::sync::Lazy;

/// Smallest thinking budget the upstream accepts.
pub const MIN_THINKING_BUDGET: u32 = 1024;

/// Per-model output limits and feature support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelCapability {
    /// Whether the model accepts an extended-thinking configuration.
    pub supports_thinking: bool,
    /// Upper bound on thinking budget plus visible output tokens.
    pub total_output_cap: u32,
}

impl ModelCapability {
    pub const fn new(supports_thinking: bool, total_output_cap: u32) -> Self {
        Self {
            supports_thinking,
            total_output_cap,
        }
    }

    /// Capability of a model name, falling back to [`UNKNOWN_MODEL`].
    pub fn for_model(model: &str) -> Self {
        lookup(model)
    }
}

/// Capability assumed for models missing from the table.
pub const UNKNOWN_MODEL: ModelCapability = ModelCapability::new(false, 8192);

static CAPABILITIES: Lazy<Vec<(&'static str, ModelCapability)>> = Lazy::new(|| {
    let mut table = vec![
        ("claude-opus-4-5", ModelCapability::new(true, 64000)),
        ("claude-opus-4-1", ModelCapability::new(true, 32000)),
        ("claude-opus-4", ModelCapability::new(true, 32000)),
        ("claude-sonnet-4-5", ModelCapability::new(true, 64000)),
        ("claude-sonnet-4", ModelCapability::new(true, 64000)),
        ("claude-haiku-4-5", ModelCapability::new(true, 64000)),
        ("claude-3-7-sonnet", ModelCapability::new(true, 64000)),
        ("claude-3-5-sonnet", ModelCapability::new(false, 8192)),
        ("claude-3-5-haiku", ModelCapability::new(false, 8192)),
        ("claude-3-opus", ModelCapability::new(false, 4096)),
        ("claude-3-haiku", ModelCapability::new(false, 4096)),
    ];
    // Longest prefix first so the first hit is the most specific one
    table.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    table
});

/// Resolve a model name against the capability table.
pub fn lookup(model: &str) -> ModelCapability {
    let model = model.trim().to_ascii_lowercase();
    CAPABILITIES
        .iter()
        .find(|(prefix, _)| model.starts_with(prefix))
        .map(|(_, capability)| *capability)
        .unwrap_or(UNKNOWN_MODEL)
}

/// Model families served by the gateway, for `GET /v1/models`.
pub fn known_models() -> impl Iterator<Item = &'static str> {
    CAPABILITIES.iter().map(|(prefix, _)| *prefix)
}
