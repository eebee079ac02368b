//! `anthropic-beta` header composition

/// Required for subscription (OAuth) bearer tokens.
pub const OAUTH_BETA: &str = "oauth-2025-04-20";
/// Lets thinking blocks interleave with tool calls.
pub const INTERLEAVED_THINKING_BETA: &str = "interleaved-thinking-2025-05-14";

/// Comma-separated beta flags for an upstream call.
pub fn beta_header(interleaved_thinking: bool) -> String {
    let mut features = vec![OAUTH_BETA];
    if interleaved_thinking {
        features.push(INTERLEAVED_THINKING_BETA);
    }
    features.join(",")
}
