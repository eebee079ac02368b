//! Pre-send input token estimation
//!
//! Claude's tokenizer is not public; `cl100k_base` with a 1.1x factor is a
//! close, slightly pessimistic approximation.

use crate::core_types::{ContentBlock, ConversionRequest, MessageContent};
use crate::error::{RelayError, RelayResult};

use std::sync::Arc;
use tiktoken_rs::{cl100k_base, CoreBPE};

const CLAUDE_APPROXIMATION_FACTOR: f64 = 1.1;
/// Role markers and separators per turn.
const PER_TURN_OVERHEAD: u32 = 4;

#[derive(Clone)]
pub struct InputTokenEstimator {
    tokenizer: Arc<CoreBPE>,
}

impl std::fmt::Debug for InputTokenEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputTokenEstimator")
            .field("encoding", &"cl100k_base")
            .finish()
    }
}

impl InputTokenEstimator {
    pub fn new() -> RelayResult<Self> {
        let tokenizer = cl100k_base().map_err(|e| {
            RelayError::configuration(format!("Failed to initialize tokenizer: {e}"))
        })?;
        Ok(Self {
            tokenizer: Arc::new(tokenizer),
        })
    }

    /// Approximate Claude tokens in a text.
    pub fn count_tokens(&self, text: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }
        let raw = self.tokenizer.encode_with_special_tokens(text).len() as f64;
        (raw * CLAUDE_APPROXIMATION_FACTOR).ceil() as u32
    }

    /// Approximate input tokens of a full request: system, turns and tools.
    pub fn estimate(&self, request: &ConversionRequest) -> u32 {
        let system: u32 = request
            .system_blocks()
            .iter()
            .map(|block| self.count_tokens(&block.text))
            .sum();

        let turns: u32 = request
            .messages
            .iter()
            .map(|turn| PER_TURN_OVERHEAD + self.count_content(&turn.content))
            .sum();

        let tools: u32 = request
            .tools
            .iter()
            .map(|tool| self.count_tokens(&tool.to_string()))
            .sum();

        system + turns + tools
    }

    fn count_content(&self, content: &MessageContent) -> u32 {
        match content {
            MessageContent::Text(text) => self.count_tokens(text),
            MessageContent::Blocks(blocks) => blocks.iter().map(|b| self.count_block(b)).sum(),
        }
    }

    fn count_block(&self, block: &ContentBlock) -> u32 {
        match block {
            ContentBlock::Text { text, .. } => self.count_tokens(text),
            ContentBlock::Thinking { thinking, .. } => self.count_tokens(thinking),
            ContentBlock::ToolUse { name, input, .. } => {
                self.count_tokens(name) + self.count_tokens(&input.to_string())
            }
            ContentBlock::ToolResult { content, .. } => match content.as_str() {
                Some(text) => self.count_tokens(text),
                None => self.count_tokens(&content.to_string()),
            },
            // Images and redacted thinking are not text-tokenizable
            ContentBlock::RedactedThinking { .. } | ContentBlock::Other(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::Turn;

    #[test]
    fn test_factor_is_applied() {
        let estimator = InputTokenEstimator::new().unwrap();
        let text = "The quick brown fox jumps over the lazy dog";
        let raw = cl100k_base().unwrap().encode_with_special_tokens(text).len() as f64;

        assert_eq!(estimator.count_tokens(text), (raw * 1.1).ceil() as u32);
        assert_eq!(estimator.count_tokens(""), 0);
    }

    #[test]
    fn test_estimate_grows_with_conversation() {
        let estimator = InputTokenEstimator::new().unwrap();
        let short = ConversionRequest::new("claude-sonnet-4", vec![Turn::user("hi")]);
        let mut long = short.clone();
        long.messages.push(Turn::assistant(vec![ContentBlock::text(
            "A considerably longer reply that carries many more tokens than the greeting.",
        )]));

        assert!(estimator.estimate(&short) >= PER_TURN_OVERHEAD);
        assert!(estimator.estimate(&long) > estimator.estimate(&short));
    }
}
