//! Request repair pipeline
//!
//! Rewrites an inbound request so that it satisfies the upstream's extended
//! thinking rules and the subscription's client expectations. The pipeline is
//! pure: it touches nothing but the request and never fails. Steps run in a
//! fixed order because later steps rely on what earlier ones established:
//!
//! 1. identity framing ([`identity`])
//! 2. thinking force ([`thinking::force`])
//! 3. thinking-block healing ([`thinking::heal`])
//! 4. token-limit enforcement ([`limits`])
//!
//! Running the pipeline on its own output changes nothing.

pub mod identity;
pub mod limits;
pub mod thinking;

use crate::core_types::{ConversionRequest, ModelCapability};
use crate::store::CachedThinking;

use std::collections::HashMap;
use std::str::FromStr;

/// How to treat callers that do not present the first-party identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityFraming {
    /// Prepend the first-party system text.
    #[default]
    Masquerade,
    /// Leave the caller's system content as sent.
    Preserve,
}

impl FromStr for IdentityFraming {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "masquerade" => Ok(Self::Masquerade),
            "preserve" => Ok(Self::Preserve),
            other => Err(format!("unknown identity framing '{other}' (expected masquerade or preserve)")),
        }
    }
}

/// Operator policy applied by the pipeline. Unset values change nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairPolicy {
    pub identity_framing: IdentityFraming,
    /// Budget used when the caller did not configure thinking.
    pub forced_thinking_budget: Option<u32>,
    /// Overrides the caller's max tokens.
    pub forced_max_tokens: Option<u32>,
    /// Fallback max tokens is `max(budget + padding, budget * multiplier)`.
    pub fallback_padding: u32,
    pub fallback_multiplier: u32,
}

impl Default for RepairPolicy {
    fn default() -> Self {
        Self {
            identity_framing: IdentityFraming::Masquerade,
            forced_thinking_budget: None,
            forced_max_tokens: None,
            fallback_padding: 6000,
            fallback_multiplier: 2,
        }
    }
}

impl RepairPolicy {
    pub fn fallback_max_tokens(&self, budget: u32) -> u32 {
        budget
            .saturating_add(self.fallback_padding)
            .max(budget.saturating_mul(self.fallback_multiplier))
    }
}

/// Repaired request plus what the response path needs to know about it.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairOutcome {
    pub request: ConversionRequest,
    /// The caller is not the first-party client; answer in OpenAI format.
    pub needs_protocol_translation: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RequestRepairer {
    policy: RepairPolicy,
}

impl RequestRepairer {
    pub fn new(policy: RepairPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RepairPolicy {
        &self.policy
    }

    pub fn repair(&self, request: ConversionRequest, capability: ModelCapability) -> RepairOutcome {
        self.repair_with_recalled(request, capability, &HashMap::new())
    }

    /// Repair, healing turns from `recalled` authentic thinking blocks where
    /// available (keyed by the turn's first tool-use id).
    pub fn repair_with_recalled(
        &self,
        mut request: ConversionRequest,
        capability: ModelCapability,
        recalled: &HashMap<String, CachedThinking>,
    ) -> RepairOutcome {
        let needs_protocol_translation = identity::apply(&mut request, self.policy.identity_framing);
        thinking::force(&mut request, capability, &self.policy);
        thinking::heal(&mut request, recalled);
        limits::enforce(&mut request, capability, &self.policy);

        RepairOutcome {
            request,
            needs_protocol_translation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{ContentBlock, MessageContent, Role, ThinkingConfig, Turn};
    use serde_json::json;

    const SONNET: ModelCapability = ModelCapability::new(true, 64000);

    fn forcing(budget: u32) -> RequestRepairer {
        RequestRepairer::new(RepairPolicy {
            forced_thinking_budget: Some(budget),
            ..RepairPolicy::default()
        })
    }

    fn tool_loop_request() -> ConversionRequest {
        ConversionRequest::new(
            "claude-sonnet-4-20250514",
            vec![
                Turn::user("read main.rs"),
                Turn::assistant(vec![ContentBlock::tool_use(
                    "toolu_1",
                    "read_file",
                    json!({"path": "main.rs"}),
                )]),
                Turn::new(
                    Role::User,
                    MessageContent::Blocks(vec![ContentBlock::tool_result(
                        "toolu_1",
                        "fn main() {}",
                    )]),
                ),
            ],
        )
    }

    #[test]
    fn test_forced_thinking_without_max_tokens_uses_fallback() {
        for budget in [1024, 4096, 10000, 31000, 50000] {
            let outcome = forcing(budget).repair(tool_loop_request(), SONNET);

            let expected = (budget + 6000).max(budget * 2).min(64000);
            assert_eq!(outcome.request.max_tokens, Some(expected), "budget {budget}");
            assert!(outcome.request.thinking_budget().unwrap() <= expected);
        }
    }

    #[test]
    fn test_forced_thinking_with_max_tokens_shrinks_budget() {
        for max_tokens in [50000, 56000, 62000] {
            let mut request = tool_loop_request();
            request.max_tokens = Some(max_tokens);

            let outcome = forcing(16000).repair(request, SONNET);

            assert_eq!(outcome.request.thinking_budget(), Some(64000 - max_tokens));
            assert_eq!(outcome.request.max_tokens, Some(max_tokens), "Caller max_tokens kept");
        }
    }

    #[test]
    fn test_pipeline_heals_and_frames() {
        let outcome = forcing(4096).repair(tool_loop_request(), SONNET);

        assert!(outcome.needs_protocol_translation);
        assert!(outcome.request.messages[1].content.starts_with_thinking());
        assert!(outcome.request.system_blocks()[0]
            .text
            .starts_with(identity::FIRST_PARTY_IDENTITY));
    }

    #[test]
    fn test_repair_is_idempotent() {
        // Arrange
        let repairer = RequestRepairer::new(RepairPolicy {
            forced_thinking_budget: Some(8000),
            forced_max_tokens: Some(20000),
            ..RepairPolicy::default()
        });
        let once = repairer.repair(tool_loop_request(), SONNET).request;

        // Act
        let twice = repairer.repair(once.clone(), SONNET).request;

        // Assert
        assert_eq!(twice, once, "Second pass must not add placeholders or re-clamp");
        let MessageContent::Blocks(blocks) = &twice.messages[1].content else {
            panic!("Expected healed block content");
        };
        assert_eq!(blocks.iter().filter(|b| b.is_thinking()).count(), 1);
    }

    #[test]
    fn test_caller_thinking_is_healed_without_forcing() {
        let mut request = tool_loop_request();
        request.max_tokens = Some(16000);
        request.thinking = Some(ThinkingConfig::Enabled { budget_tokens: 4000 });

        let outcome = RequestRepairer::default().repair(request, SONNET);

        assert_eq!(outcome.request.thinking_budget(), Some(4000));
        assert!(outcome.request.messages[1].content.starts_with_thinking());
    }

    #[test]
    fn test_identity_framing_parses() {
        assert_eq!("Preserve".parse::<IdentityFraming>(), Ok(IdentityFraming::Preserve));
        assert!("impersonate".parse::<IdentityFraming>().is_err());
    }
}
