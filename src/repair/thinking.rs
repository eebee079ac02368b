//! Steps 2 and 3: thinking force and thinking-block healing

use super::RepairPolicy;
use crate::core_types::{
    ContentBlock, ConversionRequest, MessageContent, ModelCapability, Role, ThinkingConfig,
    MIN_THINKING_BUDGET,
};
use crate::logging::{log_info, log_warn};
use crate::store::CachedThinking;

use std::collections::HashMap;

/// Text of the synthetic thinking block inserted into replayed turns.
pub const PLACEHOLDER_THINKING: &str = "[Earlier reasoning for this turn was not preserved.]";

/// The synthetic placeholder block.
pub fn placeholder_block() -> ContentBlock {
    ContentBlock::thinking(PLACEHOLDER_THINKING, None)
}

pub fn is_placeholder(block: &ContentBlock) -> bool {
    matches!(
        block,
        ContentBlock::Thinking { thinking, signature: None, .. } if thinking == PLACEHOLDER_THINKING
    )
}

/// Thinking budget and max tokens for a forced configuration.
///
/// Returns `None` when the reconciled budget is below the upstream minimum.
pub fn reconcile_forced_budget(
    budget: u32,
    max_tokens: Option<u32>,
    cap: u32,
    policy: &RepairPolicy,
) -> Option<(u32, u32)> {
    let (budget, max_tokens) = match max_tokens {
        Some(max_tokens) if budget.saturating_add(max_tokens) > cap => {
            (cap.saturating_sub(max_tokens), max_tokens)
        }
        Some(max_tokens) => (budget, max_tokens),
        None => {
            let fallback = policy.fallback_max_tokens(budget).min(cap);
            (budget.min(fallback), fallback)
        }
    };
    (budget >= MIN_THINKING_BUDGET).then_some((budget, max_tokens))
}

/// Enable thinking at the operator budget when the caller left it unset.
pub fn force(request: &mut ConversionRequest, capability: ModelCapability, policy: &RepairPolicy) {
    if request.thinking.is_some() || !capability.supports_thinking {
        return;
    }
    let Some(forced) = policy.forced_thinking_budget.filter(|b| *b > 0) else {
        return;
    };

    let cap = capability.total_output_cap;
    match reconcile_forced_budget(forced, request.max_tokens, cap, policy) {
        Some((budget, max_tokens)) => {
            log_info!(
                repair_step = "thinking_force",
                model = %request.model,
                forced_budget = forced,
                budget = budget,
                max_tokens_before = ?request.max_tokens,
                max_tokens_after = max_tokens,
                model_cap = cap,
                "Forced extended thinking"
            );
            request.thinking = Some(ThinkingConfig::Enabled {
                budget_tokens: budget,
            });
            request.max_tokens = Some(max_tokens);
        }
        None => {
            log_warn!(
                repair_step = "thinking_force",
                model = %request.model,
                forced_budget = forced,
                max_tokens = ?request.max_tokens,
                model_cap = cap,
                "max_tokens leaves no room for the minimum thinking budget; thinking not forced"
            );
        }
    }
}

/// Ensure every assistant turn opens with a thinking block.
///
/// Uses the recalled authentic block for a turn when one is keyed by the
/// turn's first tool-use id, else the placeholder. Returns the number of turns
/// healed.
pub fn heal(request: &mut ConversionRequest, recalled: &HashMap<String, CachedThinking>) -> usize {
    if request.thinking_budget().is_none() {
        return 0;
    }

    let mut placeholders = 0;
    let mut restored = 0;
    for turn in request.messages.iter_mut() {
        if turn.role != Role::Assistant || turn.content.starts_with_thinking() {
            continue;
        }
        let authentic = turn
            .content
            .tool_use_ids()
            .first()
            .and_then(|id| recalled.get(*id))
            .cloned();
        let block = match authentic {
            Some(cached) => {
                restored += 1;
                cached.into_block()
            }
            None => {
                placeholders += 1;
                placeholder_block()
            }
        };
        turn.content.blocks_mut().insert(0, block);
    }

    if placeholders + restored > 0 {
        log_info!(
            repair_step = "thinking_heal",
            model = %request.model,
            placeholders = placeholders,
            restored_from_cache = restored,
            "Inserted thinking blocks into assistant turns"
        );
    }
    placeholders + restored
}

/// Remove placeholders again after thinking had to be disabled.
pub fn strip_placeholders(request: &mut ConversionRequest) -> usize {
    let mut removed = 0;
    for turn in request.messages.iter_mut().filter(|t| t.role == Role::Assistant) {
        let MessageContent::Blocks(blocks) = &mut turn.content else {
            continue;
        };
        if blocks.first().is_some_and(is_placeholder) {
            blocks.remove(0);
            removed += 1;
        }
    }
    removed
}
