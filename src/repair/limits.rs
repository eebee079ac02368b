//! Step 4: token-limit enforcement

use super::thinking::strip_placeholders;
use super::RepairPolicy;
use crate::core_types::{ConversionRequest, ModelCapability, ThinkingConfig, MIN_THINKING_BUDGET};
use crate::logging::{log_info, log_warn};

/// Apply the operator max-tokens override and the model cap.
///
/// When either changes `max_tokens` while thinking is enabled, the budget is
/// reconciled again so that budget plus max tokens stays within the cap.
pub fn enforce(request: &mut ConversionRequest, capability: ModelCapability, policy: &RepairPolicy) {
    let cap = capability.total_output_cap;
    let before = request.max_tokens;

    if let Some(forced) = policy.forced_max_tokens.filter(|m| *m > 0) {
        let applied = forced.min(cap);
        if request.max_tokens != Some(applied) {
            log_info!(
                repair_step = "max_tokens_override",
                model = %request.model,
                max_tokens_before = ?request.max_tokens,
                max_tokens_after = applied,
                model_cap = cap,
                "Applied operator max_tokens override"
            );
            request.max_tokens = Some(applied);
        }
    }

    if let Some(max_tokens) = request.max_tokens.filter(|m| *m > cap) {
        log_info!(
            repair_step = "max_tokens_clamp",
            model = %request.model,
            max_tokens_before = max_tokens,
            max_tokens_after = cap,
            "Clamped max_tokens to model output cap"
        );
        request.max_tokens = Some(cap);
    }

    if request.max_tokens != before {
        reconcile_budget(request, cap);
    }

    if capability.supports_thinking && request.thinking_budget().is_none() {
        log_warn!(
            repair_step = "thinking_disabled",
            model = %request.model,
            "Thinking-capable model is proceeding with thinking disabled"
        );
    }
}

fn reconcile_budget(request: &mut ConversionRequest, cap: u32) {
    let (Some(budget), Some(max_tokens)) = (request.thinking_budget(), request.max_tokens) else {
        return;
    };
    if budget.saturating_add(max_tokens) <= cap {
        return;
    }

    let shrunk = cap.saturating_sub(max_tokens);
    if shrunk >= MIN_THINKING_BUDGET {
        log_info!(
            repair_step = "thinking_budget_shrink",
            model = %request.model,
            budget_before = budget,
            budget_after = shrunk,
            max_tokens = max_tokens,
            "Shrunk thinking budget to fit model output cap"
        );
        request.thinking = Some(ThinkingConfig::Enabled {
            budget_tokens: shrunk,
        });
    } else {
        let removed = strip_placeholders(request);
        log_warn!(
            repair_step = "thinking_budget_shrink",
            model = %request.model,
            budget_before = budget,
            max_tokens = max_tokens,
            placeholders_removed = removed,
            "No room left for thinking after max_tokens enforcement; thinking disabled"
        );
        request.thinking = Some(ThinkingConfig::Disabled);
    }
}
