//! Non-streaming conversion: Anthropic message to OpenAI chat completion

use crate::anthropic::AnthropicResponse;
use crate::core_types::ContentBlock;
use crate::logging::log_warn;
use crate::openai::{ChatCompletion, ChatMessage, Choice, FinishReason, FunctionCall, ToolCall, Usage};

pub fn convert_response(response: &AnthropicResponse) -> ChatCompletion {
    convert_response_at(response, chrono::Utc::now().timestamp())
}

/// Convert with an explicit `created` timestamp.
pub fn convert_response_at(response: &AnthropicResponse, created: i64) -> ChatCompletion {
    let mut text = String::new();
    let mut reasoning = String::new();
    let mut tool_calls = Vec::new();

    for block in &response.content {
        match block {
            ContentBlock::Text { text: part, .. } => text.push_str(part),
            ContentBlock::Thinking { thinking, .. } => reasoning.push_str(thinking),
            ContentBlock::ToolUse { id, name, input, .. } => {
                let arguments = serde_json::to_string(input).unwrap_or_else(|e| {
                    log_warn!(tool = %name, error = %e, "Failed to serialize tool input");
                    "{}".to_string()
                });
                tool_calls.push(ToolCall {
                    id: id.clone(),
                    call_type: "function".to_string(),
                    function: FunctionCall {
                        name: Some(name.clone()),
                        arguments,
                    },
                });
            }
            _ => {}
        }
    }

    let content = if text.is_empty() && !tool_calls.is_empty() {
        None
    } else {
        Some(text)
    };

    ChatCompletion {
        id: format!("chatcmpl-{}", response.id),
        object: "chat.completion".to_string(),
        created,
        model: response.model.clone(),
        choices: vec![Choice {
            index: 0,
            message: ChatMessage {
                role: "assistant".to_string(),
                content,
                reasoning_content: (!reasoning.is_empty()).then_some(reasoning),
                tool_calls,
            },
            finish_reason: Some(FinishReason::from_stop_reason(response.stop_reason.as_deref())),
        }],
        usage: Usage::new(response.usage.total_input_tokens(), response.usage.output_tokens),
    }
}
