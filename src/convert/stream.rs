//! Streaming transducer: Anthropic stream events to OpenAI chunks
//!
//! One [`StreamConverter`] per stream. It holds only per-block bookkeeping,
//! cumulative usage and the finish reason; text is forwarded as it arrives and
//! never retained. Output order follows input order exactly.

use crate::anthropic::{BlockDelta, StreamEvent, Usage as UpstreamUsage, UsageDelta};
use crate::core_types::ContentBlock;
use crate::logging::{log_debug, log_warn};
use crate::openai::{ChatCompletionChunk, Delta, FinishReason, FunctionCall, ToolCallDelta, Usage};

use std::collections::HashMap;

/// One unit of downstream output.
#[derive(Debug, Clone, PartialEq)]
pub enum DownstreamEvent {
    Chunk(ChatCompletionChunk),
    /// The `[DONE]` terminator.
    Done,
}

impl DownstreamEvent {
    /// SSE framing of this event.
    pub fn to_sse(&self) -> String {
        match self {
            DownstreamEvent::Chunk(chunk) => match serde_json::to_string(chunk) {
                Ok(json) => format!("data: {json}\n\n"),
                Err(e) => {
                    log_warn!(error = %e, "Failed to encode chunk");
                    String::new()
                }
            },
            DownstreamEvent::Done => "data: [DONE]\n\n".to_string(),
        }
    }
}

/// Cumulative token counts observed on an upstream stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageFold {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl UsageFold {
    pub fn observe_start(&mut self, usage: &UpstreamUsage) {
        self.input_tokens = self.input_tokens.max(usage.total_input_tokens());
        self.output_tokens = self.output_tokens.max(usage.output_tokens);
    }

    /// Upstream delta counts are cumulative, so the largest value wins.
    pub fn observe_delta(&mut self, usage: &UsageDelta) {
        if usage.input_tokens.is_some()
            || usage.cache_creation_input_tokens.is_some()
            || usage.cache_read_input_tokens.is_some()
        {
            let input = usage.input_tokens.unwrap_or(0)
                + usage.cache_creation_input_tokens.unwrap_or(0)
                + usage.cache_read_input_tokens.unwrap_or(0);
            self.input_tokens = self.input_tokens.max(input);
        }
        if let Some(output) = usage.output_tokens {
            self.output_tokens = self.output_tokens.max(output);
        }
    }

    /// Fold any usage-bearing event.
    pub fn observe(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::MessageStart { message } => self.observe_start(&message.usage),
            StreamEvent::MessageDelta {
                usage: Some(usage), ..
            } => self.observe_delta(usage),
            _ => {}
        }
    }

    pub fn to_openai(self) -> Usage {
        Usage::new(self.input_tokens, self.output_tokens)
    }
}

/// In-progress tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    tool_index: usize,
    arguments: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum OpenBlock {
    Text,
    Thinking,
    ToolUse(ToolCallAccumulator),
    Ignored,
}

/// Per-stream converter state.
#[derive(Debug, Clone)]
pub struct ConverterState {
    id: String,
    model: String,
    created: i64,
    /// Downstream index given to the next tool call.
    cursor: usize,
    blocks: HashMap<usize, OpenBlock>,
    usage: UsageFold,
    finish_reason: Option<FinishReason>,
    finished: bool,
}

/// Single-pass Anthropic-to-OpenAI stream transducer.
#[derive(Debug, Clone)]
pub struct StreamConverter {
    state: ConverterState,
}

impl StreamConverter {
    pub fn new(model: impl Into<String>) -> Self {
        Self::with_created(model, chrono::Utc::now().timestamp())
    }

    pub fn with_created(model: impl Into<String>, created: i64) -> Self {
        Self {
            state: ConverterState {
                id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
                model: model.into(),
                created,
                cursor: 0,
                blocks: HashMap::new(),
                usage: UsageFold::default(),
                finish_reason: None,
                finished: false,
            },
        }
    }

    /// `message_stop` has been seen and the terminator emitted.
    pub fn is_finished(&self) -> bool {
        self.state.finished
    }

    pub fn usage(&self) -> UsageFold {
        self.state.usage
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.state.finish_reason
    }

    fn chunk(&self, delta: Delta) -> DownstreamEvent {
        DownstreamEvent::Chunk(ChatCompletionChunk::new(
            &self.state.id,
            self.state.created,
            &self.state.model,
            delta,
        ))
    }

    fn text_chunk(&self, text: &str) -> DownstreamEvent {
        self.chunk(Delta {
            content: Some(text.to_string()),
            ..Default::default()
        })
    }

    fn reasoning_chunk(&self, thinking: &str) -> DownstreamEvent {
        self.chunk(Delta {
            reasoning_content: Some(thinking.to_string()),
            ..Default::default()
        })
    }

    fn tool_chunk(&self, call: ToolCallDelta) -> DownstreamEvent {
        self.chunk(Delta {
            tool_calls: Some(vec![call]),
            ..Default::default()
        })
    }

    /// Consume one upstream event, producing zero or more downstream events.
    pub fn on_event(&mut self, event: &StreamEvent) -> Vec<DownstreamEvent> {
        if self.state.finished {
            return Vec::new();
        }
        self.state.usage.observe(event);

        match event {
            StreamEvent::MessageStart { message } => {
                if !message.id.is_empty() {
                    self.state.id = format!("chatcmpl-{}", message.id);
                }
                if !message.model.is_empty() {
                    self.state.model = message.model.clone();
                }
                vec![self.chunk(Delta {
                    role: Some("assistant".to_string()),
                    ..Default::default()
                })]
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => self.open_block(*index, content_block),
            StreamEvent::ContentBlockDelta { index, delta } => self.block_delta(*index, delta),
            StreamEvent::ContentBlockStop { index } => {
                if let Some(OpenBlock::ToolUse(call)) = self.state.blocks.remove(index) {
                    log_debug!(
                        tool = %call.name,
                        tool_index = call.tool_index,
                        argument_bytes = call.arguments.len(),
                        "Tool call closed"
                    );
                }
                Vec::new()
            }
            StreamEvent::MessageDelta { delta, .. } => {
                if delta.stop_reason.is_some() {
                    self.state.finish_reason =
                        Some(FinishReason::from_stop_reason(delta.stop_reason.as_deref()));
                }
                Vec::new()
            }
            StreamEvent::MessageStop => {
                self.state.finished = true;
                self.state.blocks.clear();
                let mut last = ChatCompletionChunk::new(
                    &self.state.id,
                    self.state.created,
                    &self.state.model,
                    Delta::default(),
                );
                if let Some(choice) = last.choices.first_mut() {
                    choice.finish_reason = Some(self.state.finish_reason.unwrap_or(FinishReason::Stop));
                }
                last.usage = Some(self.state.usage.to_openai());
                vec![DownstreamEvent::Chunk(last), DownstreamEvent::Done]
            }
            StreamEvent::Error { error } => {
                log_warn!(error = %error, "Upstream reported an error mid-stream");
                Vec::new()
            }
            StreamEvent::Ping | StreamEvent::Unknown => Vec::new(),
        }
    }

    fn open_block(&mut self, index: usize, block: &ContentBlock) -> Vec<DownstreamEvent> {
        match block {
            ContentBlock::Text { text, .. } => {
                self.state.blocks.insert(index, OpenBlock::Text);
                if text.is_empty() {
                    Vec::new()
                } else {
                    vec![self.text_chunk(text)]
                }
            }
            ContentBlock::Thinking { thinking, .. } => {
                self.state.blocks.insert(index, OpenBlock::Thinking);
                if thinking.is_empty() {
                    Vec::new()
                } else {
                    vec![self.reasoning_chunk(thinking)]
                }
            }
            ContentBlock::ToolUse { id, name, .. } => {
                let tool_index = self.state.cursor;
                self.state.cursor += 1;
                self.state.blocks.insert(
                    index,
                    OpenBlock::ToolUse(ToolCallAccumulator {
                        id: id.clone(),
                        name: name.clone(),
                        tool_index,
                        arguments: String::new(),
                    }),
                );
                vec![self.tool_chunk(ToolCallDelta {
                    index: tool_index,
                    id: Some(id.clone()),
                    call_type: Some("function".to_string()),
                    function: FunctionCall {
                        name: Some(name.clone()),
                        arguments: String::new(),
                    },
                })]
            }
            _ => {
                self.state.blocks.insert(index, OpenBlock::Ignored);
                Vec::new()
            }
        }
    }

    fn block_delta(&mut self, index: usize, delta: &BlockDelta) -> Vec<DownstreamEvent> {
        let Some(open) = self.state.blocks.get_mut(&index) else {
            log_warn!(index = index, "Delta for a content block that is not open; skipped");
            return Vec::new();
        };

        match (open, delta) {
            (OpenBlock::Text, BlockDelta::TextDelta { text }) => vec![self.text_chunk(text)],
            (OpenBlock::Thinking, BlockDelta::ThinkingDelta { thinking }) => {
                vec![self.reasoning_chunk(thinking)]
            }
            (OpenBlock::ToolUse(call), BlockDelta::InputJsonDelta { partial_json }) => {
                call.arguments.push_str(partial_json);
                let tool_index = call.tool_index;
                vec![self.tool_chunk(ToolCallDelta {
                    index: tool_index,
                    id: None,
                    call_type: None,
                    function: FunctionCall {
                        name: None,
                        arguments: partial_json.clone(),
                    },
                })]
            }
            (_, BlockDelta::SignatureDelta { .. }) | (OpenBlock::Ignored, _) => Vec::new(),
            (_, other) => {
                log_warn!(index = index, delta = ?other, "Delta does not match its block type; skipped");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anthropic::types::{MessageDeltaBody, StreamMessage};
    use serde_json::json;

    fn message_start() -> StreamEvent {
        StreamEvent::MessageStart {
            message: StreamMessage {
                id: "msg_01".to_string(),
                model: "claude-sonnet-4-20250514".to_string(),
                usage: UpstreamUsage {
                    input_tokens: 25,
                    output_tokens: 1,
                    ..Default::default()
                },
            },
        }
    }

    fn message_delta(stop_reason: &str, output_tokens: u32) -> StreamEvent {
        StreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: Some(stop_reason.to_string()),
                stop_sequence: None,
            },
            usage: Some(UsageDelta {
                output_tokens: Some(output_tokens),
                ..Default::default()
            }),
        }
    }

    fn run(events: &[StreamEvent]) -> Vec<DownstreamEvent> {
        let mut converter = StreamConverter::with_created("claude-sonnet-4", 0);
        events.iter().flat_map(|e| converter.on_event(e)).collect()
    }

    fn chunks(output: &[DownstreamEvent]) -> Vec<&ChatCompletionChunk> {
        output
            .iter()
            .filter_map(|e| match e {
                DownstreamEvent::Chunk(chunk) => Some(chunk),
                DownstreamEvent::Done => None,
            })
            .collect()
    }

    #[test]
    fn test_text_only_message() {
        // Arrange
        let events = vec![
            message_start(),
            StreamEvent::ContentBlockStart {
                index: 0,
                content_block: ContentBlock::text(""),
            },
            StreamEvent::Ping,
            StreamEvent::ContentBlockDelta {
                index: 0,
                delta: BlockDelta::TextDelta {
                    text: "Hello, world".to_string(),
                },
            },
            StreamEvent::ContentBlockStop { index: 0 },
            message_delta("end_turn", 12),
            StreamEvent::MessageStop,
        ];

        // Act
        let output = run(&events);

        // Assert
        let chunks = chunks(&output);
        let contents: Vec<&str> = chunks
            .iter()
            .filter_map(|c| c.delta().and_then(|d| d.content.as_deref()))
            .collect();
        assert_eq!(contents, vec!["Hello, world"], "Exactly one content delta");
        let last = chunks.last().unwrap();
        assert_eq!(last.finish_reason(), Some(FinishReason::Stop));
        assert_eq!(last.usage, Some(Usage::new(25, 12)));
        assert_eq!(output.last(), Some(&DownstreamEvent::Done));
    }

    #[test]
    fn test_tool_call_fragments_are_forwarded_in_order() {
        // Arrange
        let input = json!({"path": "src/main.rs", "line": 42});
        let serialized = serde_json::to_string(&input).unwrap();
        let fragments: Vec<String> = serialized
            .as_bytes()
            .chunks(5)
            .map(|c| String::from_utf8(c.to_vec()).unwrap())
            .collect();
        let mut events = vec![
            message_start(),
            StreamEvent::ContentBlockStart {
                index: 0,
                content_block: ContentBlock::tool_use("toolu_01", "read_file", json!({})),
            },
        ];
        events.extend(fragments.iter().map(|f| StreamEvent::ContentBlockDelta {
            index: 0,
            delta: BlockDelta::InputJsonDelta {
                partial_json: f.clone(),
            },
        }));
        events.push(StreamEvent::ContentBlockStop { index: 0 });
        events.push(message_delta("tool_use", 30));
        events.push(StreamEvent::MessageStop);

        // Act
        let output = run(&events);

        // Assert
        let calls: Vec<&ToolCallDelta> = chunks(&output)
            .into_iter()
            .filter_map(|c| c.delta().and_then(|d| d.tool_calls.as_ref()))
            .flatten()
            .collect();
        assert_eq!(calls[0].id.as_deref(), Some("toolu_01"));
        assert_eq!(calls[0].function.name.as_deref(), Some("read_file"));
        assert_eq!(calls[0].function.arguments, "", "Identity announced before arguments");
        let joined: String = calls[1..].iter().map(|c| c.function.arguments.as_str()).collect();
        assert_eq!(joined, serialized);
        assert!(calls.iter().all(|c| c.index == 0));
        assert_eq!(
            chunks(&output).last().unwrap().finish_reason(),
            Some(FinishReason::ToolCalls)
        );
    }

    #[test]
    fn test_thinking_streams_as_reasoning_and_signature_is_dropped() {
        let output = run(&[
            message_start(),
            StreamEvent::ContentBlockStart {
                index: 0,
                content_block: ContentBlock::thinking("", None),
            },
            StreamEvent::ContentBlockDelta {
                index: 0,
                delta: BlockDelta::ThinkingDelta {
                    thinking: "Let me think".to_string(),
                },
            },
            StreamEvent::ContentBlockDelta {
                index: 0,
                delta: BlockDelta::SignatureDelta {
                    signature: "sig".to_string(),
                },
            },
            StreamEvent::ContentBlockStop { index: 0 },
        ]);

        let reasoning: Vec<&str> = chunks(&output)
            .iter()
            .filter_map(|c| c.delta().and_then(|d| d.reasoning_content.as_deref()))
            .collect();
        assert_eq!(reasoning, vec!["Let me think"]);
        assert_eq!(chunks(&output).len(), 2, "Role chunk plus one reasoning chunk");
    }

    #[test]
    fn test_second_tool_call_gets_next_index() {
        let output = run(&[
            message_start(),
            StreamEvent::ContentBlockStart {
                index: 0,
                content_block: ContentBlock::text(""),
            },
            StreamEvent::ContentBlockStart {
                index: 1,
                content_block: ContentBlock::tool_use("toolu_a", "a", json!({})),
            },
            StreamEvent::ContentBlockStart {
                index: 2,
                content_block: ContentBlock::tool_use("toolu_b", "b", json!({})),
            },
            StreamEvent::ContentBlockDelta {
                index: 2,
                delta: BlockDelta::InputJsonDelta {
                    partial_json: "{}".to_string(),
                },
            },
        ]);

        let indices: Vec<usize> = chunks(&output)
            .iter()
            .filter_map(|c| c.delta().and_then(|d| d.tool_calls.as_ref()))
            .flatten()
            .map(|c| c.index)
            .collect();
        assert_eq!(indices, vec![0, 1, 1]);
    }

    #[test]
    fn test_stray_delta_is_skipped_and_nothing_follows_stop() {
        let mut converter = StreamConverter::with_created("m", 0);

        let stray = converter.on_event(&StreamEvent::ContentBlockDelta {
            index: 7,
            delta: BlockDelta::TextDelta {
                text: "orphan".to_string(),
            },
        });
        let stop = converter.on_event(&StreamEvent::MessageStop);
        let after = converter.on_event(&message_start());

        assert!(stray.is_empty());
        assert_eq!(stop.len(), 2);
        assert!(converter.is_finished());
        assert!(after.is_empty());
    }

    #[test]
    fn test_usage_keeps_largest_cumulative_count() {
        let mut fold = UsageFold::default();

        fold.observe(&message_delta("end_turn", 40));
        fold.observe(&message_delta("end_turn", 10));

        assert_eq!(fold.output_tokens, 40);
    }

    #[test]
    fn test_sse_framing() {
        assert_eq!(DownstreamEvent::Done.to_sse(), "data: [DONE]\n\n");
        let chunk = run(&[message_start()]).remove(0).to_sse();
        assert!(chunk.starts_with("data: {") && chunk.ends_with("}\n\n"));
    }
}
