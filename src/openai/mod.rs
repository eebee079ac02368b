//! Downstream side: OpenAI Chat Completions wire types

pub mod types;

pub use types::{
    ChatCompletion, ChatCompletionChunk, ChatMessage, Choice, ChunkChoice, Delta, FinishReason,
    FunctionCall, ToolCall, ToolCallDelta, Usage,
};
