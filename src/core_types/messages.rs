//! Inbound request model in the Anthropic Messages wire shape
//!
//! Only the fields the relay inspects or rewrites are typed. Everything else
//! (temperature, tool_choice, metadata, unknown block types, ...) is carried
//! through untouched so that the forwarded body matches what the caller sent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Conversation roles accepted on the inbound side.
///
/// `System` only appears when an OpenAI-style caller puts its system prompt in
/// the message list; repair moves those turns into the system field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

/// A single content unit of a turn.
///
/// Typed variants keep the keys they do not name (`cache_control`,
/// `citations`, ...) in `extra` so they are forwarded as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    Thinking {
        thinking: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    RedactedThinking {
        data: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    /// Images, documents and any block type the relay does not interpret.
    #[serde(untagged)]
    Other(Value),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            extra: Map::new(),
        }
    }

    pub fn thinking(thinking: impl Into<String>, signature: Option<String>) -> Self {
        Self::Thinking {
            thinking: thinking.into(),
            signature,
            extra: Map::new(),
        }
    }

    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
            extra: Map::new(),
        }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: Value::String(content.into()),
            is_error: None,
            extra: Map::new(),
        }
    }

    /// Thinking or redacted-thinking block.
    pub fn is_thinking(&self) -> bool {
        matches!(self, Self::Thinking { .. } | Self::RedactedThinking { .. })
    }

    /// Plain text carried by this block, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } => Some(text),
            _ => None,
        }
    }
}

/// Turn content: a bare string or a block list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// First block of the content; a non-empty string counts as a text block.
    pub fn starts_with_thinking(&self) -> bool {
        match self {
            MessageContent::Text(_) => false,
            MessageContent::Blocks(blocks) => blocks.first().is_some_and(ContentBlock::is_thinking),
        }
    }

    /// Convert string content into an equivalent block list in place.
    pub fn blocks_mut(&mut self) -> &mut Vec<ContentBlock> {
        if let MessageContent::Text(text) = self {
            let blocks = if text.is_empty() {
                Vec::new()
            } else {
                vec![ContentBlock::text(std::mem::take(text))]
            };
            *self = MessageContent::Blocks(blocks);
        }
        match self {
            MessageContent::Blocks(blocks) => blocks,
            MessageContent::Text(_) => unreachable!("text content converted above"),
        }
    }

    /// Concatenated text of all text blocks.
    pub fn plain_text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(ContentBlock::as_text)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Ids of the tool-use blocks in order.
    pub fn tool_use_ids(&self) -> Vec<&str> {
        match self {
            MessageContent::Text(_) => Vec::new(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::ToolUse { id, .. } => Some(id.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: MessageContent,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Turn {
    pub fn new(role: Role, content: MessageContent) -> Self {
        Self {
            role,
            content,
            extra: Map::new(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, MessageContent::Text(text.into()))
    }

    pub fn assistant(blocks: Vec<ContentBlock>) -> Self {
        Self::new(Role::Assistant, MessageContent::Blocks(blocks))
    }
}

/// Extended-thinking configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ThinkingConfig {
    Enabled { budget_tokens: u32 },
    Disabled,
}

impl ThinkingConfig {
    pub fn budget(&self) -> Option<u32> {
        match self {
            ThinkingConfig::Enabled { budget_tokens } => Some(*budget_tokens),
            ThinkingConfig::Disabled => None,
        }
    }
}

/// System text block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemBlock {
    #[serde(rename = "type")]
    pub block_type: String, // "text"
    pub text: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SystemBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            block_type: "text".to_string(),
            text: text.into(),
            extra: Map::new(),
        }
    }
}

/// System field can be either a string or an array of text blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    Text(String),
    Blocks(Vec<SystemBlock>),
}

impl SystemPrompt {
    /// Normalize into a block list.
    pub fn into_blocks(self) -> Vec<SystemBlock> {
        match self {
            SystemPrompt::Text(text) if text.is_empty() => Vec::new(),
            SystemPrompt::Text(text) => vec![SystemBlock::text(text)],
            SystemPrompt::Blocks(blocks) => blocks,
        }
    }
}

/// Caller-supplied request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    pub messages: Vec<Turn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemPrompt>,
    #[serde(default)]
    pub stream: bool,
    /// Fields the relay does not interpret, forwarded verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConversionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Turn>) -> Self {
        Self {
            model: model.into(),
            max_tokens: None,
            thinking: None,
            tools: Vec::new(),
            messages,
            system: None,
            stream: false,
            extra: Map::new(),
        }
    }

    /// Thinking budget when thinking is enabled.
    pub fn thinking_budget(&self) -> Option<u32> {
        self.thinking.as_ref().and_then(ThinkingConfig::budget)
    }

    /// System content as text blocks, without consuming it.
    pub fn system_blocks(&self) -> Vec<SystemBlock> {
        self.system.clone().map(SystemPrompt::into_blocks).unwrap_or_default()
    }
}
