//! Records signed thinking blocks from a live stream for the conversation cache

use crate::anthropic::{BlockDelta, StreamEvent};
use crate::core_types::ContentBlock;
use crate::store::CachedThinking;

#[derive(Debug, Default)]
struct OpenThinking {
    index: usize,
    thinking: String,
    signature: String,
}

/// Pairs each streamed tool-use block with the signed thinking block that
/// preceded it. Fed the same events as the converter; holds at most one
/// thinking block at a time.
#[derive(Debug, Default)]
pub struct ThinkingRecorder {
    open: Option<OpenThinking>,
    last_signed: Option<CachedThinking>,
    recorded: Vec<(String, CachedThinking)>,
}

impl ThinkingRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::ContentBlockStart {
                index,
                content_block: ContentBlock::Thinking {
                    thinking, signature, ..
                },
            } => {
                self.open = Some(OpenThinking {
                    index: *index,
                    thinking: thinking.clone(),
                    signature: signature.clone().unwrap_or_default(),
                });
            }
            StreamEvent::ContentBlockStart {
                content_block: ContentBlock::ToolUse { id, .. },
                ..
            } => {
                if let Some(cached) = &self.last_signed {
                    self.recorded.push((id.clone(), cached.clone()));
                }
            }
            StreamEvent::ContentBlockDelta { index, delta } => {
                let Some(open) = self.open.as_mut().filter(|o| o.index == *index) else {
                    return;
                };
                match delta {
                    BlockDelta::ThinkingDelta { thinking } => open.thinking.push_str(thinking),
                    BlockDelta::SignatureDelta { signature } => open.signature.push_str(signature),
                    _ => {}
                }
            }
            StreamEvent::ContentBlockStop { index } => {
                if self.open.as_ref().is_some_and(|o| o.index == *index) {
                    if let Some(open) = self.open.take() {
                        if !open.signature.is_empty() {
                            self.last_signed = Some(CachedThinking {
                                thinking: open.thinking,
                                signature: open.signature,
                            });
                        }
                    }
                }
            }
            _ => {}
        }
    }

    /// Tool-use id to thinking pairs seen so far.
    pub fn finish(self) -> Vec<(String, CachedThinking)> {
        self.recorded
    }
}
