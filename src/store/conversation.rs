//! Per-conversation thinking-block cache
//!
//! Tool-using clients replay assistant turns without the thinking block that
//! preceded each tool call. The signed block is recorded here when the
//! response passes through, keyed by the tool-use id that followed it, so that
//! later requests in the same conversation can be healed with the authentic
//! block instead of a placeholder.
//!
//! A conversation is identified by the SHA-256 of its first user turn text.
//! Entries expire after a TTL and are swept at most every few minutes.

use super::{conversation_entry_key, KvStore, CONVERSATION_PREFIX};
use crate::core_types::{ContentBlock, ConversionRequest, MessageContent, Role};
use crate::error::{RelayError, RelayResult};
use crate::logging::{log_debug, log_info, log_warn};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A signed thinking block as it was produced upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedThinking {
    pub thinking: String,
    pub signature: String,
}

impl CachedThinking {
    pub fn into_block(self) -> ContentBlock {
        ContentBlock::thinking(self.thinking, Some(self.signature))
    }
}

/// Hex SHA-256 of the first user turn, or `None` when there is no user text.
pub fn conversation_key(request: &ConversionRequest) -> Option<String> {
    let first_user = request.messages.iter().find(|turn| turn.role == Role::User)?;
    let text = first_user.content.plain_text();
    if text.is_empty() {
        return None;
    }
    Some(hex::encode(Sha256::digest(text.as_bytes())))
}

/// Pair each tool-use block with the signed thinking block preceding it.
pub fn signed_thinking_before_tools(blocks: &[ContentBlock]) -> Vec<(String, CachedThinking)> {
    let mut recorded = Vec::new();
    let mut pending: Option<CachedThinking> = None;
    for block in blocks {
        match block {
            ContentBlock::Thinking {
                thinking,
                signature: Some(signature),
                ..
            } if !signature.is_empty() => {
                pending = Some(CachedThinking {
                    thinking: thinking.clone(),
                    signature: signature.clone(),
                });
            }
            ContentBlock::ToolUse { id, .. } => {
                if let Some(cached) = &pending {
                    recorded.push((id.clone(), cached.clone()));
                }
            }
            _ => {}
        }
    }
    recorded
}

/// Entries older than this are ignored on recall and pruned on write.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Minimum spacing between two prune sweeps.
const PRUNE_INTERVAL_SECS: i64 = 300;

#[derive(Debug, Serialize, Deserialize)]
struct StoredThinking {
    thinking: String,
    signature: String,
    recorded_at: i64,
}

/// Store-backed cache of signed thinking blocks.
///
/// Each tool call is its own key, so concurrent responses of one
/// conversation never overwrite each other's entries.
#[derive(Debug, Clone)]
pub struct ConversationCache {
    store: Arc<dyn KvStore>,
    ttl_secs: i64,
    last_pruned: Arc<AtomicI64>,
}

impl ConversationCache {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self::with_ttl(store, DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl_secs: i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX),
            last_pruned: Arc::new(AtomicI64::new(0)),
        }
    }

    fn expiry_cutoff(&self, now: i64) -> i64 {
        now.saturating_sub(self.ttl_secs)
    }

    async fn load_entry(&self, key: &str, tool_use_id: &str, cutoff: i64) -> RelayResult<Option<CachedThinking>> {
        let Some(raw) = self.store.get(&conversation_entry_key(key, tool_use_id)).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<StoredThinking>(&raw) {
            Ok(stored) if stored.recorded_at > cutoff => Ok(Some(CachedThinking {
                thinking: stored.thinking,
                signature: stored.signature,
            })),
            Ok(_) => Ok(None),
            Err(e) => {
                log_warn!(
                    conversation = %key,
                    tool_use_id = %tool_use_id,
                    error = %e,
                    "Discarding unreadable conversation cache entry"
                );
                Ok(None)
            }
        }
    }

    /// Cached blocks for assistant turns that lost their thinking block,
    /// keyed by the turn's first tool-use id.
    pub async fn recall(
        &self,
        request: &ConversionRequest,
    ) -> RelayResult<HashMap<String, CachedThinking>> {
        let Some(key) = conversation_key(request) else {
            return Ok(HashMap::new());
        };

        let wanted: Vec<&str> = request
            .messages
            .iter()
            .filter(|turn| turn.role == Role::Assistant && !turn.content.starts_with_thinking())
            .filter_map(|turn| first_tool_use_id(&turn.content))
            .collect();
        if wanted.is_empty() {
            return Ok(HashMap::new());
        }

        let cutoff = self.expiry_cutoff(chrono::Utc::now().timestamp());
        let mut recalled = HashMap::new();
        for id in wanted {
            if let Some(cached) = self.load_entry(&key, id, cutoff).await? {
                recalled.insert(id.to_string(), cached);
            }
        }

        log_debug!(
            conversation = %key,
            recalled = recalled.len(),
            "Recalled cached thinking blocks"
        );
        Ok(recalled)
    }

    /// Record newly observed blocks, one entry per tool call.
    pub async fn remember(&self, key: &str, observed: Vec<(String, CachedThinking)>) -> RelayResult<()> {
        if observed.is_empty() {
            return Ok(());
        }
        let now = chrono::Utc::now().timestamp();
        self.prune_if_due(now).await;

        let added = observed.len();
        for (tool_use_id, cached) in observed {
            let stored = StoredThinking {
                thinking: cached.thinking,
                signature: cached.signature,
                recorded_at: now,
            };
            let encoded = serde_json::to_string(&stored)
                .map_err(|e| RelayError::storage(format!("Failed to encode cache entry: {e}")))?;
            self.store
                .put(&conversation_entry_key(key, &tool_use_id), encoded)
                .await?;
        }

        log_debug!(conversation = %key, added = added, "Conversation cache updated");
        Ok(())
    }

    /// Delete every entry past the TTL across all conversations.
    pub async fn prune_expired(&self) -> RelayResult<usize> {
        let cutoff = self.expiry_cutoff(chrono::Utc::now().timestamp());
        let removed = self.store.prune(CONVERSATION_PREFIX, cutoff).await?;
        if removed > 0 {
            log_info!(removed = removed, "Pruned expired conversation cache entries");
        }
        Ok(removed)
    }

    async fn prune_if_due(&self, now: i64) {
        let last = self.last_pruned.load(Ordering::Relaxed);
        if now - last < PRUNE_INTERVAL_SECS {
            return;
        }
        if self
            .last_pruned
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        if let Err(e) = self.prune_expired().await {
            log_warn!(error = %e, "Conversation cache prune failed");
        }
    }
}

fn first_tool_use_id(content: &MessageContent) -> Option<&str> {
    content.tool_use_ids().into_iter().next()
}
