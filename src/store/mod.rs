//! Key-value persistence for the OAuth credential and conversation caches
//!
//! One store holds both namespaces, separated by key prefix:
//! - `credential:<account>` - the JSON-encoded [`crate::auth::Credential`]
//! - `conversation:<sha256>:<tool_use_id>` - one cached thinking block per tool call

pub mod conversation;
pub mod memory;
pub mod sqlite;

pub use conversation::{conversation_key, CachedThinking, ConversationCache};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::RelayResult;
use async_trait::async_trait;

/// Account identity used for the single subscription credential.
pub const DEFAULT_ACCOUNT: &str = "anthropic";

const CREDENTIAL_PREFIX: &str = "credential:";
/// Prefix shared by every conversation cache entry.
pub const CONVERSATION_PREFIX: &str = "conversation:";

/// Store key of an account's credential record.
pub fn credential_key(account: &str) -> String {
    format!("{CREDENTIAL_PREFIX}{account}")
}

/// Store key of the thinking block cached for one tool call.
pub fn conversation_entry_key(hash: &str, tool_use_id: &str) -> String {
    format!("{CONVERSATION_PREFIX}{hash}:{tool_use_id}")
}

/// Async key-value store. `put` replaces the whole value atomically and
/// stamps the key with the write time.
#[async_trait]
pub trait KvStore: Send + Sync + std::fmt::Debug {
    async fn get(&self, key: &str) -> RelayResult<Option<String>>;

    async fn put(&self, key: &str, value: String) -> RelayResult<()>;

    async fn delete(&self, key: &str) -> RelayResult<()>;

    /// Delete every key under `prefix` last written at or before
    /// `written_before` (epoch seconds). Returns the number removed.
    async fn prune(&self, prefix: &str, written_before: i64) -> RelayResult<usize>;
}
