//! In-process store for tests and ephemeral runs

use super::KvStore;
use crate::error::RelayResult;

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    written_at: i64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> RelayResult<Option<String>> {
        Ok(self.entries.read().await.get(key).map(|e| e.value.clone()))
    }

    async fn put(&self, key: &str, value: String) -> RelayResult<()> {
        let entry = Entry {
            value,
            written_at: chrono::Utc::now().timestamp(),
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> RelayResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn prune(&self, prefix: &str, written_before: i64) -> RelayResult<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, entry| !(key.starts_with(prefix) && entry.written_at <= written_before));
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_replaces_and_delete_removes() {
        let store = MemoryStore::new();

        store.put("k", "one".to_string()).await.unwrap();
        store.put("k", "two".to_string()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("two"));
        assert_eq!(store.len().await, 1);

        store.delete("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_prune_only_touches_prefix() {
        // Arrange
        let store = MemoryStore::new();
        store.put("conversation:a:toolu_1", "{}".to_string()).await.unwrap();
        store.put("conversation:b:toolu_2", "{}".to_string()).await.unwrap();
        store.put("credential:anthropic", "{}".to_string()).await.unwrap();
        let now = chrono::Utc::now().timestamp();

        // Act
        let kept = store.prune("conversation:", now - 60).await.unwrap();
        let removed = store.prune("conversation:", now + 1).await.unwrap();

        // Assert
        assert_eq!(kept, 0, "Recent entries stay");
        assert_eq!(removed, 2);
        assert!(
            store.get("credential:anthropic").await.unwrap().is_some(),
            "Other namespaces are never pruned"
        );
    }
}
