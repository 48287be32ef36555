use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Small in-memory TTL cache for read-heavy GET responses.
#[derive(Clone)]
pub struct TtlCache<V> {
    ttl: Duration,
    entries: Arc<RwLock<HashMap<String, (Instant, V)>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|(stored_at, _)| stored_at.elapsed() < self.ttl)
            .map(|(_, value)| value.clone())
    }

    pub async fn insert(&self, key: String, value: V) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, (stored_at, _)| stored_at.elapsed() < self.ttl);
        entries.insert(key, (Instant::now(), value));
    }

    pub async fn invalidate_all(&self) {
        let mut entries = self.entries.write().await;
        let dropped = entries.len();
        entries.clear();
        tracing::debug!(dropped, "cache invalidated");
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_fresh_values() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("products?page=1".to_string(), 7u32).await;
        assert_eq!(cache.get("products?page=1").await, Some(7));
        assert_eq!(cache.get("products?page=2").await, None);
    }

    #[tokio::test]
    async fn expired_values_are_not_returned() {
        let cache = TtlCache::new(Duration::from_millis(20));
        cache.insert("k".to_string(), "v".to_string()).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("k").await, None);

        cache.insert("other".to_string(), "w".to_string()).await;
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn invalidate_all_clears_everything() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("a".to_string(), 1).await;
        cache.insert("b".to_string(), 2).await;
        cache.invalidate_all().await;
        assert_eq!(cache.len().await, 0);
    }
}
