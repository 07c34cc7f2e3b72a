use crate::core::{RelatedObject, Result, TargetKey};
use crate::interface::ObjectResolver;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Object cache with an optional "remote" tier reachable only through `fetch`.
#[derive(Default)]
pub struct InMemoryObjectCache {
    local: RwLock<HashMap<TargetKey, RelatedObject>>,
    remote: RwLock<HashMap<TargetKey, RelatedObject>>,
    fetches: AtomicUsize,
}

impl InMemoryObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, object: RelatedObject) {
        if let Ok(mut local) = self.local.write() {
            local.insert(object.key(), object);
        }
    }

    /// Makes `object` available to `fetch` only.
    pub fn insert_remote(&self, object: RelatedObject) {
        if let Ok(mut remote) = self.remote.write() {
            remote.insert(object.key(), object);
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectResolver for InMemoryObjectCache {
    fn resolve_cached(&self, type_name: &str, id: i64) -> Option<RelatedObject> {
        let local = self.local.read().ok()?;
        local.get(&TargetKey::new(id, type_name)).cloned()
    }

    async fn fetch(&self, type_name: &str, id: i64) -> Result<Option<RelatedObject>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let key = TargetKey::new(id, type_name);
        let found = self.remote.read()?.get(&key).cloned();
        // Fetched objects become locally cached, like a model store would.
        if let Some(object) = &found {
            self.local.write()?.insert(key, object.clone());
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_populates_local_tier() {
        let cache = InMemoryObjectCache::new();
        cache.insert_remote(RelatedObject::new(2, "Person", "Ada"));

        assert!(cache.resolve_cached("Person", 2).is_none());
        let fetched = cache.fetch("Person", 2).await.unwrap();
        assert_eq!(fetched.map(|p| p.title), Some("Ada".to_string()));
        assert!(cache.resolve_cached("Person", 2).is_some());
        assert_eq!(cache.fetch_count(), 1);
    }
}
