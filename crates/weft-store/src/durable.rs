// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource store backed by a cache client.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{debug, warn};
use weft_dsl::ResourceKind;

use crate::cache::CacheClient;
use crate::watch::WatchHub;
use crate::{
    ETag, ResourceKey, ResourceStore, Result, StoreError, StoreEvent, StoreKind, StoreWatch,
    StoredResource,
};

const KEY_PREFIX: &str = "weft:res";

/// Channel that store events are published on.
pub const EVENTS_CHANNEL: &str = "weft:res:events";

/// Durable store over any [`CacheClient`].
///
/// Values are kept as JSON-encoded [`StoredResource`] under
/// `weft:res:<project>:<kind>:<id>`. Changes are delivered to local watchers
/// and published on [`EVENTS_CHANNEL`] for other processes.
///
/// Closing the store does not close the cache; the cache's owner does that.
pub struct CacheResourceStore {
    cache: Arc<dyn CacheClient>,
    watchers: WatchHub,
    closed: AtomicBool,
}

impl CacheResourceStore {
    /// Wrap a cache client.
    pub fn new(cache: Arc<dyn CacheClient>) -> Self {
        Self {
            cache,
            watchers: WatchHub::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Address of the backing cache.
    pub fn cache_address(&self) -> String {
        self.cache.address()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    async fn emit(&self, event: StoreEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => {
                if let Err(e) = self.cache.publish(EVENTS_CHANNEL, &payload).await {
                    warn!(key = %event.key, error = %e, "Failed to publish store event");
                }
            }
            Err(e) => warn!(key = %event.key, error = %e, "Failed to encode store event"),
        }
        self.watchers.publish(event);
    }
}

fn list_prefix(project: &str, kind: ResourceKind) -> String {
    format!("{KEY_PREFIX}:{project}:{kind}:")
}

fn cache_key(key: &ResourceKey) -> String {
    format!("{}{}", list_prefix(&key.project, key.kind), key.id)
}

#[async_trait]
impl ResourceStore for CacheResourceStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Durable
    }

    async fn put(&self, key: &ResourceKey, value: serde_json::Value) -> Result<ETag> {
        self.ensure_open()?;
        key.validate()?;
        let stored = StoredResource::new(value)?;
        let encoded = serde_json::to_string(&stored)?;
        self.cache.set(&cache_key(key), &encoded).await?;
        self.emit(StoreEvent::put(key.clone(), stored.etag.clone()))
            .await;
        Ok(stored.etag)
    }

    async fn get(&self, key: &ResourceKey) -> Result<Option<StoredResource>> {
        self.ensure_open()?;
        match self.cache.get(&cache_key(key)).await? {
            Some(encoded) => Ok(Some(serde_json::from_str(&encoded)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &ResourceKey) -> Result<bool> {
        self.ensure_open()?;
        let removed = self.cache.delete(&cache_key(key)).await?;
        if removed {
            self.emit(StoreEvent::delete(key.clone())).await;
        }
        Ok(removed)
    }

    async fn list(&self, project: &str, kind: ResourceKind) -> Result<Vec<ResourceKey>> {
        self.ensure_open()?;
        let prefix = list_prefix(project, kind);
        let mut keys: Vec<ResourceKey> = self
            .cache
            .scan_prefix(&prefix)
            .await?
            .into_iter()
            .filter_map(|raw| {
                raw.strip_prefix(&prefix)
                    .map(|id| ResourceKey::new(project, kind, id))
            })
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn watch(&self, project: &str, kind: ResourceKind) -> Result<StoreWatch> {
        self.ensure_open()?;
        self.watchers
            .subscribe(project, kind)
            .ok_or(StoreError::Closed)
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.watchers.close();
        debug!(cache = %self.cache.address(), "Cache resource store closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EmbeddedCache;
    use serde_json::json;

    #[test]
    fn test_cache_key_layout() {
        let key = ResourceKey::new("demo", ResourceKind::Knowledge, "docs");
        assert_eq!(cache_key(&key), "weft:res:demo:knowledge:docs");
    }

    #[tokio::test]
    async fn test_store_over_embedded_cache() {
        let cache = Arc::new(EmbeddedCache::in_memory().await.unwrap());
        let mut events = cache.subscribe();
        let store = CacheResourceStore::new(cache.clone());
        assert_eq!(store.kind(), StoreKind::Durable);

        let key = ResourceKey::new("demo", ResourceKind::Workflow, "checkout");
        let etag = store.put(&key, json!({"id": "checkout"})).await.unwrap();

        let stored = store.get(&key).await.unwrap().unwrap();
        assert_eq!(stored.etag, etag);

        let published = events.recv().await.unwrap();
        assert_eq!(published.channel, EVENTS_CHANNEL);
        let event: StoreEvent = serde_json::from_str(&published.payload).unwrap();
        assert_eq!(event.key, key);

        let listed = store.list("demo", ResourceKind::Workflow).await.unwrap();
        assert_eq!(listed, vec![key.clone()]);
    }

    #[tokio::test]
    async fn test_close_leaves_cache_open() {
        let cache = Arc::new(EmbeddedCache::in_memory().await.unwrap());
        let store = CacheResourceStore::new(cache.clone());
        store.close().await.unwrap();

        let key = ResourceKey::new("demo", ResourceKind::Tool, "t");
        assert!(matches!(
            store.put(&key, json!({})).await,
            Err(StoreError::Closed)
        ));
        assert!(!cache.is_closed());
    }
}
