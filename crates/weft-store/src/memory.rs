// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory resource store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use tracing::debug;
use weft_dsl::ResourceKind;

use crate::watch::WatchHub;
use crate::{
    ETag, ResourceKey, ResourceStore, Result, StoreError, StoreEvent, StoreKind, StoreWatch,
    StoredResource,
};

/// Process-local store. Contents are dropped with the store.
pub struct MemoryResourceStore {
    entries: RwLock<BTreeMap<ResourceKey, StoredResource>>,
    watchers: WatchHub,
    closed: AtomicBool,
}

impl MemoryResourceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            watchers: WatchHub::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl Default for MemoryResourceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Memory
    }

    async fn put(&self, key: &ResourceKey, value: serde_json::Value) -> Result<ETag> {
        self.ensure_open()?;
        key.validate()?;
        let stored = StoredResource::new(value)?;
        let etag = stored.etag.clone();
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), stored);
        self.watchers.publish(StoreEvent::put(key.clone(), etag.clone()));
        Ok(etag)
    }

    async fn get(&self, key: &ResourceKey) -> Result<Option<StoredResource>> {
        self.ensure_open()?;
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn delete(&self, key: &ResourceKey) -> Result<bool> {
        self.ensure_open()?;
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some();
        if removed {
            self.watchers.publish(StoreEvent::delete(key.clone()));
        }
        Ok(removed)
    }

    async fn list(&self, project: &str, kind: ResourceKind) -> Result<Vec<ResourceKey>> {
        self.ensure_open()?;
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .keys()
            .filter(|key| key.project == project && key.kind == kind)
            .cloned()
            .collect())
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
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        debug!("Memory resource store closed");
        Ok(())
    }
}
