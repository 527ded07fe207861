// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource storage for the weft runtime.
//!
//! Resources are stored as JSON values under a [`ResourceKey`]
//! (project, kind, id). Two interchangeable [`ResourceStore`] implementations
//! exist:
//!
//! - [`MemoryResourceStore`]: process-local, lost on shutdown
//! - [`CacheResourceStore`]: durable, backed by any [`cache::CacheClient`]
//!   (the embedded cache with SQLite persistence, or Redis)
//!
//! Every write yields an [`ETag`] and a [`StoreEvent`] delivered to watchers.
//! A closed store rejects every operation with [`StoreError::Closed`].

#![deny(missing_docs)]

use async_trait::async_trait;
use weft_dsl::ResourceKind;

pub mod cache;
mod durable;
mod error;
mod key;
mod memory;
mod watch;

pub use durable::{CacheResourceStore, EVENTS_CHANNEL};
pub use error::{CacheError, Result, StoreError};
pub use key::{ETag, ResourceKey, StoreEvent, StoreEventKind, StoredResource};
pub use memory::MemoryResourceStore;
pub use watch::StoreWatch;

/// Backing flavour of a resource store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Process-local map.
    Memory,
    /// Backed by a cache client; survives the engine.
    Durable,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::Memory => write!(f, "memory"),
            StoreKind::Durable => write!(f, "durable"),
        }
    }
}

/// Key-value store for registered resources.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Backing flavour of this store.
    fn kind(&self) -> StoreKind;

    /// Insert or replace a resource, returning its new ETag.
    async fn put(&self, key: &ResourceKey, value: serde_json::Value) -> Result<ETag>;

    /// Fetch a resource, or `None` if the key is absent.
    async fn get(&self, key: &ResourceKey) -> Result<Option<StoredResource>>;

    /// Remove a resource. Returns whether the key existed.
    async fn delete(&self, key: &ResourceKey) -> Result<bool>;

    /// List keys of one kind within a project, sorted by id.
    async fn list(&self, project: &str, kind: ResourceKind) -> Result<Vec<ResourceKey>>;

    /// Subscribe to changes of one kind within a project.
    async fn watch(&self, project: &str, kind: ResourceKind) -> Result<StoreWatch>;

    /// Close the store. Subsequent operations fail with [`StoreError::Closed`].
    ///
    /// Closing twice is not an error.
    async fn close(&self) -> Result<()>;
}
