// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cache clients.
//!
//! A [`CacheClient`] is a string key-value cache with prefix scans and
//! pub/sub publishing. It backs [`CacheResourceStore`](crate::CacheResourceStore)
//! and is shared with any other component that needs a cache.
//!
//! - [`EmbeddedCache`]: in-process, optionally persisted to SQLite
//! - [`RedisCache`]: external Redis server

use async_trait::async_trait;

use crate::CacheError;

mod embedded;
mod redis_cache;

pub use embedded::{CacheMessage, EmbeddedCache, EmbeddedCacheOptions};
pub use redis_cache::RedisCache;

/// Minimal cache surface used by the runtime.
#[async_trait]
pub trait CacheClient: Send + Sync {
    /// Resolvable address of the cache (`host:port`, or an `embedded://` URI).
    fn address(&self) -> String;

    /// Fetch a value.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store a value.
    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;

    /// Remove a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// All keys starting with `prefix`, sorted.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError>;

    /// Publish a message on a channel.
    async fn publish(&self, channel: &str, message: &str) -> Result<(), CacheError>;

    /// Release the connection. Closing twice is not an error.
    async fn close(&self) -> Result<(), CacheError>;

    /// Whether [`close`](Self::close) has been called.
    fn is_closed(&self) -> bool;
}
