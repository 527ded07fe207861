// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for weft-store integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use weft_dsl::ResourceKind;
use weft_store::cache::{CacheClient, EmbeddedCache, EmbeddedCacheOptions, RedisCache};
use weft_store::{CacheResourceStore, ResourceKey};

/// Persistent embedded cache rooted in a temp directory.
pub struct PersistentCache {
    pub cache: Arc<EmbeddedCache>,
    pub dir: tempfile::TempDir,
}

impl PersistentCache {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let cache = open_in(&dir).await;
        Self { cache, dir }
    }

    /// Close the current cache and reopen from the same directory.
    pub async fn reopen(&mut self) {
        self.cache.close().await.expect("Failed to close cache");
        self.cache = open_in(&self.dir).await;
    }

    pub fn store(&self) -> CacheResourceStore {
        CacheResourceStore::new(self.cache.clone())
    }
}

async fn open_in(dir: &tempfile::TempDir) -> Arc<EmbeddedCache> {
    Arc::new(
        EmbeddedCache::start(EmbeddedCacheOptions::persistent(dir.path()))
            .await
            .expect("Failed to start embedded cache"),
    )
}

/// Connect to the Redis instance named by `WEFT_TEST_REDIS_URL`, if any.
pub async fn redis_cache() -> Option<Arc<RedisCache>> {
    let url = std::env::var("WEFT_TEST_REDIS_URL").ok()?;
    match RedisCache::connect(&url).await {
        Ok(cache) => Some(Arc::new(cache)),
        Err(e) => {
            eprintln!("Skipping test: could not connect to Redis: {}", e);
            None
        }
    }
}

/// Unique project name so parallel runs against a shared Redis don't collide.
pub fn unique_project(prefix: &str) -> String {
    format!(
        "{}-{}-{}",
        prefix,
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    )
}

pub fn agent_key(project: &str, id: &str) -> ResourceKey {
    ResourceKey::new(project, ResourceKind::Agent, id)
}
