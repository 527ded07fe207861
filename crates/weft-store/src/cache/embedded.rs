// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process cache used in standalone mode.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::CacheClient;
use crate::CacheError;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const CACHE_DB_FILE: &str = "cache.db";

/// Options for [`EmbeddedCache::start`].
#[derive(Debug, Clone, Default)]
pub struct EmbeddedCacheOptions {
    /// Directory for write-through persistence. `None` keeps the cache in memory only.
    pub data_dir: Option<PathBuf>,
}

impl EmbeddedCacheOptions {
    /// Options for a persistent cache rooted at `data_dir`.
    pub fn persistent(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
        }
    }
}

/// A message published on an embedded cache channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheMessage {
    /// Channel name.
    pub channel: String,
    /// Payload.
    pub payload: String,
}

/// In-process cache. With persistence enabled every write goes through to
/// `<data_dir>/cache.db` and the contents are reloaded on the next start.
pub struct EmbeddedCache {
    entries: RwLock<BTreeMap<String, String>>,
    pool: Option<SqlitePool>,
    db_path: Option<PathBuf>,
    messages: broadcast::Sender<CacheMessage>,
    closed: AtomicBool,
}

impl EmbeddedCache {
    /// Start a cache with the given options.
    pub async fn start(options: EmbeddedCacheOptions) -> Result<Self, CacheError> {
        let (messages, _) = broadcast::channel(128);
        let Some(data_dir) = options.data_dir else {
            debug!("Embedded cache started in memory");
            return Ok(Self {
                entries: RwLock::new(BTreeMap::new()),
                pool: None,
                db_path: None,
                messages,
                closed: AtomicBool::new(false),
            });
        };

        let db_path = data_dir.join(CACHE_DB_FILE);
        let pool = open_pool(&db_path).await?;
        let rows = sqlx::query_as::<_, (String, String)>("SELECT key, value FROM cache_entries")
            .fetch_all(&pool)
            .await?;
        let loaded = rows.len();
        info!(path = %db_path.display(), entries = loaded, "Embedded cache started with persistence");

        Ok(Self {
            entries: RwLock::new(rows.into_iter().collect()),
            pool: Some(pool),
            db_path: Some(db_path),
            messages,
            closed: AtomicBool::new(false),
        })
    }

    /// Start a memory-only cache.
    pub async fn in_memory() -> Result<Self, CacheError> {
        Self::start(EmbeddedCacheOptions::default()).await
    }

    /// Whether writes are persisted to disk.
    pub fn is_persistent(&self) -> bool {
        self.pool.is_some()
    }

    /// Subscribe to messages published on any channel.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheMessage> {
        self.messages.subscribe()
    }

    fn ensure_open(&self) -> Result<(), CacheError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }
        Ok(())
    }
}

async fn open_pool(path: &Path) -> Result<SqlitePool, CacheError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| CacheError::Persistence {
            operation: "create_dir",
            details: format!("Failed to create directory {:?}: {}", parent, e),
        })?;
    }

    let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await
        .map_err(|e| CacheError::Persistence {
            operation: "connect",
            details: format!("Failed to open cache database at {:?}: {}", path, e),
        })?;

    MIGRATOR
        .run(&pool)
        .await
        .map_err(|e| CacheError::Persistence {
            operation: "migrate",
            details: e.to_string(),
        })?;

    Ok(pool)
}

#[async_trait]
impl CacheClient for EmbeddedCache {
    fn address(&self) -> String {
        match &self.db_path {
            Some(path) => format!("embedded://{}", path.display()),
            None => "embedded://memory".to_string(),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.ensure_open()?;
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.ensure_open()?;
        if let Some(pool) = &self.pool {
            sqlx::query(
                r#"
                INSERT INTO cache_entries (key, value, updated_at)
                VALUES (?, ?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
                "#,
            )
            .bind(key)
            .bind(value)
            .execute(pool)
            .await?;
        }
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.ensure_open()?;
        if let Some(pool) = &self.pool {
            sqlx::query("DELETE FROM cache_entries WHERE key = ?")
                .bind(key)
                .execute(pool)
                .await?;
        }
        Ok(self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        self.ensure_open()?;
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<(), CacheError> {
        self.ensure_open()?;
        let _ = self.messages.send(CacheMessage {
            channel: channel.to_string(),
            payload: message.to_string(),
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), CacheError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
        debug!(address = %self.address(), "Embedded cache closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
