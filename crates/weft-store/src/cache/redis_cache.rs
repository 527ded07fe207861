// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Redis-backed cache client used in distributed mode.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use super::CacheClient;
use crate::CacheError;

const SCAN_BATCH: usize = 200;

/// Cache client over a Redis connection manager.
pub struct RedisCache {
    address: String,
    conn: RwLock<Option<ConnectionManager>>,
    closed: AtomicBool,
}

impl RedisCache {
    /// Connect to `url` (`redis://[:password@]host:port[/db]`) and verify with PING.
    #[instrument(skip(url))]
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(|e| CacheError::Connect {
            address: redact(url),
            details: e.to_string(),
        })?;
        let address = client.get_connection_info().addr.to_string();

        let mut conn = client
            .get_connection_manager()
            .await
            .map_err(|e| CacheError::Connect {
                address: address.clone(),
                details: e.to_string(),
            })?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Connect {
                address: address.clone(),
                details: e.to_string(),
            })?;

        info!(address = %address, "Connected to Redis");

        Ok(Self {
            address,
            conn: RwLock::new(Some(conn)),
            closed: AtomicBool::new(false),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        self.conn.read().await.clone().ok_or(CacheError::Closed)
    }
}

fn command_error(operation: &'static str) -> impl FnOnce(redis::RedisError) -> CacheError {
    move |e| CacheError::Command {
        operation,
        details: e.to_string(),
    }
}

/// Strip credentials from a connection URL before it lands in an error.
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***@{}", &url[..scheme_end], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}

/// Escape glob metacharacters so the prefix matches literally.
fn glob_escape(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[async_trait]
impl CacheClient for RedisCache {
    fn address(&self) -> String {
        self.address.clone()
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        conn.get(key).await.map_err(command_error("GET"))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(key, value)
            .await
            .map_err(command_error("SET"))
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        let removed: i64 = conn.del(key).await.map_err(command_error("DEL"))?;
        Ok(removed > 0)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}*", glob_escape(prefix));
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(command_error("SCAN"))?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _receivers: i64 = conn
            .publish(channel, message)
            .await
            .map_err(command_error("PUBLISH"))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), CacheError> {
        self.closed.store(true, Ordering::Release);
        if self.conn.write().await.take().is_some() {
            debug!(address = %self.address, "Redis connection closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
