// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Infrastructure factories used by mode bootstrap.
//!
//! [`Infrastructure`] is the seam between the engine and the processes it
//! embeds or connects to. [`DefaultInfrastructure`] wires the real
//! implementations; hosts and tests can supply their own.

use std::sync::Arc;

use async_trait::async_trait;
use weft_store::cache::{CacheClient, EmbeddedCache, EmbeddedCacheOptions, RedisCache};

use crate::config::{StandaloneCacheConfig, StandaloneWorkflowConfig};
use crate::error::ModeError;
use crate::workflow_server::EmbeddedWorkflowServer;

/// A durable-workflow server the engine can embed.
#[async_trait]
pub trait WorkflowServer: Send + Sync {
    /// Start serving. Must be bounded by the server's own start timeout.
    async fn start(&self) -> Result<(), ModeError>;

    /// Stop serving. Safe on a server that never started or failed mid-start.
    async fn stop(&self) -> Result<(), ModeError>;

    /// `host:port` clients should use to reach the frontend.
    fn frontend_address(&self) -> String;
}

/// Factory for mode infrastructure.
#[async_trait]
pub trait Infrastructure: Send + Sync {
    /// Prepare (but do not start) an embedded workflow server.
    async fn workflow_server(
        &self,
        config: &StandaloneWorkflowConfig,
    ) -> Result<Arc<dyn WorkflowServer>, ModeError>;

    /// Start the embedded cache.
    async fn start_embedded_cache(
        &self,
        config: &StandaloneCacheConfig,
    ) -> Result<Arc<dyn CacheClient>, ModeError>;

    /// Connect to an external cache at `url`.
    async fn connect_cache(&self, url: &str) -> Result<Arc<dyn CacheClient>, ModeError>;
}

/// Embedded SQLite-backed workflow server, embedded cache and Redis.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultInfrastructure;

#[async_trait]
impl Infrastructure for DefaultInfrastructure {
    async fn workflow_server(
        &self,
        config: &StandaloneWorkflowConfig,
    ) -> Result<Arc<dyn WorkflowServer>, ModeError> {
        let server = EmbeddedWorkflowServer::prepare(config.clone()).await?;
        Ok(Arc::new(server))
    }

    async fn start_embedded_cache(
        &self,
        config: &StandaloneCacheConfig,
    ) -> Result<Arc<dyn CacheClient>, ModeError> {
        let options = if config.persistence {
            EmbeddedCacheOptions::persistent(&config.data_dir)
        } else {
            EmbeddedCacheOptions::default()
        };
        let cache = EmbeddedCache::start(options)
            .await
            .map_err(ModeError::EmbeddedCache)?;
        Ok(Arc::new(cache))
    }

    async fn connect_cache(&self, url: &str) -> Result<Arc<dyn CacheClient>, ModeError> {
        let cache = RedisCache::connect(url)
            .await
            .map_err(ModeError::CacheConnect)?;
        Ok(Arc::new(cache))
    }
}
