// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mode bootstrap.
//!
//! Provisions the resource store and any infrastructure a [`Mode`] needs:
//!
//! - **Standalone**: embedded workflow server, embedded cache, and a memory
//!   or cache-backed resource store depending on cache persistence.
//! - **Distributed**: external cache connection, cache-backed store, and a
//!   reachability probe against the external workflow engine.
//!
//! Every step that allocates something pushes its undo action onto a
//! [`RollbackStack`] before the next step runs. A failing step unwinds the
//! whole stack. On success the stack becomes the mode's teardown path and is
//! run when the engine stops.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};
use weft_store::cache::CacheClient;
use weft_store::{CacheResourceStore, MemoryResourceStore, ResourceStore};

use crate::config::{
    Config, ConfigError, Mode, StandaloneCacheOverride, StandaloneWorkflowOverride,
};
use crate::error::ModeError;
use crate::infra::{Infrastructure, WorkflowServer};

// ============================================================================
// Rollback stack
// ============================================================================

type CleanupAction =
    Box<dyn FnOnce() -> BoxFuture<'static, Result<(), ModeError>> + Send + Sync>;

/// Ordered undo actions, run last-in-first-out.
pub struct RollbackStack {
    actions: Vec<(&'static str, CleanupAction)>,
    timeout: Duration,
}

impl std::fmt::Debug for RollbackStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollbackStack")
            .field(
                "actions",
                &self.actions.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
            )
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RollbackStack {
    /// Empty stack; each action is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            actions: Vec::new(),
            timeout,
        }
    }

    /// Register an undo action.
    pub fn push<F, Fut>(&mut self, name: &'static str, action: F)
    where
        F: FnOnce() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ModeError>> + Send + 'static,
    {
        self.actions
            .push((name, Box::new(move || action().boxed())));
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Names in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.actions.iter().map(|(name, _)| *name).collect()
    }

    /// Run every action, newest first, and collect their errors.
    ///
    /// Runs on a spawned task so that dropping the caller's future does not
    /// interrupt the unwind. Each action is spawned on its own so a panic
    /// is reported as an error instead of aborting the rest.
    pub async fn run(mut self) -> Vec<ModeError> {
        let actions = std::mem::take(&mut self.actions);
        if actions.is_empty() {
            return Vec::new();
        }

        tokio::spawn(unwind(actions, self.timeout))
            .await
            .unwrap_or_else(|_| vec![ModeError::CleanupPanicked("rollback")])
    }
}

/// A stack dropped before it ran (its owner's future was cancelled) unwinds
/// in the background.
impl Drop for RollbackStack {
    fn drop(&mut self) {
        if self.actions.is_empty() {
            return;
        }
        let actions = std::mem::take(&mut self.actions);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(
                    cleanups = actions.len(),
                    "Rollback stack dropped before running; unwinding in background"
                );
                handle.spawn(unwind(actions, self.timeout));
            }
            Err(_) => {
                warn!(
                    cleanups = actions.len(),
                    "Rollback stack dropped outside a runtime; cleanups skipped"
                );
            }
        }
    }
}

async fn unwind(
    actions: Vec<(&'static str, CleanupAction)>,
    timeout: Duration,
) -> Vec<ModeError> {
    let mut errors = Vec::new();
    for (name, action) in actions.into_iter().rev() {
        debug!(cleanup = name, "Running cleanup");
        let task = tokio::spawn(action());
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => {
                warn!(cleanup = name, error = %e, "Cleanup failed");
                errors.push(e);
            }
            Ok(Err(_)) => {
                warn!(cleanup = name, "Cleanup panicked");
                errors.push(ModeError::CleanupPanicked(name));
            }
            Err(_) => {
                warn!(cleanup = name, timeout = ?timeout, "Cleanup timed out");
                errors.push(ModeError::CleanupTimeout { name, timeout });
            }
        }
    }
    errors
}

/// Unwind `stack` and return `primary`, with any rollback errors attached.
pub async fn cleanup_on_error(stack: RollbackStack, primary: ModeError) -> ModeError {
    warn!(error = %primary, cleanups = stack.len(), "Mode bootstrap failed; rolling back");
    let rollback = stack.run().await;
    if rollback.is_empty() {
        primary
    } else {
        ModeError::RolledBack {
            primary: Box::new(primary),
            rollback,
        }
    }
}

// ============================================================================
// Bootstrap
// ============================================================================

/// Result of a successful bootstrap.
pub struct ModeRuntimeState {
    /// Store the engine publishes.
    pub store: Arc<dyn ResourceStore>,
    /// Teardown for everything provisioned, in registration order.
    pub cleanups: RollbackStack,
}

/// Optional overlays for standalone infrastructure.
#[derive(Debug, Clone, Default)]
pub struct ModeOverrides {
    pub workflow: Option<StandaloneWorkflowOverride>,
    pub cache: Option<StandaloneCacheOverride>,
}

/// Provision `mode`. `config` is updated with resolved values (merged
/// standalone settings, the embedded frontend address).
pub async fn bootstrap(
    mode: Mode,
    config: &mut Config,
    overrides: &ModeOverrides,
    infra: &dyn Infrastructure,
) -> Result<ModeRuntimeState, ModeError> {
    match mode {
        Mode::Standalone => bootstrap_standalone(config, overrides, infra).await,
        Mode::Distributed => bootstrap_distributed(config, infra).await,
    }
}

fn cleanup_timeout(config: &Config) -> Duration {
    config
        .server
        .timeouts
        .server_shutdown
        .unwrap_or(config.workflow_engine.standalone.start_timeout)
}

async fn bootstrap_standalone(
    config: &mut Config,
    overrides: &ModeOverrides,
    infra: &dyn Infrastructure,
) -> Result<ModeRuntimeState, ModeError> {
    if let Some(overlay) = &overrides.workflow {
        overlay.apply_to(&mut config.workflow_engine.standalone);
    }
    if let Some(overlay) = &overrides.cache {
        overlay.apply_to(&mut config.cache.standalone);
    }
    let workflow_config = config.workflow_engine.standalone.clone();
    let cache_config = config.cache.standalone.clone();

    let mut stack = RollbackStack::new(cleanup_timeout(config));

    let server = match infra.workflow_server(&workflow_config).await {
        Ok(server) => server,
        Err(e) => return Err(cleanup_on_error(stack, e).await),
    };
    // Stop must be safe on a half-started server.
    push_server_stop(&mut stack, server.clone());
    if let Err(e) = server.start().await {
        return Err(cleanup_on_error(stack, e).await);
    }
    config.workflow_engine.host_port = server.frontend_address();
    config.workflow_engine.namespace = workflow_config.namespace.clone();
    info!(
        host_port = %config.workflow_engine.host_port,
        namespace = %workflow_config.namespace,
        "Embedded workflow server ready"
    );

    let cache = match infra.start_embedded_cache(&cache_config).await {
        Ok(cache) => cache,
        Err(e) => return Err(cleanup_on_error(stack, e).await),
    };
    push_cache_close(&mut stack, "embedded cache", cache.clone());

    let store: Arc<dyn ResourceStore> = if cache_config.persistence {
        info!(cache = %cache.address(), "Using cache-backed resource store");
        Arc::new(CacheResourceStore::new(cache))
    } else {
        debug!(cache = %cache.address(), "Using in-memory resource store");
        Arc::new(MemoryResourceStore::new())
    };

    Ok(ModeRuntimeState {
        store,
        cleanups: stack,
    })
}

async fn bootstrap_distributed(
    config: &mut Config,
    infra: &dyn Infrastructure,
) -> Result<ModeRuntimeState, ModeError> {
    let host_port = config.workflow_engine.host_port.trim().to_string();
    if host_port.is_empty() {
        return Err(ConfigError::MissingDependency {
            dependency: "workflow engine host_port",
            hint: "distributed mode requires workflow_engine.host_port (WEFT_WORKFLOW_HOST_PORT)",
        }
        .into());
    }
    let cache_url = config.cache_url().ok_or(ConfigError::MissingDependency {
        dependency: "cache connection",
        hint: "distributed mode requires cache.url, cache.host/cache.port or redis.host/redis.port",
    })?;

    let mut stack = RollbackStack::new(cleanup_timeout(config));

    let cache = match infra.connect_cache(&cache_url).await {
        Ok(cache) => cache,
        Err(e) => return Err(cleanup_on_error(stack, e).await),
    };
    push_cache_close(&mut stack, "cache connection", cache.clone());
    info!(cache = %cache.address(), "Connected to external cache");

    let store: Arc<dyn ResourceStore> = Arc::new(CacheResourceStore::new(cache));

    if let Err(e) = probe(&host_port, config.workflow_engine.reachability_timeout).await {
        return Err(cleanup_on_error(stack, e).await);
    }
    info!(host_port = %host_port, "Workflow engine reachable");

    Ok(ModeRuntimeState {
        store,
        cleanups: stack,
    })
}

fn push_server_stop(stack: &mut RollbackStack, server: Arc<dyn WorkflowServer>) {
    stack.push("embedded workflow server", move || async move {
        server.stop().await
    });
}

fn push_cache_close(stack: &mut RollbackStack, name: &'static str, cache: Arc<dyn CacheClient>) {
    stack.push(name, move || async move {
        cache.close().await.map_err(ModeError::CacheClose)
    });
}

/// Connect-and-close check against `host_port`.
pub async fn probe(host_port: &str, timeout: Duration) -> Result<(), ModeError> {
    match tokio::time::timeout(timeout, TcpStream::connect(host_port)).await {
        Ok(Ok(stream)) => {
            drop(stream);
            Ok(())
        }
        Ok(Err(e)) => Err(ModeError::Unreachable {
            address: host_port.to_string(),
            details: e.to_string(),
        }),
        Err(_) => Err(ModeError::ProbeTimeout {
            address: host_port.to_string(),
            timeout,
        }),
    }
}
