// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for weft-runtime integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing_subscriber::EnvFilter;
use weft_runtime::config::{StandaloneCacheConfig, StandaloneWorkflowConfig};
use weft_runtime::weft_dsl::{Agent, Project, Task, Tool, Workflow};
use weft_runtime::weft_store::cache::{CacheClient, EmbeddedCache, EmbeddedCacheOptions};
use weft_runtime::{Config, EngineBuilder, Infrastructure, ModeError, WorkflowServer};

/// Install a test subscriber once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Configuration that binds everything to ephemeral loopback ports.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.timeouts.server_shutdown = Some(Duration::from_secs(5));
    config.workflow_engine.standalone.frontend_port = 0;
    config.workflow_engine.standalone.start_timeout = Duration::from_secs(10);
    config.workflow_engine.reachability_timeout = Duration::from_secs(2);
    config
}

pub fn sample_workflow() -> Workflow {
    Workflow::new("checkout")
        .with_agent(Agent::new("clerk"))
        .with_task(
            Task::new("charge")
                .with_tool(Tool::new("payments"))
                .on_success("receipt")
                .on_error("refund"),
        )
        .with_task(Task::new("receipt").with_agent(Agent::new("clerk")))
        .with_task(Task::new("refund"))
}

/// Builder with a project, one workflow and the test configuration.
pub fn sample_builder() -> EngineBuilder {
    EngineBuilder::new()
        .with_project(Project::new("shop"))
        .with_workflows([sample_workflow()])
        .with_config(test_config())
}

/// Poll `events` until `event` shows up.
pub async fn wait_for_event(infra: &RecordingInfrastructure, event: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !infra.events().iter().any(|e| e == event) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{event:?} never recorded: {:?}", infra.events()));
}

/// Address nothing listens on.
pub async fn closed_address() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind probe listener");
    let address = listener.local_addr().expect("No local address").to_string();
    drop(listener);
    address
}

// ============================================================================
// Recording infrastructure
// ============================================================================

pub type Events = Arc<Mutex<Vec<String>>>;

fn record(events: &Events, event: impl Into<String>) {
    events.lock().unwrap().push(event.into());
}

/// Workflow server that only records calls.
pub struct RecordingWorkflowServer {
    events: Events,
    fail_start: bool,
    fail_stop: Arc<AtomicBool>,
}

#[async_trait]
impl WorkflowServer for RecordingWorkflowServer {
    async fn start(&self) -> Result<(), ModeError> {
        record(&self.events, "workflow start");
        if self.fail_start {
            return Err(ModeError::WorkflowServerStart("injected failure".into()));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), ModeError> {
        record(&self.events, "workflow stop");
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(ModeError::WorkflowServerStop("injected failure".into()));
        }
        Ok(())
    }

    fn frontend_address(&self) -> String {
        "127.0.0.1:7233".to_string()
    }
}

/// Infrastructure handing out in-process caches and a recording workflow
/// server, keeping every cache so tests can check it was closed.
#[derive(Default)]
pub struct RecordingInfrastructure {
    pub events: Events,
    pub fail_workflow_start: bool,
    /// Checked on every stop, so tests can heal the server between runs.
    pub fail_workflow_stop: Arc<AtomicBool>,
    /// Embedded cache start never completes.
    pub hang_cache_start: bool,
    caches: Mutex<Vec<Arc<EmbeddedCache>>>,
}

impl RecordingInfrastructure {
    pub fn failing_workflow_start() -> Self {
        Self {
            fail_workflow_start: true,
            ..Default::default()
        }
    }

    pub fn failing_workflow_stop() -> Self {
        Self {
            fail_workflow_stop: Arc::new(AtomicBool::new(true)),
            ..Default::default()
        }
    }

    pub fn hanging_cache_start() -> Self {
        Self {
            hang_cache_start: true,
            ..Default::default()
        }
    }

    pub fn set_fail_workflow_stop(&self, fail: bool) {
        self.fail_workflow_stop.store(fail, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn caches(&self) -> Vec<Arc<EmbeddedCache>> {
        self.caches.lock().unwrap().clone()
    }

    async fn new_cache(&self, options: EmbeddedCacheOptions) -> Arc<dyn CacheClient> {
        let cache = Arc::new(
            EmbeddedCache::start(options)
                .await
                .expect("Failed to start embedded cache"),
        );
        self.caches.lock().unwrap().push(cache.clone());
        cache
    }
}

#[async_trait]
impl Infrastructure for RecordingInfrastructure {
    async fn workflow_server(
        &self,
        _config: &StandaloneWorkflowConfig,
    ) -> Result<Arc<dyn WorkflowServer>, ModeError> {
        Ok(Arc::new(RecordingWorkflowServer {
            events: self.events.clone(),
            fail_start: self.fail_workflow_start,
            fail_stop: self.fail_workflow_stop.clone(),
        }))
    }

    async fn start_embedded_cache(
        &self,
        config: &StandaloneCacheConfig,
    ) -> Result<Arc<dyn CacheClient>, ModeError> {
        record(&self.events, "cache start");
        if self.hang_cache_start {
            std::future::pending::<()>().await;
        }
        let options = if config.persistence {
            EmbeddedCacheOptions::persistent(&config.data_dir)
        } else {
            EmbeddedCacheOptions::default()
        };
        Ok(self.new_cache(options).await)
    }

    async fn connect_cache(&self, url: &str) -> Result<Arc<dyn CacheClient>, ModeError> {
        record(&self.events, format!("cache connect {url}"));
        Ok(self.new_cache(EmbeddedCacheOptions::default()).await)
    }
}
