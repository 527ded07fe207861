// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Engine construction and state.
//!
//! An [`Engine`] is assembled with [`EngineBuilder`] from a project and typed
//! resource collections. The collections are owned by the engine and never
//! change after [`EngineBuilder::build`]; only the runtime state published by
//! [`Engine::start`] and cleared by [`Engine::stop`] does.

use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use axum::Router;
use tokio::task::JoinHandle;
use weft_dsl::{
    Agent, KnowledgeBase, McpServer, Memory, ModelProvider, Project, Schedule, Schema, Tool,
    Webhook, Workflow,
};
use weft_store::ResourceStore;

use crate::client::ApiClient;
use crate::config::{Config, Mode, StandaloneCacheOverride, StandaloneWorkflowOverride};
use crate::error::{EngineError, Result};
use crate::infra::{DefaultInfrastructure, Infrastructure};
use crate::lifecycle::ServeTracker;
use crate::mode::{ModeOverrides, RollbackStack};
use crate::server::{EmbeddedServer, ListenerHandle};

const DEFAULT_HOST: &str = "127.0.0.1";

// ============================================================================
// Resources
// ============================================================================

/// Everything registered with an engine.
#[derive(Debug, Clone, Default)]
pub struct Resources {
    pub project: Option<Project>,
    pub workflows: Vec<Workflow>,
    pub agents: Vec<Agent>,
    pub tools: Vec<Tool>,
    pub knowledge_bases: Vec<KnowledgeBase>,
    pub memories: Vec<Memory>,
    pub mcp_servers: Vec<McpServer>,
    pub schemas: Vec<Schema>,
    pub models: Vec<ModelProvider>,
    pub schedules: Vec<Schedule>,
    pub webhooks: Vec<Webhook>,
}

impl Resources {
    /// Project plus the length of every collection.
    pub fn total(&self) -> usize {
        usize::from(self.project.is_some())
            + self.workflows.len()
            + self.agents.len()
            + self.tools.len()
            + self.knowledge_bases.len()
            + self.memories.len()
            + self.mcp_servers.len()
            + self.schemas.len()
            + self.models.len()
            + self.schedules.len()
            + self.webhooks.len()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for an [`Engine`].
///
/// Collection setters take any `IntoIterator`, so `None` registers nothing
/// and `Some(x)`, arrays and vectors all work. Repeated calls append.
pub struct EngineBuilder {
    mode: Option<Mode>,
    host: Option<String>,
    port: u16,
    resources: Resources,
    config: Option<Config>,
    overrides: ModeOverrides,
    infrastructure: Option<Arc<dyn Infrastructure>>,
    router: Option<Router>,
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("mode", &self.mode)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("resources", &self.resources.total())
            .field("config", &self.config.is_some())
            .field("infrastructure", &self.infrastructure.as_ref().map(|_| "..."))
            .finish()
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            mode: None,
            host: None,
            port: 0,
            resources: Resources::default(),
            config: None,
            overrides: ModeOverrides::default(),
            infrastructure: None,
            router: None,
        }
    }
}

macro_rules! collection_setter {
    ($(#[$doc:meta])* $name:ident, $field:ident, $ty:ty) => {
        $(#[$doc])*
        pub fn $name(mut self, items: impl IntoIterator<Item = $ty>) -> Self {
            self.resources.$field.extend(items);
            self
        }
    };
}

impl EngineBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deployment mode. Default: the configuration's mode, which defaults to
    /// [`Mode::Standalone`].
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Bind host. A blank host becomes `127.0.0.1`; an unset host falls back
    /// to `server.host` from the configuration.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Bind port. `0` uses `server.port` from the configuration, and an
    /// OS-assigned port if that is `0` too.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// The project. `None` is ignored.
    pub fn with_project(mut self, project: impl Into<Option<Project>>) -> Self {
        if let Some(project) = project.into() {
            self.resources.project = Some(project);
        }
        self
    }

    collection_setter!(
        /// Add workflows.
        with_workflows, workflows, Workflow
    );
    collection_setter!(
        /// Add top-level agents.
        with_agents, agents, Agent
    );
    collection_setter!(
        /// Add top-level tools.
        with_tools, tools, Tool
    );
    collection_setter!(
        /// Add top-level knowledge bases.
        with_knowledge_bases, knowledge_bases, KnowledgeBase
    );
    collection_setter!(with_memories, memories, Memory);
    collection_setter!(with_mcp_servers, mcp_servers, McpServer);
    collection_setter!(with_schemas, schemas, Schema);
    collection_setter!(
        /// Add model providers, identified as `provider:model`.
        with_models, models, ModelProvider
    );
    collection_setter!(with_schedules, schedules, Schedule);
    collection_setter!(
        /// Add webhooks, identified by slug.
        with_webhooks, webhooks, Webhook
    );

    /// Configuration used at start. Without one, [`Engine::start`] fails
    /// with [`EngineError::ConfigUnavailable`].
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Overlay for the embedded workflow server settings.
    pub fn with_standalone_workflow_override(mut self, overlay: StandaloneWorkflowOverride) -> Self {
        self.overrides.workflow = Some(overlay);
        self
    }

    /// Overlay for the embedded cache settings.
    pub fn with_standalone_cache_override(mut self, overlay: StandaloneCacheOverride) -> Self {
        self.overrides.cache = Some(overlay);
        self
    }

    /// Replace the infrastructure factory. Default: [`DefaultInfrastructure`].
    pub fn with_infrastructure(mut self, infrastructure: Arc<dyn Infrastructure>) -> Self {
        self.infrastructure = Some(infrastructure);
        self
    }

    /// Routes to serve. Default: an empty router.
    pub fn with_router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    fn normalize(&mut self) {
        if let Some(host) = &mut self.host {
            let trimmed = host.trim();
            *host = if trimmed.is_empty() {
                DEFAULT_HOST.to_string()
            } else {
                trimmed.to_string()
            };
        }
    }

    fn validate(&self) -> Result<()> {
        if self.resources.total() == 0 {
            return Err(EngineError::NoResources);
        }
        Ok(())
    }

    /// Build the engine.
    ///
    /// Fails with [`EngineError::NoResources`] when nothing was registered.
    pub fn build(mut self) -> Result<Engine> {
        self.normalize();
        self.validate()?;

        let mode = self
            .mode
            .or_else(|| self.config.as_ref().map(|c| c.mode))
            .unwrap_or_default();

        Ok(Engine {
            mode,
            host: self.host,
            port: self.port,
            resources: self.resources,
            config: self.config,
            overrides: self.overrides,
            infrastructure: self
                .infrastructure
                .unwrap_or_else(|| Arc::new(DefaultInfrastructure)),
            base_router: self.router.unwrap_or_default(),
            start_guard: tokio::sync::Mutex::new(()),
            stop_guard: tokio::sync::Mutex::new(()),
            state: RwLock::new(RuntimeState::default()),
            errors: Arc::new(Mutex::new(ErrorSlots::default())),
            serve_tracker: ServeTracker::new(),
        })
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Live handles, published together by `start` and cleared together by `stop`.
#[derive(Default)]
pub(crate) struct RuntimeState {
    pub(crate) started: bool,
    pub(crate) resource_store: Option<Arc<dyn ResourceStore>>,
    pub(crate) router: Option<Router>,
    pub(crate) server: Option<Arc<EmbeddedServer>>,
    pub(crate) listener: Option<Arc<ListenerHandle>>,
    pub(crate) client: Option<ApiClient>,
    pub(crate) base_url: Option<String>,
    pub(crate) port: Option<u16>,
    pub(crate) config: Option<Arc<Config>>,
    pub(crate) teardown: Option<RollbackStack>,
    pub(crate) serve_task: Option<JoinHandle<()>>,
}

#[derive(Debug, Default)]
pub(crate) struct ErrorSlots {
    pub(crate) start: Option<EngineError>,
    pub(crate) server: Option<EngineError>,
    pub(crate) stop: Option<EngineError>,
}

/// Embeddable runtime: registered resources plus the lifecycle that serves them.
///
/// ```rust,ignore
/// let engine = Engine::builder()
///     .with_project(Project::new("shop"))
///     .with_workflows([Workflow::new("checkout").with_task(Task::new("charge"))])
///     .with_config(Config::from_env()?)
///     .build()?;
///
/// engine.start().await?;
/// let report = engine.validate_references();
/// engine.stop().await?;
/// ```
pub struct Engine {
    pub(crate) mode: Mode,
    pub(crate) host: Option<String>,
    pub(crate) port: u16,
    pub(crate) resources: Resources,
    pub(crate) config: Option<Config>,
    pub(crate) overrides: ModeOverrides,
    pub(crate) infrastructure: Arc<dyn Infrastructure>,
    pub(crate) base_router: Router,
    pub(crate) start_guard: tokio::sync::Mutex<()>,
    pub(crate) stop_guard: tokio::sync::Mutex<()>,
    pub(crate) state: RwLock<RuntimeState>,
    pub(crate) errors: Arc<Mutex<ErrorSlots>>,
    pub(crate) serve_tracker: ServeTracker,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("mode", &self.mode)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("resources", &self.resources.total())
            .field("started", &self.is_started())
            .finish()
    }
}

impl Engine {
    /// Create a new builder.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Deployment mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Registered resources.
    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    /// Whether the engine is serving.
    pub fn is_started(&self) -> bool {
        self.read_state().started
    }

    /// Resource store, while started.
    pub fn resource_store(&self) -> Option<Arc<dyn ResourceStore>> {
        self.read_state().resource_store.clone()
    }

    /// Router being served, while started.
    pub fn router(&self) -> Option<Router> {
        self.read_state().router.clone()
    }

    /// HTTP server, while started.
    pub fn server(&self) -> Option<Arc<EmbeddedServer>> {
        self.read_state().server.clone()
    }

    /// Client for the engine's own API, while started.
    pub fn client(&self) -> Option<ApiClient> {
        self.read_state().client.clone()
    }

    /// Base URL of the engine's own API, while started.
    pub fn base_url(&self) -> Option<String> {
        self.read_state().base_url.clone()
    }

    /// Bound port, while started.
    pub fn port(&self) -> Option<u16> {
        self.read_state().port
    }

    /// Resolved configuration of the current run, while started.
    pub fn config(&self) -> Option<Arc<Config>> {
        self.read_state().config.clone()
    }

    /// Error of the last failed `start`, cleared by a successful one.
    pub fn last_start_error(&self) -> Option<EngineError> {
        self.error_slots().start.clone()
    }

    pub(crate) fn read_state(&self) -> RwLockReadGuard<'_, RuntimeState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write_state(&self) -> RwLockWriteGuard<'_, RuntimeState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn error_slots(&self) -> MutexGuard<'_, ErrorSlots> {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
