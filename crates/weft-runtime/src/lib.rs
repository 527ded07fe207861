// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Weft Runtime - embeddable core of the weft workflow orchestration engine
//!
//! A host process registers a project and its resources (workflows, agents,
//! tools, knowledge bases, memories, MCP servers, schemas, models, schedules,
//! webhooks) with an [`Engine`], then drives its lifecycle:
//!
//! ```text
//!               start()                     stop()
//!  ┌────────────┐ ───────────────► ┌─────────┐ ──────────────► ┌────────────┐
//!  │ NotStarted │                  │ Started │                 │ NotStarted │
//!  └────────────┘ ◄─────────────── └─────────┘                 └────────────┘
//!                  failure: rolled             wait() resolves
//!                  back, recorded              when serving ends
//! ```
//!
//! # Modes
//!
//! | Mode | Workflow engine | Cache | Resource store |
//! |------|-----------------|-------|----------------|
//! | `standalone` (default) | embedded, SQLite-backed | embedded | memory, or cache-backed with persistence |
//! | `distributed` | external, probed at start | Redis | cache-backed |
//!
//! Provisioning is transactional: every step registers its teardown before
//! the next one runs, and a failure unwinds everything in reverse order.
//!
//! # Reference validation
//!
//! [`Engine::validate_references`] builds a dependency graph over the
//! registered resources and reports missing references and cycles. It never
//! touches the running state.
//!
//! # Configuration
//!
//! [`Config::from_env`] reads `WEFT_*` environment variables:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `WEFT_MODE` | `standalone` | `standalone` or `distributed` |
//! | `WEFT_SERVER_HOST` | `127.0.0.1` | HTTP bind host |
//! | `WEFT_SERVER_PORT` | `5001` | HTTP bind port, `0` for any |
//! | `WEFT_SHUTDOWN_TIMEOUT_MS` | `10000` | Graceful shutdown bound |
//! | `WEFT_WORKFLOW_HOST_PORT` | - | External workflow engine (distributed) |
//! | `WEFT_CACHE_URL` | - | External cache (distributed) |
//! | `WEFT_CACHE_PERSISTENCE` | `false` | Persist the embedded cache |
//!
//! # Modules
//!
//! - [`config`]: Configuration and standalone overrides
//! - [`engine`]: Builder, resource registry and accessors
//! - [`lifecycle`]: Start, stop and wait
//! - [`mode`]: Mode bootstrap and rollback
//! - [`validation`]: Reference validation
//! - [`registration`]: Writing resources into the store

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod infra;
pub mod lifecycle;
pub mod mode;
pub mod registration;
pub mod server;
pub mod validation;
pub mod workflow_server;

pub use client::ApiClient;
pub use config::{
    Config, ConfigError, Mode, StandaloneCacheOverride, StandaloneWorkflowOverride,
};
pub use engine::{Engine, EngineBuilder, Resources};
pub use error::{EngineError, ModeError, Result};
pub use infra::{DefaultInfrastructure, Infrastructure, WorkflowServer};
pub use registration::RegistrationSummary;
pub use server::EmbeddedServer;
pub use validation::{
    CircularDependency, MissingReference, ValidationFinding, ValidationReport,
};

pub use weft_dsl;
pub use weft_store;
