// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource Definitions
//!
//! This crate defines the resource types an engine is assembled from:
//! - Project descriptor and workflows (with their tasks and transitions)
//! - Agents, tools, knowledge bases and memories
//! - MCP servers, schemas, model providers, schedules and webhooks
//!
//! Every type is plain data (serde + JSON Schema). The [`Resource`] trait ties
//! each type to its [`ResourceKind`] and the identifier it is registered under.

use serde::Serialize;
use serde::de::DeserializeOwned;

mod kind;
mod resources;
mod workflow;

pub use kind::ResourceKind;
pub use resources::{
    Agent, KnowledgeBase, McpServer, Memory, ModelProvider, Project, Schedule, Schema, Tool,
    Webhook,
};
pub use workflow::{Task, Transition, Workflow};

// ============================================================================
// Resource Trait
// ============================================================================

/// A registrable resource with a kind and an identifier.
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Kind this resource is registered as.
    const KIND: ResourceKind;

    /// Identifier the resource is registered under, trimmed.
    ///
    /// An empty string means the resource has no usable identifier.
    fn resource_id(&self) -> String;
}

/// Parse a resource from a JSON value
pub fn parse_resource<T: Resource>(json: &serde_json::Value) -> Result<T, String> {
    serde_json::from_value(json.clone())
        .map_err(|e| format!("Failed to parse {}: {}", T::KIND, e))
}
