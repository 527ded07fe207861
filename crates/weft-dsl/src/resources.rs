// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Standalone resource definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{Resource, ResourceKind};

/// Implements [`Resource`] for a type identified by a plain string field.
macro_rules! id_resource {
    ($ty:ty, $kind:expr, $field:ident) => {
        impl Resource for $ty {
            const KIND: ResourceKind = $kind;

            fn resource_id(&self) -> String {
                self.$field.trim().to_string()
            }
        }
    };
}

// ============================================================================
// Project
// ============================================================================

/// Project descriptor. An engine serves at most one project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Project {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

id_resource!(Project, ResourceKind::Project, name);

// ============================================================================
// Agents, tools and knowledge
// ============================================================================

/// An LLM-backed agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Agent {
    pub id: String,

    /// Instructions given to the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Model reference in `provider:model` form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Ids of tools the agent may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
}

impl Agent {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

id_resource!(Agent, ResourceKind::Agent, id);

/// A callable tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Tool {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON schema of the tool input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
}

impl Tool {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

id_resource!(Tool, ResourceKind::Tool, id);

/// A knowledge base used for retrieval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KnowledgeBase {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedder: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_db: Option<String>,

    /// Source locations ingested into the knowledge base
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

impl KnowledgeBase {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

id_resource!(KnowledgeBase, ResourceKind::Knowledge, id);

/// A conversation memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Memory {
    pub id: String,

    /// Maximum number of messages retained
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_messages: Option<u32>,

    /// Time-to-live in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
}

impl Memory {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

id_resource!(Memory, ResourceKind::Memory, id);

// ============================================================================
// Integrations
// ============================================================================

/// An MCP (Model Context Protocol) server endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct McpServer {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Command to spawn for stdio transports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl McpServer {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

id_resource!(McpServer, ResourceKind::Mcp, id);

/// A named JSON schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Schema {
    pub id: String,

    #[serde(default)]
    pub definition: serde_json::Value,
}

impl Schema {
    pub fn new(id: impl Into<String>, definition: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            definition,
        }
    }
}

id_resource!(Schema, ResourceKind::Schema, id);

/// An LLM provider/model pair. Identified as `provider:model`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModelProvider {
    pub provider: String,

    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl ModelProvider {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            api_url: None,
        }
    }
}

impl Resource for ModelProvider {
    const KIND: ResourceKind = ResourceKind::Model;

    fn resource_id(&self) -> String {
        let provider = self.provider.trim();
        let model = self.model.trim();
        if provider.is_empty() && model.is_empty() {
            return String::new();
        }
        format!("{provider}:{model}")
    }
}

/// A cron schedule that triggers a workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Schedule {
    pub id: String,

    pub workflow_id: String,

    pub cron: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl Schedule {
    pub fn new(
        id: impl Into<String>,
        workflow_id: impl Into<String>,
        cron: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            workflow_id: workflow_id.into(),
            cron: cron.into(),
            timezone: None,
        }
    }
}

id_resource!(Schedule, ResourceKind::Schedule, id);

/// An inbound webhook. Identified by its slug.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Webhook {
    pub slug: String,

    /// Event names accepted by the webhook
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<String>,
}

impl Webhook {
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            events: Vec::new(),
        }
    }
}

id_resource!(Webhook, ResourceKind::Webhook, slug);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_provider_id() {
        assert_eq!(
            ModelProvider::new("openai", "gpt-4o").resource_id(),
            "openai:gpt-4o"
        );
        assert_eq!(ModelProvider::new(" ", "").resource_id(), "");
        assert_eq!(ModelProvider::new("ollama", "").resource_id(), "ollama:");
    }

    #[test]
    fn test_webhook_identified_by_slug() {
        assert_eq!(Webhook::new(" orders ").resource_id(), "orders");
        assert_eq!(<Webhook as Resource>::KIND, ResourceKind::Webhook);
    }
}
