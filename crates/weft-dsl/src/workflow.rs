// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow and task definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{Agent, KnowledgeBase, Resource, ResourceKind, Schema, Tool};

/// A workflow: an ordered list of tasks plus workflow-scoped resources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Workflow {
    /// Unique workflow identifier
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Tasks in declaration order. Ids are unique within one workflow.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<Task>,

    /// Agents declared inside the workflow
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agents: Vec<Agent>,

    /// Tools declared inside the workflow
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,

    /// Knowledge bases declared inside the workflow
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub knowledge_bases: Vec<KnowledgeBase>,

    /// Schemas declared inside the workflow
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schemas: Vec<Schema>,
}

impl Workflow {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn with_agent(mut self, agent: Agent) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_knowledge_base(mut self, knowledge_base: KnowledgeBase) -> Self {
        self.knowledge_bases.push(knowledge_base);
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schemas.push(schema);
        self
    }
}

impl Resource for Workflow {
    const KIND: ResourceKind = ResourceKind::Workflow;

    fn resource_id(&self) -> String {
        self.id.trim().to_string()
    }
}

/// A single task within a workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Task {
    /// Task identifier, unique within its workflow
    pub id: String,

    /// Agent the task runs, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<Agent>,

    /// Tool the task calls, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<Tool>,

    /// Transition taken when the task succeeds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<Transition>,

    /// Transition taken when the task fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<Transition>,
}

impl Task {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_agent(mut self, agent: Agent) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tool = Some(tool);
        self
    }

    /// Route to `next` (a task id in the same workflow) on success.
    pub fn on_success(mut self, next: impl Into<String>) -> Self {
        self.on_success = Some(Transition::to(next));
        self
    }

    /// Route to `next` (a task id in the same workflow) on error.
    pub fn on_error(mut self, next: impl Into<String>) -> Self {
        self.on_error = Some(Transition::to(next));
        self
    }

    /// Trimmed, non-empty success target.
    pub fn success_next(&self) -> Option<&str> {
        self.on_success.as_ref().and_then(Transition::target)
    }

    /// Trimmed, non-empty error target.
    pub fn error_next(&self) -> Option<&str> {
        self.on_error.as_ref().and_then(Transition::target)
    }
}

/// Outcome routing for a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Transition {
    /// Id of the next task in the same workflow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

impl Transition {
    pub fn to(next: impl Into<String>) -> Self {
        Self {
            next: Some(next.into()),
        }
    }

    fn target(&self) -> Option<&str> {
        self.next
            .as_deref()
            .map(str::trim)
            .filter(|next| !next.is_empty())
    }
}
