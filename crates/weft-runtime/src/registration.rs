// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Writing registered resources into the resource store.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};
use weft_dsl::{Resource, ResourceKind};
use weft_store::{ResourceKey, ResourceStore};

use crate::engine::Engine;
use crate::error::{EngineError, Result};

/// What [`Engine::register_resources`] wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistrationSummary {
    /// Project the resources were written under.
    pub project: String,
    /// Number of resources written per kind.
    pub counts: BTreeMap<ResourceKind, usize>,
}

impl RegistrationSummary {
    pub fn count(&self, kind: ResourceKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

impl Engine {
    /// Write every registered resource into the running engine's store.
    ///
    /// Workflow-scoped agents, tools, knowledge bases and schemas are stored
    /// alongside the top-level ones. Fails on the first key that already
    /// exists; resources written before it stay written.
    pub async fn register_resources(&self) -> Result<RegistrationSummary> {
        let project = self
            .resources
            .project
            .as_ref()
            .map(|project| project.resource_id())
            .filter(|name| !name.is_empty())
            .ok_or(EngineError::ProjectRequired)?;
        let store = self.resource_store().ok_or(EngineError::StoreUnavailable)?;

        let mut writer = Writer {
            store: store.as_ref(),
            summary: RegistrationSummary {
                project: project.clone(),
                counts: BTreeMap::new(),
            },
        };
        let resources = &self.resources;
        let workflows = &resources.workflows;

        if let Some(project) = &resources.project {
            writer.put(project).await?;
        }
        writer.put_all(workflows).await?;

        for workflow in workflows {
            writer.put_all(&workflow.agents).await?;
        }
        writer.put_all(&resources.agents).await?;

        writer.put_all(&resources.tools).await?;
        for workflow in workflows {
            writer.put_all(&workflow.tools).await?;
        }

        writer.put_all(&resources.knowledge_bases).await?;
        for workflow in workflows {
            writer.put_all(&workflow.knowledge_bases).await?;
        }

        writer.put_all(&resources.memories).await?;
        writer.put_all(&resources.mcp_servers).await?;

        writer.put_all(&resources.schemas).await?;
        for workflow in workflows {
            writer.put_all(&workflow.schemas).await?;
        }

        writer.put_all(&resources.models).await?;
        writer.put_all(&resources.schedules).await?;
        writer.put_all(&resources.webhooks).await?;

        let summary = writer.summary;
        info!(
            project = %summary.project,
            store = %store.kind(),
            workflows = summary.count(ResourceKind::Workflow),
            agents = summary.count(ResourceKind::Agent),
            tools = summary.count(ResourceKind::Tool),
            knowledge_bases = summary.count(ResourceKind::Knowledge),
            memories = summary.count(ResourceKind::Memory),
            mcps = summary.count(ResourceKind::Mcp),
            schemas = summary.count(ResourceKind::Schema),
            total = summary.total(),
            "Project registered in resource store"
        );
        Ok(summary)
    }
}

struct Writer<'a> {
    store: &'a dyn ResourceStore,
    summary: RegistrationSummary,
}

impl Writer<'_> {
    async fn put_all<T: Resource>(&mut self, items: &[T]) -> Result<()> {
        for item in items {
            self.put(item).await?;
        }
        Ok(())
    }

    async fn put<T: Resource>(&mut self, item: &T) -> Result<()> {
        let id = item.resource_id();
        let key = ResourceKey::new(self.summary.project.clone(), T::KIND, id.clone());
        key.validate()?;

        if self.store.get(&key).await?.is_some() {
            return Err(EngineError::AlreadyRegistered { kind: T::KIND, id });
        }

        let value = serde_json::to_value(item).map_err(|e| EngineError::Serialization {
            kind: T::KIND,
            id: id.clone(),
            details: e.to_string(),
        })?;
        let etag = self.store.put(&key, value).await?;
        debug!(key = %key, etag = %etag.as_str(), "Resource registered");

        *self.summary.counts.entry(T::KIND).or_default() += 1;
        Ok(())
    }
}
