// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource kinds.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Closed set of resource kinds an engine can register.
///
/// The string form is used both as the node prefix in reference validation
/// (`"workflow:checkout"`) and as the kind segment of resource store keys.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResourceKind {
    Project,
    Workflow,
    Task,
    Agent,
    Tool,
    Knowledge,
    Memory,
    Mcp,
    Schema,
    Model,
    Schedule,
    Webhook,
}

impl ResourceKind {
    /// Stable lowercase name of the kind.
    pub fn as_str(&self) -> &str {
        self.as_ref()
    }

    /// Build a namespaced node identifier `"<kind>:<id>"`.
    pub fn node(&self, id: &str) -> String {
        format!("{}:{}", self.as_str(), id)
    }
}
