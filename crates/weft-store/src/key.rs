// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Keys, ETags and change events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use weft_dsl::ResourceKind;

use crate::{Result, StoreError};

/// Address of a resource: project, kind and id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    /// Owning project name.
    pub project: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Resource identifier.
    pub id: String,
}

impl ResourceKey {
    /// Build a key.
    pub fn new(project: impl Into<String>, kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            kind,
            id: id.into(),
        }
    }

    /// Reject keys with a blank project or id.
    pub fn validate(&self) -> Result<()> {
        if self.project.trim().is_empty() {
            return Err(StoreError::InvalidKey("project is required".to_string()));
        }
        if self.id.trim().is_empty() {
            return Err(StoreError::InvalidKey(format!(
                "{} id is required",
                self.kind
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.project, self.kind, self.id)
    }
}

/// Content hash of a stored value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ETag(String);

impl ETag {
    /// SHA-256 over the JSON encoding of `value`.
    ///
    /// Object keys serialize in sorted order, so equal values hash equally.
    pub fn of(value: &serde_json::Value) -> Result<Self> {
        let bytes = serde_json::to_vec(value)?;
        Ok(Self(hex::encode(Sha256::digest(&bytes))))
    }

    /// Hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ETag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A value as held by a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResource {
    /// Stored JSON value.
    pub value: serde_json::Value,
    /// ETag of `value`.
    pub etag: ETag,
    /// Time of the last write.
    pub updated_at: DateTime<Utc>,
}

impl StoredResource {
    pub(crate) fn new(value: serde_json::Value) -> Result<Self> {
        let etag = ETag::of(&value)?;
        Ok(Self {
            value,
            etag,
            updated_at: Utc::now(),
        })
    }
}

/// Kind of change carried by a [`StoreEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreEventKind {
    /// The key was created or replaced.
    Put,
    /// The key was removed.
    Delete,
}

/// Notification of a change to a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreEvent {
    /// Change type.
    pub kind: StoreEventKind,
    /// Affected key.
    pub key: ResourceKey,
    /// ETag after a put; `None` for deletes.
    pub etag: Option<ETag>,
    /// When the change happened.
    pub at: DateTime<Utc>,
}

impl StoreEvent {
    pub(crate) fn put(key: ResourceKey, etag: ETag) -> Self {
        Self {
            kind: StoreEventKind::Put,
            key,
            etag: Some(etag),
            at: Utc::now(),
        }
    }

    pub(crate) fn delete(key: ResourceKey) -> Self {
        Self {
            kind: StoreEventKind::Delete,
            key,
            etag: None,
            at: Utc::now(),
        }
    }
}
