// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for weft-store.

use thiserror::Error;

/// Errors raised by a [`CacheClient`](crate::cache::CacheClient).
///
/// Cloneable so owners can record and re-report a failure.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The client was closed.
    #[error("cache is closed")]
    Closed,

    /// Could not establish a connection.
    #[error("failed to connect to cache at {address}: {details}")]
    Connect {
        /// Address or URL that was dialed.
        address: String,
        /// Underlying failure.
        details: String,
    },

    /// A cache command failed.
    #[error("cache {operation} failed: {details}")]
    Command {
        /// Command name.
        operation: &'static str,
        /// Underlying failure.
        details: String,
    },

    /// The embedded cache's write-through storage failed.
    #[error("cache persistence {operation} failed: {details}")]
    Persistence {
        /// Step that failed.
        operation: &'static str,
        /// Underlying failure.
        details: String,
    },
}

impl From<sqlx::Error> for CacheError {
    fn from(err: sqlx::Error) -> Self {
        CacheError::Persistence {
            operation: "query",
            details: err.to_string(),
        }
    }
}

/// Errors raised by a [`ResourceStore`](crate::ResourceStore).
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The store was closed; no further operations are accepted.
    #[error("store is closed")]
    Closed,

    /// The key is not addressable (empty project or id).
    #[error("invalid resource key: {0}")]
    InvalidKey(String),

    /// A value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backing cache failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;
