// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for weft-runtime.
//!
//! All errors are `Clone`: the engine records start, serving and stop
//! failures and hands them out again later (a no-op `stop` returns the last
//! recorded stop error).

use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use weft_dsl::ResourceKind;
use weft_store::{CacheError, StoreError};

use crate::client::ClientError;
use crate::config::ConfigError;

/// Result type using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised while provisioning mode infrastructure.
#[derive(Debug, Clone, Error)]
pub enum ModeError {
    /// Mode preconditions are not met.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The embedded workflow server could not be prepared.
    #[error("failed to prepare embedded workflow server: {0}")]
    WorkflowServerInit(String),

    /// The embedded workflow server failed to start.
    #[error("failed to start embedded workflow server: {0}")]
    WorkflowServerStart(String),

    /// The embedded workflow server failed to stop.
    #[error("failed to stop embedded workflow server: {0}")]
    WorkflowServerStop(String),

    /// The embedded cache failed to start.
    #[error("failed to start embedded cache: {0}")]
    EmbeddedCache(CacheError),

    /// The external cache could not be reached.
    #[error("failed to connect to cache: {0}")]
    CacheConnect(CacheError),

    /// A cache failed to close during teardown.
    #[error("failed to close cache: {0}")]
    CacheClose(CacheError),

    /// The workflow engine host refused or failed the probe.
    #[error("workflow engine at {address} is unreachable: {details}")]
    Unreachable {
        /// Probed `host:port`.
        address: String,
        /// Underlying failure.
        details: String,
    },

    /// The workflow engine probe did not complete in time.
    #[error("workflow engine at {address} did not respond within {timeout:?}")]
    ProbeTimeout {
        /// Probed `host:port`.
        address: String,
        /// Probe bound.
        timeout: Duration,
    },

    /// A teardown action did not finish in time.
    #[error("cleanup '{name}' timed out after {timeout:?}")]
    CleanupTimeout {
        /// Cleanup label.
        name: &'static str,
        /// Bound that was exceeded.
        timeout: Duration,
    },

    /// A teardown action panicked.
    #[error("cleanup '{0}' panicked")]
    CleanupPanicked(&'static str),

    /// Provisioning failed and rollback raised further errors.
    #[error("{primary} (rollback: {})", join_messages(.rollback, "; "))]
    RolledBack {
        /// The provisioning error.
        primary: Box<ModeError>,
        /// Errors raised while unwinding.
        rollback: Vec<ModeError>,
    },
}

impl ModeError {
    /// The provisioning error, unwrapping rollback detail.
    pub fn primary(&self) -> &ModeError {
        match self {
            ModeError::RolledBack { primary, .. } => primary.primary(),
            other => other,
        }
    }
}

/// Errors raised by the engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Construction with an empty registry.
    #[error("at least one resource must be registered")]
    NoResources,

    /// `start` on a running engine.
    #[error("engine already started")]
    AlreadyStarted,

    /// `start` without configuration.
    #[error("configuration is not available")]
    ConfigUnavailable,

    /// Mode bootstrap failed.
    #[error("mode bootstrap failed: {0}")]
    Mode(#[from] ModeError),

    /// The HTTP listener could not be opened.
    #[error("failed to listen on {address}: {source}")]
    Listen {
        /// Requested `host:port`.
        address: String,
        /// Underlying failure.
        #[source]
        source: Arc<io::Error>,
    },

    /// The self-referencing API client could not be built.
    #[error("failed to create api client: {0}")]
    Client(#[from] ClientError),

    /// Graceful shutdown exceeded its bound.
    #[error("server shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),

    /// The serving task could not be joined.
    #[error("serving task failed: {0}")]
    ServingTask(String),

    /// The resource store failed to close.
    #[error("failed to close resource store: {0}")]
    StoreClose(StoreError),

    /// Mode teardown raised errors.
    #[error("mode teardown failed: {0}")]
    ModeTeardown(ModeError),

    /// The server failed after `start` returned.
    #[error("http server failure: {0}")]
    Serve(Arc<io::Error>),

    /// Several errors from one operation.
    #[error("{}", join_messages(.0, "\n"))]
    Multiple(Vec<EngineError>),

    /// The resource store is not available (engine not started).
    #[error("resource store is not configured")]
    StoreUnavailable,

    /// Registration needs a named project.
    #[error("project name is required")]
    ProjectRequired,

    /// The key already exists in the store.
    #[error("{kind} {id} already registered")]
    AlreadyRegistered {
        /// Resource kind.
        kind: ResourceKind,
        /// Resource id.
        id: String,
    },

    /// A resource store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A resource could not be encoded.
    #[error("failed to encode {kind} {id}: {details}")]
    Serialization {
        /// Resource kind.
        kind: ResourceKind,
        /// Resource id.
        id: String,
        /// Underlying failure.
        details: String,
    },
}

impl EngineError {
    /// Collapse a list of errors: `None` when empty, the error itself when
    /// single, [`EngineError::Multiple`] otherwise.
    pub fn join(mut errors: Vec<EngineError>) -> Option<EngineError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(EngineError::Multiple(errors)),
        }
    }
}

fn join_messages<E: std::fmt::Display>(errors: &[E], separator: &str) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join() {
        assert!(EngineError::join(vec![]).is_none());
        assert!(matches!(
            EngineError::join(vec![EngineError::NoResources]),
            Some(EngineError::NoResources)
        ));

        let joined = EngineError::join(vec![
            EngineError::ShutdownTimeout(Duration::from_secs(1)),
            EngineError::StoreClose(StoreError::Closed),
        ])
        .unwrap();
        assert_eq!(
            joined.to_string(),
            "server shutdown timed out after 1s\nfailed to close resource store: store is closed"
        );
    }

    #[test]
    fn test_rolled_back_keeps_primary() {
        let err = ModeError::RolledBack {
            primary: Box::new(ModeError::WorkflowServerStart("port in use".into())),
            rollback: vec![ModeError::CleanupPanicked("embedded cache")],
        };
        assert!(matches!(err.primary(), ModeError::WorkflowServerStart(_)));
        assert_eq!(
            err.to_string(),
            "failed to start embedded workflow server: port in use (rollback: cleanup 'embedded cache' panicked)"
        );
    }

    #[test]
    fn test_registration_messages() {
        let err = EngineError::AlreadyRegistered {
            kind: ResourceKind::Workflow,
            id: "checkout".into(),
        };
        assert_eq!(err.to_string(), "workflow checkout already registered");
        assert_eq!(
            EngineError::StoreUnavailable.to_string(),
            "resource store is not configured"
        );
    }
}
