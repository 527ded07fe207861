// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Integration tests for the engine lifecycle.
//!
//! Standalone tests run the real embedded workflow server and cache on
//! ephemeral ports. Failure paths use a recording infrastructure.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use common::*;
use weft_runtime::config::ConfigError;
use weft_runtime::weft_dsl::{Agent, ResourceKind};
use weft_runtime::weft_store::cache::CacheClient;
use weft_runtime::weft_store::{ResourceKey, StoreError, StoreKind};
use weft_runtime::{
    Config, Engine, EngineError, Mode, ModeError, StandaloneCacheOverride,
    StandaloneWorkflowOverride,
};

#[tokio::test]
async fn test_standalone_start_publishes_and_stop_clears() {
    init_tracing();
    let engine = sample_builder().build().unwrap();
    assert_eq!(engine.mode(), Mode::Standalone);

    engine.start().await.unwrap();
    assert!(engine.is_started());

    let port = engine.port().unwrap();
    assert_ne!(port, 0);
    assert_eq!(
        engine.base_url().as_deref(),
        Some(format!("http://127.0.0.1:{port}").as_str())
    );
    assert_eq!(engine.server().unwrap().local_addr().port(), port);
    assert!(engine.router().is_some());
    assert!(engine.client().is_some());

    let config = engine.config().unwrap();
    assert!(!config.workflow_engine.host_port.is_empty());
    assert_eq!(config.workflow_engine.namespace, "default");

    let store = engine.resource_store().unwrap();
    assert_eq!(store.kind(), StoreKind::Memory);

    engine.stop().await.unwrap();
    assert!(!engine.is_started());
    assert!(engine.resource_store().is_none());
    assert!(engine.server().is_none());
    assert!(engine.router().is_none());
    assert!(engine.client().is_none());
    assert!(engine.port().is_none());
    assert!(engine.config().is_none());

    // A store retained across stop is closed.
    let err = store
        .get(&ResourceKey::new("shop", ResourceKind::Agent, "clerk"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Closed));
}

#[tokio::test]
async fn test_second_start_fails_without_side_effects() {
    init_tracing();
    let engine = sample_builder().build().unwrap();
    engine.start().await.unwrap();
    let port = engine.port();

    let err = engine.start().await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyStarted));
    assert!(engine.is_started());
    assert_eq!(engine.port(), port);
    assert!(engine.last_start_error().is_none());

    engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_on_pristine_engine_is_ok() {
    let engine = sample_builder().build().unwrap();
    engine.stop().await.unwrap();
    engine.stop().await.unwrap();
    // Never started: returns immediately.
    engine.wait().await;
}

#[tokio::test]
async fn test_restart_after_stop() {
    init_tracing();
    let engine = sample_builder().build().unwrap();

    engine.start().await.unwrap();
    engine.stop().await.unwrap();

    engine.start().await.unwrap();
    assert!(engine.is_started());
    assert!(engine.resource_store().is_some());
    engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_start_without_config_fails() {
    let engine = Engine::builder()
        .with_agents([Agent::new("writer")])
        .build()
        .unwrap();

    let err = engine.start().await.unwrap_err();
    assert!(matches!(err, EngineError::ConfigUnavailable));
    assert!(matches!(
        engine.last_start_error(),
        Some(EngineError::ConfigUnavailable)
    ));
    assert!(!engine.is_started());
}

#[tokio::test]
async fn test_cache_persistence_selects_durable_store() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let engine = sample_builder()
        .with_standalone_cache_override(StandaloneCacheOverride::persistent(dir.path()))
        .build()
        .unwrap();

    engine.start().await.unwrap();
    assert_eq!(engine.resource_store().unwrap().kind(), StoreKind::Durable);
    assert!(engine.config().unwrap().cache.standalone.persistence);
    engine.stop().await.unwrap();

    assert!(dir.path().join("cache.db").exists());
}

#[tokio::test]
async fn test_workflow_override_is_applied() {
    init_tracing();
    let engine = sample_builder()
        .with_standalone_workflow_override(StandaloneWorkflowOverride {
            namespace: Some("orders".to_string()),
            ..Default::default()
        })
        .build()
        .unwrap();

    engine.start().await.unwrap();
    let config = engine.config().unwrap();
    assert_eq!(config.workflow_engine.namespace, "orders");
    assert_eq!(config.workflow_engine.standalone.namespace, "orders");
    engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_serves_host_routes() {
    init_tracing();
    let router = Router::new().route(
        "/ping",
        get(|| async { axum::Json(serde_json::json!({ "pong": true })) }),
    );
    let engine = sample_builder().with_router(router).build().unwrap();
    engine.start().await.unwrap();

    let body: serde_json::Value = engine.client().unwrap().get_json("/ping").await.unwrap();
    assert_eq!(body, serde_json::json!({ "pong": true }));

    engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_wait_resolves_after_stop() {
    init_tracing();
    let engine = Arc::new(sample_builder().build().unwrap());
    engine.start().await.unwrap();

    let waiter = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.wait().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());

    engine.stop().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("wait did not resolve")
        .unwrap();
}

// ============================================================================
// Failure paths
// ============================================================================

#[tokio::test]
async fn test_workflow_server_failure_rolls_back() {
    init_tracing();
    let infra = Arc::new(RecordingInfrastructure::failing_workflow_start());
    let engine = sample_builder()
        .with_infrastructure(infra.clone())
        .build()
        .unwrap();

    let err = engine.start().await.unwrap_err();
    let EngineError::Mode(mode_err) = &err else {
        panic!("unexpected error: {err}");
    };
    assert!(matches!(mode_err.primary(), ModeError::WorkflowServerStart(_)));

    // Stop is registered even for a half-started server; the cache never starts.
    assert_eq!(infra.events(), vec!["workflow start", "workflow stop"]);
    assert!(!engine.is_started());
    assert!(engine.resource_store().is_none());
    assert!(engine.last_start_error().is_some());
}

#[tokio::test]
async fn test_cancelled_start_rolls_back() {
    init_tracing();
    let infra = Arc::new(RecordingInfrastructure::hanging_cache_start());
    let engine = sample_builder()
        .with_infrastructure(infra.clone())
        .build()
        .unwrap();

    let result = tokio::time::timeout(Duration::from_millis(200), engine.start()).await;
    assert!(result.is_err(), "start should still be waiting on the cache");

    wait_for_event(&infra, "workflow stop").await;
    assert_eq!(
        infra.events(),
        vec!["workflow start", "cache start", "workflow stop"]
    );
    assert!(!engine.is_started());
    assert!(engine.resource_store().is_none());
}

#[tokio::test]
async fn test_stop_reports_teardown_failure_until_clean_stop() {
    init_tracing();
    let infra = Arc::new(RecordingInfrastructure::failing_workflow_stop());
    let engine = sample_builder()
        .with_infrastructure(infra.clone())
        .build()
        .unwrap();

    engine.start().await.unwrap();
    let store = engine.resource_store().unwrap();

    let err = engine.stop().await.unwrap_err();
    assert!(
        matches!(
            err,
            EngineError::ModeTeardown(ModeError::WorkflowServerStop(_))
        ),
        "{err}"
    );
    assert!(!engine.is_started());
    // Steps around the failing one still ran.
    assert!(infra.caches().iter().all(|cache| cache.is_closed()));
    let closed = store
        .get(&ResourceKey::new("shop", ResourceKind::Agent, "clerk"))
        .await
        .unwrap_err();
    assert!(matches!(closed, StoreError::Closed));

    // Stopping a stopped engine returns the recorded failure.
    let again = engine.stop().await.unwrap_err();
    assert_eq!(again.to_string(), err.to_string());

    infra.set_fail_workflow_stop(false);
    engine.start().await.unwrap();
    engine.stop().await.unwrap();
    engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_listen_failure_tears_down_mode() {
    init_tracing();
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = taken.local_addr().unwrap().port();

    let infra = Arc::new(RecordingInfrastructure::default());
    let engine = sample_builder()
        .with_port(port)
        .with_infrastructure(infra.clone())
        .build()
        .unwrap();

    let err = engine.start().await.unwrap_err();
    assert!(matches!(err, EngineError::Listen { .. }), "{err}");

    assert_eq!(
        infra.events(),
        vec!["workflow start", "cache start", "workflow stop"]
    );
    assert!(infra.caches().iter().all(|cache| cache.is_closed()));
    assert!(!engine.is_started());

    // A later successful start clears the recorded error.
    drop(taken);
    engine.start().await.unwrap();
    assert!(engine.last_start_error().is_none());
    engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_distributed_requires_cache_connection() {
    init_tracing();
    let mut config = test_config();
    config.mode = Mode::Distributed;
    config.workflow_engine.host_port = closed_address().await;

    let infra = Arc::new(RecordingInfrastructure::default());
    let engine = sample_builder()
        .with_config(config)
        .with_infrastructure(infra.clone())
        .build()
        .unwrap();
    assert_eq!(engine.mode(), Mode::Distributed);

    let err = engine.start().await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Mode(ModeError::Config(ConfigError::MissingDependency {
            dependency: "cache connection",
            ..
        }))
    ));
    assert!(infra.events().is_empty());
    assert!(engine.port().is_none());
}

#[tokio::test]
async fn test_distributed_requires_workflow_host() {
    let mut config = test_config();
    config.cache.url = Some("redis://127.0.0.1:6379/0".to_string());

    let engine = sample_builder()
        .with_mode(Mode::Distributed)
        .with_config(config)
        .with_infrastructure(Arc::new(RecordingInfrastructure::default()))
        .build()
        .unwrap();

    let err = engine.start().await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Mode(ModeError::Config(ConfigError::MissingDependency {
            dependency: "workflow engine host_port",
            ..
        }))
    ));
}

#[tokio::test]
async fn test_distributed_unreachable_engine_closes_cache() {
    init_tracing();
    let mut config = test_config();
    config.mode = Mode::Distributed;
    config.workflow_engine.host_port = closed_address().await;
    config.redis.host = Some("cache.internal".to_string());
    config.redis.port = Some(6379);

    let infra = Arc::new(RecordingInfrastructure::default());
    let engine = sample_builder()
        .with_config(config)
        .with_infrastructure(infra.clone())
        .build()
        .unwrap();

    let err = engine.start().await.unwrap_err();
    let EngineError::Mode(mode_err) = &err else {
        panic!("unexpected error: {err}");
    };
    assert!(matches!(mode_err.primary(), ModeError::Unreachable { .. }));

    assert_eq!(
        infra.events(),
        vec!["cache connect redis://cache.internal:6379/0"]
    );
    let caches = infra.caches();
    assert_eq!(caches.len(), 1);
    assert!(caches[0].is_closed());
    assert!(engine.port().is_none());
}

#[tokio::test]
async fn test_distributed_start_and_stop() {
    init_tracing();
    let workflow_engine = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();

    let mut config: Config = test_config();
    config.mode = Mode::Distributed;
    config.workflow_engine.host_port = workflow_engine.local_addr().unwrap().to_string();
    config.cache.url = Some("redis://127.0.0.1:6379/0".to_string());

    let infra = Arc::new(RecordingInfrastructure::default());
    let engine = sample_builder()
        .with_config(config)
        .with_infrastructure(infra.clone())
        .build()
        .unwrap();

    engine.start().await.unwrap();
    assert_eq!(engine.resource_store().unwrap().kind(), StoreKind::Durable);
    assert!(!infra.caches()[0].is_closed());

    engine.stop().await.unwrap();
    assert!(infra.caches()[0].is_closed());
}
