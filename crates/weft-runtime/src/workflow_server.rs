// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embedded durable-workflow server for standalone mode.
//!
//! Keeps its namespace registry in SQLite (`:memory:` by default, or a file)
//! and serves a small frontend over HTTP:
//!
//! - `GET /health`: liveness plus cluster name
//! - `GET /api/v1/namespaces`: registered namespaces
//!
//! When the UI is enabled, a second listener on `ui_port` serves a status page.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::StandaloneWorkflowConfig;
use crate::error::ModeError;
use crate::infra::WorkflowServer;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const MEMORY_DATABASE: &str = ":memory:";

/// SQLite-backed workflow server embedded in the engine process.
pub struct EmbeddedWorkflowServer {
    config: StandaloneWorkflowConfig,
    pool: SqlitePool,
    frontend_addr: RwLock<Option<SocketAddr>>,
    ui_addr: RwLock<Option<SocketAddr>>,
    running: Mutex<Option<Running>>,
}

struct Running {
    shutdown: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<std::io::Result<()>>)>,
}

#[derive(Clone)]
struct FrontendState {
    pool: SqlitePool,
    cluster_name: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    cluster: String,
}

#[derive(Serialize)]
struct NamespacesResponse {
    namespaces: Vec<String>,
}

impl EmbeddedWorkflowServer {
    /// Open the database and run migrations. Nothing is bound yet.
    pub async fn prepare(config: StandaloneWorkflowConfig) -> Result<Self, ModeError> {
        let pool = open_database(&config.database_file).await?;
        Ok(Self {
            config,
            pool,
            frontend_addr: RwLock::new(None),
            ui_addr: RwLock::new(None),
            running: Mutex::new(None),
        })
    }

    /// Address of the UI listener, when enabled and started.
    pub fn ui_address(&self) -> Option<SocketAddr> {
        *self.ui_addr.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registered namespace names.
    pub async fn namespaces(&self) -> Result<Vec<String>, ModeError> {
        list_namespaces(&self.pool)
            .await
            .map_err(|e| ModeError::WorkflowServerStart(e.to_string()))
    }

    async fn start_inner(&self, running: &mut Option<Running>) -> Result<(), ModeError> {
        sqlx::query(
            r#"
            INSERT INTO namespaces (name, cluster_name)
            VALUES (?, ?)
            ON CONFLICT(name) DO UPDATE SET cluster_name = excluded.cluster_name
            "#,
        )
        .bind(&self.config.namespace)
        .bind(&self.config.cluster_name)
        .execute(&self.pool)
        .await
        .map_err(|e| ModeError::WorkflowServerStart(format!("register namespace: {e}")))?;

        let frontend = bind(&self.config.bind_ip, self.config.frontend_port).await?;
        let frontend_addr = local_addr(&frontend)?;
        *self
            .frontend_addr
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(frontend_addr);

        let (shutdown, shutdown_rx) = watch::channel(false);
        let state = FrontendState {
            pool: self.pool.clone(),
            cluster_name: self.config.cluster_name.clone(),
        };
        let app = Router::new()
            .route("/health", get(health))
            .route("/api/v1/namespaces", get(namespaces))
            .with_state(state);
        let frontend_task = tokio::spawn(serve(frontend, app, shutdown_rx.clone()));

        // Stop can unwind from here on, even if the UI fails below
        let current = running.insert(Running {
            shutdown,
            tasks: vec![("frontend", frontend_task)],
        });

        info!(
            address = %frontend_addr,
            namespace = %self.config.namespace,
            cluster = %self.config.cluster_name,
            "Embedded workflow server started"
        );

        if !self.config.enable_ui {
            return Ok(());
        }

        match bind(&self.config.bind_ip, self.config.ui_port).await {
            Ok(listener) => {
                let ui_addr = local_addr(&listener)?;
                *self.ui_addr.write().unwrap_or_else(PoisonError::into_inner) = Some(ui_addr);
                let page = format!(
                    "weft embedded workflow server\ncluster: {}\nnamespace: {}\nfrontend: {}\n",
                    self.config.cluster_name, self.config.namespace, frontend_addr
                );
                let ui = Router::new().route("/", get(move || async move { page }));
                current
                    .tasks
                    .push(("ui", tokio::spawn(serve(listener, ui, shutdown_rx))));
                info!(address = %ui_addr, "Embedded workflow UI started");
                Ok(())
            }
            Err(e) if self.config.require_ui => Err(e),
            Err(e) => {
                warn!(error = %e, "Embedded workflow UI unavailable; continuing without it");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl WorkflowServer for EmbeddedWorkflowServer {
    async fn start(&self) -> Result<(), ModeError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }

        warn!("Embedded workflow server is intended for development; use distributed mode in production");

        let timeout = self.config.start_timeout;
        match tokio::time::timeout(timeout, self.start_inner(&mut running)).await {
            Ok(result) => result,
            Err(_) => Err(ModeError::WorkflowServerStart(format!(
                "did not start within {timeout:?}"
            ))),
        }
    }

    async fn stop(&self) -> Result<(), ModeError> {
        let running = self.running.lock().await.take();
        let mut failures = Vec::new();

        if let Some(running) = running {
            let _ = running.shutdown.send(true);
            for (name, mut task) in running.tasks {
                match tokio::time::timeout(self.config.start_timeout, &mut task).await {
                    Ok(Ok(Ok(()))) => {}
                    Ok(Ok(Err(e))) => failures.push(format!("{name}: {e}")),
                    Ok(Err(e)) => failures.push(format!("{name}: {e}")),
                    Err(_) => {
                        task.abort();
                        failures.push(format!("{name}: shutdown timed out"));
                    }
                }
            }
            debug!("Embedded workflow server listeners stopped");
        }

        self.pool.close().await;

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ModeError::WorkflowServerStop(failures.join("; ")))
        }
    }

    fn frontend_address(&self) -> String {
        match *self
            .frontend_addr
            .read()
            .unwrap_or_else(PoisonError::into_inner)
        {
            Some(addr) => addr.to_string(),
            None => format_host_port(&self.config.bind_ip, self.config.frontend_port),
        }
    }
}

async fn open_database(database_file: &str) -> Result<SqlitePool, ModeError> {
    let init_error = |e: String| ModeError::WorkflowServerInit(e);

    let options = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None::<Duration>)
        .max_lifetime(None::<Duration>);

    let pool = if database_file.trim().is_empty() || database_file == MEMORY_DATABASE {
        options.connect("sqlite::memory:").await
    } else {
        let path = Path::new(database_file);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                init_error(format!("Failed to create directory {:?}: {}", parent, e))
            })?;
        }
        options
            .connect(&format!("sqlite:{}?mode=rwc", path.to_string_lossy()))
            .await
    }
    .map_err(|e| init_error(format!("Failed to open {database_file}: {e}")))?;

    MIGRATOR
        .run(&pool)
        .await
        .map_err(|e| init_error(format!("migrate: {e}")))?;

    Ok(pool)
}

async fn bind(ip: &str, port: u16) -> Result<TcpListener, ModeError> {
    let address = format_host_port(ip, port);
    TcpListener::bind(&address)
        .await
        .map_err(|e| ModeError::WorkflowServerStart(format!("listen on {address}: {e}")))
}

fn local_addr(listener: &TcpListener) -> Result<SocketAddr, ModeError> {
    listener
        .local_addr()
        .map_err(|e| ModeError::WorkflowServerStart(e.to_string()))
}

fn format_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

async fn serve(
    listener: TcpListener,
    app: Router,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
}

async fn list_namespaces(pool: &SqlitePool) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT name FROM namespaces ORDER BY name")
        .fetch_all(pool)
        .await
}

async fn health(State(state): State<FrontendState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        cluster: state.cluster_name,
    })
}

async fn namespaces(
    State(state): State<FrontendState>,
) -> Result<Json<NamespacesResponse>, (axum::http::StatusCode, String)> {
    list_namespaces(&state.pool)
        .await
        .map(|namespaces| Json(NamespacesResponse { namespaces }))
        .map_err(|e| (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}
