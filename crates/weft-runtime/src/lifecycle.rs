// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Start, stop and wait.
//!
//! `start` provisions the mode, binds the listener and spawns the serving
//! task, then publishes every handle at once. `stop` takes the handles back,
//! drains the server and tears everything down, collecting every error
//! instead of stopping at the first one.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use weft_store::ResourceStore;

use crate::client::{self, ApiClient};
use crate::config::Config;
use crate::engine::{Engine, ErrorSlots, RuntimeState};
use crate::error::{EngineError, Result};
use crate::mode::{self, ModeRuntimeState, RollbackStack};
use crate::server::{EmbeddedServer, ListenerHandle};

const LOOPBACK: &str = "127.0.0.1";

// ============================================================================
// Serve tracker
// ============================================================================

/// Join point for the serving task, re-armed on every start.
///
/// The serving task owns the sender half through a [`ServeGuard`]; waiters
/// are released when it is dropped, whether the task returns, panics or is
/// aborted.
#[derive(Debug)]
pub(crate) struct ServeTracker {
    done: Mutex<Option<watch::Receiver<()>>>,
}

#[derive(Debug)]
pub(crate) struct ServeGuard {
    _done: watch::Sender<()>,
}

impl ServeTracker {
    pub(crate) fn new() -> Self {
        Self {
            done: Mutex::new(None),
        }
    }

    pub(crate) fn arm(&self) -> ServeGuard {
        let (tx, rx) = watch::channel(());
        *self.done.lock().unwrap_or_else(PoisonError::into_inner) = Some(rx);
        ServeGuard { _done: tx }
    }

    pub(crate) async fn wait(&self) {
        let receiver = self
            .done
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(mut receiver) = receiver {
            while receiver.changed().await.is_ok() {}
        }
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Everything `start` brings up after mode bootstrap.
struct Launch {
    router: Router,
    server: Arc<EmbeddedServer>,
    listener: Arc<ListenerHandle>,
    client: ApiClient,
    base_url: String,
}

impl Engine {
    /// Provision infrastructure and begin serving.
    ///
    /// Fails with [`EngineError::AlreadyStarted`] on a running engine,
    /// without side effects. Any other failure is recorded and available
    /// from [`Engine::last_start_error`] until the next successful start.
    pub async fn start(&self) -> Result<()> {
        let _guard = self.start_guard.lock().await;
        if self.is_started() {
            return Err(EngineError::AlreadyStarted);
        }

        match self.start_inner().await {
            Ok(()) => {
                self.error_slots().start = None;
                Ok(())
            }
            Err(e) => {
                error!(mode = %self.mode, error = %e, "Engine failed to start");
                self.error_slots().start = Some(e.clone());
                Err(e)
            }
        }
    }

    async fn start_inner(&self) -> Result<()> {
        let mut config = self.config.clone().ok_or(EngineError::ConfigUnavailable)?;

        let ModeRuntimeState { store, cleanups } = mode::bootstrap(
            self.mode,
            &mut config,
            &self.overrides,
            self.infrastructure.as_ref(),
        )
        .await?;

        let launch = match self.launch(&config).await {
            Ok(launch) => launch,
            Err(e) => return Err(abort_start(e, store, cleanups).await),
        };

        let guard = self.serve_tracker.arm();
        let serve_task = spawn_serving(
            launch.server.clone(),
            launch.listener.clone(),
            launch.router.clone(),
            self.errors.clone(),
            guard,
        );

        let local_addr = launch.server.local_addr();
        let config = Arc::new(config);
        {
            let mut state = self.write_state();
            *state = RuntimeState {
                started: true,
                resource_store: Some(store),
                router: Some(launch.router),
                server: Some(launch.server),
                listener: Some(launch.listener),
                client: Some(launch.client),
                base_url: Some(launch.base_url.clone()),
                port: Some(local_addr.port()),
                config: Some(config),
                teardown: Some(cleanups),
                serve_task: Some(serve_task),
            };
        }

        info!(
            mode = %self.mode,
            address = %local_addr,
            base_url = %launch.base_url,
            "Engine started"
        );
        Ok(())
    }

    async fn launch(&self, config: &Config) -> Result<Launch> {
        let router = self.base_router.clone();

        let host = self.host.clone().unwrap_or_else(|| {
            let host = config.server.host.trim();
            let host = if host.is_empty() { LOOPBACK } else { host };
            host.to_string()
        });
        let port = if self.port != 0 {
            self.port
        } else {
            config.server.port
        };
        let address = bind_address(&host, port);

        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| EngineError::Listen {
                address: address.clone(),
                source: Arc::new(e),
            })?;
        let local_addr: SocketAddr = listener.local_addr().map_err(|e| EngineError::Listen {
            address: address.clone(),
            source: Arc::new(e),
        })?;
        let listener = Arc::new(ListenerHandle::new(listener, local_addr));
        debug!(requested = %address, bound = %local_addr, "Listener bound");

        let server = Arc::new(EmbeddedServer::new(
            local_addr,
            config.server.timeouts.clone(),
        ));

        let base_url = client::base_url(&host, local_addr.port());
        let client = match ApiClient::new(&base_url, config.server.timeouts.http_write) {
            Ok(client) => client,
            Err(e) => {
                listener.close();
                return Err(e.into());
            }
        };

        Ok(Launch {
            router,
            server,
            listener,
            client,
            base_url,
        })
    }

    /// Stop serving and tear down everything `start` provisioned.
    ///
    /// A no-op on an engine that is not running; it then returns the error
    /// of the last stop, if any. Otherwise every teardown step runs even when
    /// an earlier one fails, and the errors are returned together.
    pub async fn stop(&self) -> Result<()> {
        let _guard = self.stop_guard.lock().await;

        let snapshot = {
            let mut state = self.write_state();
            if state.started {
                Some(std::mem::take(&mut *state))
            } else {
                None
            }
        };
        let Some(snapshot) = snapshot else {
            return match self.error_slots().stop.clone() {
                Some(e) => Err(e),
                None => Ok(()),
            };
        };

        let shutdown_timeout = snapshot
            .config
            .as_deref()
            .map(shutdown_timeout)
            .unwrap_or_else(|| shutdown_timeout(&Config::default()));
        let mut errors = Vec::new();

        if let Some(server) = &snapshot.server {
            server.cancel();
            server.begin_shutdown();
        }

        let mut pending = None;
        if let Some(mut task) = snapshot.serve_task {
            match tokio::time::timeout(shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => errors.push(EngineError::ServingTask(e.to_string())),
                Err(_) => {
                    warn!(timeout = ?shutdown_timeout, "Graceful shutdown timed out; aborting");
                    task.abort();
                    errors.push(EngineError::ShutdownTimeout(shutdown_timeout));
                    pending = Some(task);
                }
            }
        }

        if let Some(listener) = &snapshot.listener
            && listener.close()
        {
            debug!(address = %listener.local_addr(), "Closed unused listener");
        }

        if let Some(task) = pending
            && let Err(e) = task.await
            && !e.is_cancelled()
        {
            errors.push(EngineError::ServingTask(e.to_string()));
        }

        if let Some(store) = &snapshot.resource_store
            && let Err(e) = store.close().await
        {
            errors.push(EngineError::StoreClose(e));
        }

        if let Some(teardown) = snapshot.teardown {
            errors.extend(teardown.run().await.into_iter().map(EngineError::ModeTeardown));
        }

        let mut slots = self.error_slots();
        if let Some(e) = slots.server.take() {
            errors.push(e);
        }

        match EngineError::join(errors) {
            Some(e) => {
                error!(error = %e, "Engine stopped with errors");
                slots.stop = Some(e.clone());
                Err(e)
            }
            None => {
                slots.stop = None;
                info!(mode = %self.mode, "Engine stopped");
                Ok(())
            }
        }
    }

    /// Resolve once the serving task of the latest start has finished.
    ///
    /// Returns immediately if the engine was never started.
    pub async fn wait(&self) {
        self.serve_tracker.wait().await;
    }
}

fn spawn_serving(
    server: Arc<EmbeddedServer>,
    listener: Arc<ListenerHandle>,
    router: Router,
    errors: Arc<Mutex<ErrorSlots>>,
    guard: ServeGuard,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let _done = guard;
        let Some(socket) = listener.take() else {
            debug!("Listener closed before serving began");
            return;
        };
        if let Err(e) = server.serve(socket, router).await {
            error!(address = %server.local_addr(), error = %e, "HTTP server failed");
            errors.lock().unwrap_or_else(PoisonError::into_inner).server =
                Some(EngineError::Serve(Arc::new(e)));
        }
    })
}

async fn abort_start(
    primary: EngineError,
    store: Arc<dyn ResourceStore>,
    cleanups: RollbackStack,
) -> EngineError {
    let mut errors = Vec::new();
    if let Err(e) = store.close().await {
        errors.push(EngineError::StoreClose(e));
    }
    errors.extend(cleanups.run().await.into_iter().map(EngineError::ModeTeardown));
    if errors.is_empty() {
        primary
    } else {
        errors.insert(0, primary);
        EngineError::Multiple(errors)
    }
}

fn shutdown_timeout(config: &Config) -> Duration {
    config
        .server
        .timeouts
        .server_shutdown
        .unwrap_or(config.workflow_engine.standalone.start_timeout)
}

fn bind_address(host: &str, port: u16) -> String {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}
