// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embedded HTTP server.

use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};

use axum::{Extension, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerTimeouts;

/// The engine's HTTP server.
///
/// Handlers can extract the server's [`CancellationToken`] as an
/// `Extension`; it is cancelled as soon as the engine begins stopping, before
/// in-flight requests are drained.
#[derive(Debug)]
pub struct EmbeddedServer {
    local_addr: SocketAddr,
    timeouts: ServerTimeouts,
    cancel: CancellationToken,
    shutdown: watch::Sender<bool>,
}

impl EmbeddedServer {
    pub(crate) fn new(local_addr: SocketAddr, timeouts: ServerTimeouts) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            local_addr,
            timeouts,
            cancel: CancellationToken::new(),
            shutdown,
        }
    }

    /// Bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Timeouts the server was built with.
    ///
    /// Only `http_write` is enforced here, as an end-to-end bound on each
    /// request. The serve loop does not apply `http_read`, `http_read_header`
    /// or `http_idle`; hosts that need them must enforce them in their own
    /// layers.
    pub fn timeouts(&self) -> &ServerTimeouts {
        &self.timeouts
    }

    /// Token cancelled when the server starts stopping.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Ask the serve loop to stop accepting and drain.
    pub(crate) fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Serve `router` on `listener` until [`begin_shutdown`](Self::begin_shutdown).
    pub(crate) fn serve(
        &self,
        listener: TcpListener,
        router: Router,
    ) -> impl std::future::Future<Output = std::io::Result<()>> + Send + 'static {
        let app = router
            .layer(Extension(self.cancel.clone()))
            .layer(TimeoutLayer::new(self.timeouts.http_write))
            .layer(TraceLayer::new_for_http());
        let mut shutdown = self.shutdown.subscribe();

        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown.wait_for(|stop| *stop).await;
                })
                .await
        }
    }
}

/// Owner of the bound listener until the serve loop takes it.
#[derive(Debug)]
pub struct ListenerHandle {
    local_addr: SocketAddr,
    listener: Mutex<Option<TcpListener>>,
}

impl ListenerHandle {
    pub(crate) fn new(listener: TcpListener, local_addr: SocketAddr) -> Self {
        Self {
            local_addr,
            listener: Mutex::new(Some(listener)),
        }
    }

    /// Bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub(crate) fn take(&self) -> Option<TcpListener> {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Release the socket if the serve loop never took it.
    ///
    /// Once serving, the socket is released when the serve loop returns.
    /// Returns whether this call closed it.
    pub(crate) fn close(&self) -> bool {
        self.take().is_some()
    }
}
