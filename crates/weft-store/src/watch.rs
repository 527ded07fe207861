// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Change notification fan-out shared by the store implementations.

use std::sync::{Mutex, PoisonError};

use tokio::sync::broadcast;
use tracing::warn;
use weft_dsl::ResourceKind;

use crate::StoreEvent;

const WATCH_CAPACITY: usize = 256;

/// Broadcast hub. Dropping the sender on close ends every open watch.
pub(crate) struct WatchHub {
    sender: Mutex<Option<broadcast::Sender<StoreEvent>>>,
}

impl WatchHub {
    pub(crate) fn new() -> Self {
        let (sender, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            sender: Mutex::new(Some(sender)),
        }
    }

    /// `None` once the hub is closed.
    pub(crate) fn subscribe(&self, project: &str, kind: ResourceKind) -> Option<StoreWatch> {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(|sender| StoreWatch {
            receiver: sender.subscribe(),
            project: project.to_string(),
            kind,
        })
    }

    pub(crate) fn publish(&self, event: StoreEvent) {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sender) = guard.as_ref() {
            // No subscribers is fine
            let _ = sender.send(event);
        }
    }

    pub(crate) fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Stream of changes for one (project, kind) pair.
pub struct StoreWatch {
    receiver: broadcast::Receiver<StoreEvent>,
    project: String,
    kind: ResourceKind,
}

impl StoreWatch {
    /// Next matching event, or `None` when the store has been closed.
    ///
    /// A slow watcher that falls behind skips the missed events.
    pub async fn next(&mut self) -> Option<StoreEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if event.key.project == self.project && event.key.kind == self.kind {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        project = %self.project,
                        kind = %self.kind,
                        skipped,
                        "Store watcher lagged; events dropped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
