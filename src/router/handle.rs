//! RouterHandle - public API of the router actor

use super::commands::RouterCommand;
use super::trigger::InboundMessage;
use super::RouterStatus;
use crate::dispatch::{SchedulerHandle, ShutdownMode};
use crate::endpoints::Endpoint;
use crate::scene::{CompiledConfig, SceneTable};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

/// Handle for talking to the router, cheap to clone
///
/// # Fire-and-forget
/// - `trigger` - feed an inbound message
/// - `set_listening` - report listener state
///
/// # Awaiting a response
/// - `reload`, `set_reply`, `status`, `scenes`, `shutdown`
#[derive(Clone)]
pub struct RouterHandle {
    cmd_tx: mpsc::UnboundedSender<RouterCommand>,
    status_rx: watch::Receiver<RouterStatus>,
    scheduler: SchedulerHandle,
}

impl RouterHandle {
    pub(super) fn new(
        cmd_tx: mpsc::UnboundedSender<RouterCommand>,
        status_rx: watch::Receiver<RouterStatus>,
        scheduler: SchedulerHandle,
    ) -> Self {
        Self {
            cmd_tx,
            status_rx,
            scheduler,
        }
    }

    pub fn trigger(&self, message: InboundMessage) {
        let _ = self.cmd_tx.send(RouterCommand::Trigger(message));
    }

    pub fn set_listening(&self, on: bool) {
        let _ = self.cmd_tx.send(RouterCommand::SetListening(on));
    }

    /// Install a compiled configuration; returns once it is in force
    pub async fn reload(&self, config: CompiledConfig) {
        let (response_tx, response_rx) = oneshot::channel();
        let cmd = RouterCommand::Reload {
            config: Box::new(config),
            response: response_tx,
        };
        if self.cmd_tx.send(cmd).is_ok() {
            let _ = response_rx.await;
        }
    }

    pub async fn set_reply(&self, reply: Option<Endpoint>) {
        let (response_tx, response_rx) = oneshot::channel();
        let cmd = RouterCommand::SetReply {
            reply,
            response: response_tx,
        };
        if self.cmd_tx.send(cmd).is_ok() {
            let _ = response_rx.await;
        }
    }

    /// Status after every command queued so far has been processed
    pub async fn status(&self) -> RouterStatus {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(RouterCommand::Status {
                response: response_tx,
            })
            .is_err()
        {
            return self.status_rx.borrow().clone();
        }
        match response_rx.await {
            Ok(status) => status,
            Err(_) => self.status_rx.borrow().clone(),
        }
    }

    /// Subscribe to status changes
    pub fn watch_status(&self) -> watch::Receiver<RouterStatus> {
        self.status_rx.clone()
    }

    pub async fn scenes(&self) -> Option<Arc<SceneTable>> {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(RouterCommand::Scenes {
                response: response_tx,
            })
            .is_err()
        {
            return None;
        }
        response_rx.await.ok().flatten()
    }

    /// Delayed commands not yet sent
    pub async fn pending(&self) -> usize {
        self.scheduler.pending().await
    }

    /// Drop every delayed command not yet sent
    pub async fn cancel_pending(&self) -> usize {
        self.scheduler.cancel_all().await
    }

    /// Stop the router; `mode` decides the fate of pending delayed commands
    pub async fn shutdown(&self, mode: ShutdownMode) -> usize {
        let (response_tx, response_rx) = oneshot::channel();
        let cmd = RouterCommand::Shutdown {
            mode,
            response: response_tx,
        };
        if self.cmd_tx.send(cmd).is_err() {
            return 0;
        }
        response_rx.await.unwrap_or(0)
    }
}
