//! Router module - the runtime scene state machine
//!
//! The Router is a single actor task that owns:
//! - the installed scene table and the active scene
//! - the reply-endpoint policy (config vs. explicit override)
//! - the status published to watchers
//!
//! Inbound triggers are processed strictly one at a time, and every
//! immediate command of a trigger is handed to the transport before the next
//! trigger is looked at. Delayed commands go to the dispatcher's scheduler.

mod anti_echo;
mod commands;
mod handle;
mod state;
mod trigger;

#[cfg(test)]
mod tests;

pub use commands::RouterCommand;
pub use handle::RouterHandle;
pub use state::{Outcome, SceneState};
pub use trigger::{classify, InboundMessage, Trigger, MIDI_SCENE_PREFIX};

use crate::dispatch::Dispatcher;
use crate::scene::{CompiledConfig, OutgoingCommand};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

/// Read-only view of the router, published on every change
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouterStatus {
    pub active_scene_key: Option<String>,
    pub active_scene_name: Option<String>,
    pub listening: bool,
    pub scene_count: usize,
    /// False until the first configuration compiled successfully
    pub loaded: bool,
}

pub struct Router {
    state: SceneState,
    dispatcher: Dispatcher,
    /// Reply endpoint was set explicitly; reloads leave it alone
    reply_pinned: bool,
    listening: bool,
    status_tx: watch::Sender<RouterStatus>,
    command_rx: mpsc::UnboundedReceiver<RouterCommand>,
    trigger_count: u64,
}

impl Router {
    /// Spawn the router actor on top of a dispatcher
    ///
    /// The router starts idle: triggers are dropped with "no configuration
    /// loaded" until the first [`RouterHandle::reload`].
    pub fn spawn(dispatcher: Dispatcher) -> RouterHandle {
        let (cmd_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(RouterStatus::default());
        let scheduler = dispatcher.scheduler().clone();

        let router = Router {
            state: SceneState::new(),
            dispatcher,
            reply_pinned: false,
            listening: false,
            status_tx,
            command_rx,
            trigger_count: 0,
        };
        tokio::spawn(router.run());

        info!("Router spawned");

        RouterHandle::new(cmd_tx, status_rx, scheduler)
    }

    async fn run(mut self) {
        debug!("Router run loop started");

        while let Some(cmd) = self.command_rx.recv().await {
            trace!(?cmd, "Processing command");

            match cmd {
                RouterCommand::Trigger(message) => self.handle_trigger(message).await,
                RouterCommand::SetListening(on) => {
                    self.listening = on;
                    self.publish();
                }
                RouterCommand::Reload { config, response } => {
                    self.handle_reload(*config);
                    let _ = response.send(());
                }
                RouterCommand::SetReply { reply, response } => {
                    match &reply {
                        Some(endpoint) => info!("↩️  Reply endpoint set to {}", endpoint.target()),
                        None => info!("↩️  Reply endpoint cleared"),
                    }
                    self.reply_pinned = true;
                    self.dispatcher.outbox().set_reply(reply);
                    let _ = response.send(());
                }
                RouterCommand::Status { response } => {
                    let _ = response.send(self.status());
                }
                RouterCommand::Scenes { response } => {
                    let _ = response.send(self.state.table().cloned());
                }
                RouterCommand::Shutdown { mode, response } => {
                    let pending = self.dispatcher.scheduler().shutdown(mode).await;
                    self.dispatcher.outbox().shutdown().await;
                    let _ = response.send(pending);
                    break;
                }
            }
        }

        info!(
            "🛑 Router stopped ({} triggers processed)",
            self.trigger_count
        );
    }

    async fn handle_trigger(&mut self, message: InboundMessage) {
        self.trigger_count += 1;
        let reply = self.dispatcher.outbox().has_reply();

        match self.state.handle(&message, reply) {
            Outcome::Dropped(warning) => warn!("⚠️  {}", warning),
            Outcome::Suppressed => debug!("🔇 Ignoring release {}", message),
            Outcome::Reaffirmed { announcements } => {
                debug!("Scene already active: {}", message);
                self.send_all(announcements).await;
            }
            Outcome::Activated {
                key,
                announcements,
                commands,
            } => {
                self.send_all(announcements).await;

                self.publish();
                info!(
                    "🎬 Scene '{}' ({}) active, {} command(s)",
                    self.state.active_name().unwrap_or_else(|| key.clone()),
                    key,
                    commands.len()
                );

                self.send_all(commands).await;
            }
            Outcome::Forwarded(command) => {
                trace!("Forwarding {}", command);
                self.dispatcher.send(command).await;
            }
        }
    }

    async fn send_all(&self, commands: Vec<OutgoingCommand>) {
        for command in commands {
            self.dispatcher.send(command).await;
        }
    }

    fn handle_reload(&mut self, config: CompiledConfig) {
        let CompiledConfig {
            endpoints,
            scenes,
            reply,
            ..
        } = config;

        let scene_count = scenes.len();
        let endpoint_count = endpoints.len();

        self.dispatcher.outbox().install(endpoints);
        if !self.reply_pinned {
            self.dispatcher.outbox().set_reply(reply);
        }
        self.state.install(Arc::new(scenes));
        self.publish();

        info!(
            "🔄 Installed {} scene(s) and {} endpoint(s)",
            scene_count, endpoint_count
        );
    }

    fn status(&self) -> RouterStatus {
        RouterStatus {
            active_scene_key: self.state.active().map(str::to_string),
            active_scene_name: self.state.active_name(),
            listening: self.listening,
            scene_count: self.state.table().map_or(0, |t| t.len()),
            loaded: self.state.table().is_some(),
        }
    }

    fn publish(&self) {
        let status = self.status();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }
}
