//! Active-scene state machine
//!
//! Pure decision logic: given an inbound message, decide which commands go
//! out and in which order. The actor executes the returned [`Outcome`].

use super::anti_echo;
use super::trigger::{classify, InboundMessage, Trigger};
use crate::error::RoutingWarning;
use crate::scene::{midi_number, OutgoingCommand, SceneTable};
use std::sync::Arc;

/// Result of one inbound message
#[derive(Debug)]
pub enum Outcome {
    /// Nothing to send; the warning says why
    Dropped(RoutingWarning),
    /// A zero-valued trigger, most likely our own echo
    Suppressed,
    /// Trigger for the scene that is already active
    Reaffirmed { announcements: Vec<OutgoingCommand> },
    /// A new scene became active
    Activated {
        key: String,
        /// Reply-endpoint activation messages, sent before anything else
        announcements: Vec<OutgoingCommand>,
        /// The scene's own commands, in declaration order
        commands: Vec<OutgoingCommand>,
    },
    /// Not a scene trigger, forwarded as-is
    Forwarded(OutgoingCommand),
}

/// Owned by the router actor; never shared
#[derive(Debug, Default)]
pub struct SceneState {
    table: Option<Arc<SceneTable>>,
    active: Option<String>,
}

impl SceneState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a freshly compiled table. The active scene is kept.
    pub fn install(&mut self, table: Arc<SceneTable>) {
        self.table = Some(table);
    }

    pub fn table(&self) -> Option<&Arc<SceneTable>> {
        self.table.as_ref()
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Display name of the active scene; the key if the current table no
    /// longer has it
    pub fn active_name(&self) -> Option<String> {
        let key = self.active.as_deref()?;
        Some(
            self.table
                .as_ref()
                .and_then(|t| t.get(key))
                .map_or_else(|| key.to_string(), |s| s.display_name.clone()),
        )
    }

    /// Decide what one inbound message does.
    ///
    /// `reply` tells whether a reply endpoint is configured; without one no
    /// activation messages are announced, but the scene still changes.
    pub fn handle(&mut self, message: &InboundMessage, reply: bool) -> Outcome {
        let key = match classify(&message.address) {
            Trigger::Passthrough => return Outcome::Forwarded(message.to_command()),
            Trigger::Invalid => {
                return Outcome::Dropped(RoutingWarning::InvalidAddress(message.to_string()))
            }
            Trigger::Scene(key) => key,
            Trigger::Midi(fraction) => {
                let Some(table) = &self.table else {
                    return Outcome::Dropped(RoutingWarning::NotLoaded(message.to_string()));
                };
                match midi_number(fraction).and_then(|n| table.key_for_midi(n)) {
                    Some(key) => key.to_string(),
                    None => {
                        return Outcome::Dropped(RoutingWarning::UndefinedScene(
                            message.address.clone(),
                        ))
                    }
                }
            }
        };

        let Some(table) = self.table.clone() else {
            return Outcome::Dropped(RoutingWarning::NotLoaded(message.to_string()));
        };
        let Some(scene) = table.get(&key) else {
            return Outcome::Dropped(RoutingWarning::UndefinedScene(key));
        };

        if anti_echo::is_echo(message) {
            return Outcome::Suppressed;
        }

        if anti_echo::is_reaffirm(self.active(), &key) {
            let announcements = if reply {
                vec![OutgoingCommand::activation(&key, true)]
            } else {
                Vec::new()
            };
            return Outcome::Reaffirmed { announcements };
        }

        let mut announcements = Vec::new();
        if reply {
            announcements.push(OutgoingCommand::activation(&key, true));
            match self.active.as_deref() {
                Some(previous) => announcements.push(OutgoingCommand::activation(previous, false)),
                // Cold start: nobody knows what the surface shows, clear all
                None => announcements.extend(
                    table
                        .keys()
                        .filter(|k| *k != key)
                        .map(|k| OutgoingCommand::activation(k, false)),
                ),
            }
        }

        self.active = Some(key.clone());

        Outcome::Activated {
            key,
            announcements,
            commands: scene.commands.clone(),
        }
    }
}
