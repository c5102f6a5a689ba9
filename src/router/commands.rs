//! Commands for the router actor
//!
//! Triggers and setting changes are fire-and-forget; queries and lifecycle
//! operations answer on a oneshot channel.

use super::trigger::InboundMessage;
use super::RouterStatus;
use crate::dispatch::ShutdownMode;
use crate::endpoints::Endpoint;
use crate::scene::{CompiledConfig, SceneTable};
use std::sync::Arc;
use tokio::sync::oneshot;

pub enum RouterCommand {
    // -------------------------------------------------------------------------
    // Hot path (no response)
    // -------------------------------------------------------------------------
    /// Message received on the listen port
    Trigger(InboundMessage),

    /// Listener state changed
    SetListening(bool),

    // -------------------------------------------------------------------------
    // Request-response
    // -------------------------------------------------------------------------
    /// Install a compiled configuration in one step
    ///
    /// Replies once the new table and endpoints are in force.
    Reload {
        config: Box<CompiledConfig>,
        response: oneshot::Sender<()>,
    },

    /// Set or clear the reply endpoint
    ///
    /// An explicit reply outranks the one from the configuration file on
    /// later reloads.
    SetReply {
        reply: Option<Endpoint>,
        response: oneshot::Sender<()>,
    },

    Status {
        response: oneshot::Sender<RouterStatus>,
    },

    /// Currently installed scene table, if any
    Scenes {
        response: oneshot::Sender<Option<Arc<SceneTable>>>,
    },

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------
    /// Stop the actor and its scheduler; replies with the number of delayed
    /// commands cancelled or drained
    Shutdown {
        mode: ShutdownMode,
        response: oneshot::Sender<usize>,
    },
}

// Manual Debug: configs are large and senders carry nothing useful
impl std::fmt::Debug for RouterCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouterCommand::Trigger(message) => f.debug_tuple("Trigger").field(message).finish(),
            RouterCommand::SetListening(on) => f.debug_tuple("SetListening").field(on).finish(),
            RouterCommand::Reload { config, .. } => f
                .debug_struct("Reload")
                .field("scenes", &config.scenes.len())
                .field("endpoints", &config.endpoints.len())
                .finish_non_exhaustive(),
            RouterCommand::SetReply { reply, .. } => f
                .debug_struct("SetReply")
                .field("reply", reply)
                .finish_non_exhaustive(),
            RouterCommand::Status { .. } => write!(f, "Status"),
            RouterCommand::Scenes { .. } => write!(f, "Scenes"),
            RouterCommand::Shutdown { mode, .. } => f
                .debug_struct("Shutdown")
                .field("mode", mode)
                .finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TypedValue;

    #[test]
    fn test_router_command_debug() {
        let cmd = RouterCommand::Trigger(InboundMessage::new(
            "/scene/intro",
            vec![TypedValue::Int(1)],
        ));
        assert!(format!("{:?}", cmd).contains("/scene/intro"));

        let (tx, _rx) = oneshot::channel();
        let cmd = RouterCommand::Reload {
            config: Box::default(),
            response: tx,
        };
        let debug_str = format!("{:?}", cmd);
        assert!(debug_str.contains("Reload"));
        assert!(debug_str.contains("scenes: 0"));

        let (tx, _rx) = oneshot::channel();
        let cmd = RouterCommand::Status { response: tx };
        assert_eq!(format!("{:?}", cmd), "Status");
    }
}
