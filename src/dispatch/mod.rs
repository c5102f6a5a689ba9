//! Outbound dispatch
//!
//! [`Outbox`] resolves a command's prefix to an endpoint, encodes it and hands
//! it to the transport. [`Dispatcher`] adds the delayed path: a command that
//! still carries a delay goes to the [`scheduler`] and comes back to the
//! outbox when due, resolved against whatever routes are installed then.

pub mod scheduler;

pub use scheduler::{Scheduler, SchedulerHandle, ShutdownMode};

use crate::drivers::Transport;
use crate::endpoints::{Endpoint, EndpointRegistry, SCENE_PREFIX};
use crate::error::RoutingWarning;
use crate::scene::OutgoingCommand;
use parking_lot::RwLock;
use rosc::OscPacket;
use std::sync::Arc;
use tracing::{debug, warn};

/// Endpoints and reply destination in force at one moment
#[derive(Debug, Clone, Default)]
pub struct Routes {
    pub endpoints: EndpointRegistry,
    pub reply: Option<Endpoint>,
}

impl Routes {
    /// Endpoint for a prefix; `scene` goes to the reply destination
    pub fn resolve(&self, command: &OutgoingCommand) -> Result<&Endpoint, RoutingWarning> {
        if command.prefix == SCENE_PREFIX {
            return self
                .reply
                .as_ref()
                .ok_or_else(|| RoutingWarning::NoReplyEndpoint(command.to_string()));
        }

        self.endpoints
            .get(&command.prefix)
            .ok_or_else(|| RoutingWarning::UnknownPrefix {
                prefix: command.prefix.clone(),
                address: command.address.clone(),
            })
    }
}

pub struct Outbox {
    transport: Arc<dyn Transport>,
    routes: RwLock<Arc<Routes>>,
}

impl Outbox {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            routes: RwLock::new(Arc::new(Routes::default())),
        }
    }

    /// Swap in the endpoints of a freshly compiled configuration
    pub fn install(&self, endpoints: EndpointRegistry) {
        let mut routes = self.routes.write();
        let reply = routes.reply.clone();
        *routes = Arc::new(Routes { endpoints, reply });
    }

    pub fn set_reply(&self, reply: Option<Endpoint>) {
        let mut routes = self.routes.write();
        let endpoints = routes.endpoints.clone();
        *routes = Arc::new(Routes { endpoints, reply });
    }

    /// Snapshot of the current routes
    pub fn routes(&self) -> Arc<Routes> {
        self.routes.read().clone()
    }

    pub fn has_reply(&self) -> bool {
        self.routes.read().reply.is_some()
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// Resolve, encode and transmit one command right away
    pub async fn send_now(&self, command: &OutgoingCommand) -> Result<(), RoutingWarning> {
        let routes = self.routes();
        let target = routes.resolve(command)?.target();

        let packet = rosc::encoder::encode(&OscPacket::Message(command.to_osc())).map_err(|e| {
            RoutingWarning::Encode {
                address: command.address.clone(),
                reason: format!("{:?}", e),
            }
        })?;

        self.transport
            .send(&target, &packet)
            .await
            .map_err(|source| RoutingWarning::Transport {
                address: command.address.clone(),
                target: target.clone(),
                source,
            })?;

        debug!("→ {} {}", target, command);
        Ok(())
    }

    /// [`Self::send_now`], logging instead of returning the warning
    pub async fn deliver(&self, command: &OutgoingCommand) -> bool {
        match self.send_now(command).await {
            Ok(()) => true,
            Err(warning) => {
                warn!("⚠️  {}", warning);
                false
            }
        }
    }

    pub async fn shutdown(&self) {
        if let Err(e) = self.transport.shutdown().await {
            warn!("Transport '{}' shutdown failed: {}", self.transport.name(), e);
        }
    }
}

/// Sends commands now or later, never blocking the caller on a delay
#[derive(Clone)]
pub struct Dispatcher {
    outbox: Arc<Outbox>,
    scheduler: SchedulerHandle,
}

impl Dispatcher {
    /// Create the outbox and spawn its scheduler
    pub fn spawn(transport: Arc<dyn Transport>) -> Self {
        let outbox = Arc::new(Outbox::new(transport));
        let scheduler = Scheduler::spawn(outbox.clone());
        Self { outbox, scheduler }
    }

    /// Send a command. A pending delay is handed to the scheduler, which
    /// delivers the (now undelayed) copy when it is due.
    pub async fn send(&self, mut command: OutgoingCommand) -> bool {
        match command.take_delay() {
            Some(delay) => self.scheduler.schedule(command, delay),
            None => self.outbox.deliver(&command).await,
        }
    }

    pub fn outbox(&self) -> &Arc<Outbox> {
        &self.outbox
    }

    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }
}
