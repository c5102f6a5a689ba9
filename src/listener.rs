//! Inbound OSC listener
//!
//! One UDP socket at a time. Restarting on a new port binds the new socket
//! first and only then retires the old one, so a failed bind never leaves the
//! router deaf.

use crate::endpoints::EndpointRegistry;
use crate::error::BindError;
use crate::router::{InboundMessage, RouterHandle};
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

struct ActiveListener {
    port: u16,
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

pub struct ListenerManager {
    router: RouterHandle,
    active: Option<ActiveListener>,
}

impl ListenerManager {
    pub fn new(router: RouterHandle) -> Self {
        Self {
            router,
            active: None,
        }
    }

    /// Start listening on `port`, replacing any current listener.
    ///
    /// Refuses ports that an endpoint sends to, since everything sent there
    /// would come straight back as input. On any failure the current listener
    /// keeps running.
    pub async fn start(
        &mut self,
        port: u16,
        endpoints: &EndpointRegistry,
    ) -> Result<SocketAddr, BindError> {
        if let Some(endpoint) = endpoints.find_by_port(port) {
            let err = BindError::CollidesWithEndpoint {
                port,
                prefix: endpoint.prefix.clone(),
            };
            error!("❌ {}", err);
            return Err(err);
        }

        if let Some(active) = &self.active {
            if port != 0 && active.port == port {
                debug!("Already listening on port {}", port);
                return Ok(active.local_addr);
            }
        }

        let socket = match UdpSocket::bind(("0.0.0.0", port)).await {
            Ok(socket) => socket,
            Err(source) => {
                let err = BindError::PortInUse { port, source };
                error!("❌ {}", err);
                return Err(err);
            }
        };
        let local_addr = socket
            .local_addr()
            .map_err(|source| BindError::PortInUse { port, source })?;

        self.stop_current().await;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(listen(socket, self.router.clone(), shutdown_rx));
        self.active = Some(ActiveListener {
            port: local_addr.port(),
            local_addr,
            shutdown: shutdown_tx,
            task,
        });
        self.router.set_listening(true);

        info!("👂 Listening for OSC on {}", local_addr);
        Ok(local_addr)
    }

    /// Stop listening. Delayed commands already scheduled still go out.
    pub async fn stop(&mut self) -> bool {
        let stopped = self.stop_current().await;
        if stopped {
            self.router.set_listening(false);
            info!("🔇 Stopped listening");
        }
        stopped
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.active.as_ref().map(|a| a.local_addr)
    }

    pub fn is_listening(&self) -> bool {
        self.active.is_some()
    }

    async fn stop_current(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        let _ = active.shutdown.send(());
        if let Err(e) = active.task.await {
            warn!("Listener task on port {} ended abnormally: {}", active.port, e);
        }
        true
    }
}

async fn listen(socket: UdpSocket, router: RouterHandle, mut shutdown: oneshot::Receiver<()>) {
    let mut buf = vec![0u8; rosc::decoder::MTU];

    loop {
        tokio::select! {
            _ = &mut shutdown => break,

            received = socket.recv_from(&mut buf) => match received {
                Ok((len, from)) => match rosc::decoder::decode_udp(&buf[..len]) {
                    Ok((_, packet)) => {
                        for message in InboundMessage::from_packet(packet) {
                            trace!("← {} {}", from, message);
                            router.trigger(message);
                        }
                    }
                    Err(e) => warn!("⚠️  Undecodable packet from {}: {:?}", from, e),
                },
                // e.g. ICMP port-unreachable reported on the next receive
                Err(e) => debug!("UDP receive error: {}", e),
            },
        }
    }

    debug!("Listener task exiting");
}
