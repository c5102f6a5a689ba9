//! UDP transport - one unconnected socket for every endpoint

use crate::drivers::Transport;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::UdpSocket;
use tracing::{info, trace};

pub struct UdpTransport {
    socket: UdpSocket,
    sent: AtomicU64,
}

impl UdpTransport {
    /// Bind an ephemeral local port with broadcast enabled, so endpoints may
    /// use broadcast addresses such as `192.168.1.255`
    pub async fn bind() -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .context("Failed to bind outbound UDP socket")?;
        socket
            .set_broadcast(true)
            .context("Failed to enable broadcast on outbound UDP socket")?;

        info!(
            "📡 Outbound UDP socket ready on {}",
            socket.local_addr().context("Outbound socket has no local address")?
        );

        Ok(Self {
            socket,
            sent: AtomicU64::new(0),
        })
    }

    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn name(&self) -> &str {
        "udp"
    }

    async fn send(&self, target: &str, packet: &[u8]) -> Result<()> {
        let written = self
            .socket
            .send_to(packet, target)
            .await
            .with_context(|| format!("UDP send to {} failed", target))?;

        self.sent.fetch_add(1, Ordering::Relaxed);
        trace!("UDP → {} ({} bytes)", target, written);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        info!("🛑 UDP transport shutting down ({} packets sent)", self.sent_count());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosc::{OscMessage, OscPacket, OscType};

    #[tokio::test]
    async fn test_send_reaches_local_socket() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = receiver.local_addr().unwrap().to_string();

        let transport = UdpTransport::bind().await.unwrap();
        let packet = rosc::encoder::encode(&OscPacket::Message(OscMessage {
            addr: "/qlc/front".to_string(),
            args: vec![OscType::Float(1.0)],
        }))
        .unwrap();
        transport.send(&target, &packet).await.unwrap();

        let mut buf = [0u8; 1024];
        let (len, _) = receiver.recv_from(&mut buf).await.unwrap();
        let (_, decoded) = rosc::decoder::decode_udp(&buf[..len]).unwrap();
        match decoded {
            OscPacket::Message(msg) => {
                assert_eq!(msg.addr, "/qlc/front");
                assert_eq!(msg.args, vec![OscType::Float(1.0)]);
            }
            other => panic!("unexpected packet {:?}", other),
        }
        assert_eq!(transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_unresolvable_target_is_an_error() {
        let transport = UdpTransport::bind().await.unwrap();
        assert!(transport.send("not a host", &[0u8; 4]).await.is_err());
        assert_eq!(transport.sent_count(), 0);
    }
}
