//! Outbound transports
//!
//! A transport delivers an encoded OSC packet to a `host:port` target. The
//! dispatcher owns one `Arc<dyn Transport>` and never cares which kind it is:
//! UDP on a real show, the console transport for dry runs and tests.

use anyhow::Result;
use async_trait::async_trait;

/// Transport trait - all outbound paths implement this
///
/// Note: `send` takes `&self` so transports can be shared as `Arc<dyn Transport>`.
/// Implementations use interior mutability for any state they keep.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name for logs (e.g., "udp", "console")
    fn name(&self) -> &str;

    /// Deliver one encoded packet, fire and forget
    ///
    /// # Arguments
    /// * `target` - Destination as `host:port`
    /// * `packet` - Encoded OSC packet
    async fn send(&self, target: &str, packet: &[u8]) -> Result<()>;

    /// Release sockets and report totals
    ///
    /// Default implementation: nothing to release
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

pub mod console;
pub mod udp;

pub use console::{ConsoleTransport, SentPacket};
pub use udp::UdpTransport;
