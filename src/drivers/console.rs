//! Console transport - logs every packet instead of sending it
//!
//! Used for `--dry-run` and as the recording transport in tests.

use crate::drivers::Transport;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use rosc::{OscMessage, OscPacket};
use tracing::{debug, info};

/// One packet handed to the console transport
#[derive(Debug, Clone)]
pub struct SentPacket {
    pub at: DateTime<Local>,
    pub target: String,
    pub message: OscMessage,
}

impl SentPacket {
    /// `address arg arg` rendering for assertions and logs
    pub fn text(&self) -> String {
        let mut text = self.message.addr.clone();
        for arg in &self.message.args {
            text.push(' ');
            text.push_str(&crate::value::TypedValue::from_osc(arg).map_or_else(
                || format!("{:?}", arg),
                |v| v.to_string(),
            ));
        }
        text
    }
}

#[derive(Default)]
pub struct ConsoleTransport {
    history: Mutex<Vec<SentPacket>>,
    quiet: bool,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record without logging each packet at info
    pub fn quiet() -> Self {
        Self {
            history: Mutex::new(Vec::new()),
            quiet: true,
        }
    }

    /// Everything sent so far, oldest first
    pub fn history(&self) -> Vec<SentPacket> {
        self.history.lock().clone()
    }

    /// Rendered history as `target address args...` lines
    pub fn lines(&self) -> Vec<String> {
        self.history
            .lock()
            .iter()
            .map(|p| format!("{} {}", p.target, p.text()))
            .collect()
    }

    /// Drain the history, returning what was recorded
    pub fn take(&self) -> Vec<SentPacket> {
        std::mem::take(&mut *self.history.lock())
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    fn name(&self) -> &str {
        "console"
    }

    async fn send(&self, target: &str, packet: &[u8]) -> Result<()> {
        let (_, decoded) = rosc::decoder::decode_udp(packet)
            .map_err(|e| anyhow::anyhow!("{:?}", e))
            .context("Console transport received an undecodable packet")?;

        let messages = flatten(decoded);
        let mut history = self.history.lock();
        for message in messages {
            let sent = SentPacket {
                at: Local::now(),
                target: target.to_string(),
                message,
            };

            if self.quiet {
                debug!("[dry-run] {} → {}", sent.text(), target);
            } else {
                info!(
                    "🎮 [{}] {} → {} [#{}]",
                    sent.at.format("%H:%M:%S%.3f"),
                    sent.text(),
                    target,
                    history.len() + 1
                );
            }
            history.push(sent);
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        info!(
            "🛑 Console transport shutting down ({} messages recorded)",
            self.history.lock().len()
        );
        Ok(())
    }
}

fn flatten(packet: OscPacket) -> Vec<OscMessage> {
    match packet {
        OscPacket::Message(msg) => vec![msg],
        OscPacket::Bundle(bundle) => bundle.content.into_iter().flat_map(flatten).collect(),
    }
}
