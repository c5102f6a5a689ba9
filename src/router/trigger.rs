//! Inbound message classification

use crate::endpoints::SCENE_PREFIX;
use crate::scene::OutgoingCommand;
use crate::value::TypedValue;
use rosc::{OscMessage, OscPacket};
use std::fmt;
use tracing::trace;

/// Prefix of MIDI-style scene triggers (`/midi-scene/<fraction>`)
pub const MIDI_SCENE_PREFIX: &str = "midi-scene";

/// One message received on the listen port
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub address: String,
    pub args: Vec<TypedValue>,
}

impl InboundMessage {
    pub fn new(address: impl Into<String>, args: Vec<TypedValue>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }

    /// Convert a decoded OSC message. Arguments without a typed reading
    /// (blobs, nil, timetags) are dropped.
    pub fn from_osc(message: OscMessage) -> Self {
        let total = message.args.len();
        let args: Vec<_> = message.args.iter().filter_map(TypedValue::from_osc).collect();
        if args.len() != total {
            trace!(
                "Dropped {} untyped argument(s) from {}",
                total - args.len(),
                message.addr
            );
        }
        Self {
            address: message.addr,
            args,
        }
    }

    /// Flatten a packet into messages, bundles in order
    pub fn from_packet(packet: OscPacket) -> Vec<Self> {
        match packet {
            OscPacket::Message(message) => vec![Self::from_osc(message)],
            OscPacket::Bundle(bundle) => bundle
                .content
                .into_iter()
                .flat_map(Self::from_packet)
                .collect(),
        }
    }

    /// The trigger value is the first argument; none at all means "on"
    pub fn is_release(&self) -> bool {
        self.args.first().is_some_and(TypedValue::is_zero)
    }

    /// Same message, forwarded verbatim to the endpoint of its prefix
    pub fn to_command(&self) -> OutgoingCommand {
        OutgoingCommand::new(self.address.clone(), self.args.clone())
    }
}

impl fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// What an inbound address asks for
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// `/scene/<key>`
    Scene(String),
    /// `/midi-scene/<fraction>`
    Midi(f64),
    /// A `/scene` or `/midi-scene` address of any other shape
    Invalid,
    /// Anything else, forwarded to the endpoint of its prefix
    Passthrough,
}

pub fn classify(address: &str) -> Trigger {
    let Some(path) = address.strip_prefix('/') else {
        return Trigger::Invalid;
    };
    let segments: Vec<&str> = path.split('/').collect();

    match segments.as_slice() {
        [SCENE_PREFIX, key] if !key.is_empty() => Trigger::Scene(key.to_string()),
        [MIDI_SCENE_PREFIX, fraction] => match fraction.parse::<f64>() {
            Ok(f) if f.is_finite() => Trigger::Midi(f),
            _ => Trigger::Invalid,
        },
        [SCENE_PREFIX, ..] | [MIDI_SCENE_PREFIX, ..] => Trigger::Invalid,
        [prefix, ..] if !prefix.is_empty() => Trigger::Passthrough,
        _ => Trigger::Invalid,
    }
}
