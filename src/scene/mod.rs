//! Compiled scenes
//!
//! A [`SceneTable`] is built wholesale from a [`SceneDocument`] on every
//! (re)load and never mutated afterwards. The router swaps whole tables.

mod command;
mod compiler;

pub use command::{is_message_text, parse_delay, prefix_of, OutgoingCommand};
pub use compiler::{compile, CommandCompiler};

use crate::config::{SceneDocument, DEFAULT_LISTEN_PORT};
use crate::endpoints::{Endpoint, EndpointRegistry};
use crate::error::{CompileWarning, ConfigError};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// A keyed bundle of commands activated as a unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scene {
    pub key: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub midi: Option<u8>,
    pub commands: Vec<OutgoingCommand>,
}

/// Scenes by key, in declaration order, plus the derived MIDI map
#[derive(Debug, Clone, Default)]
pub struct SceneTable {
    scenes: HashMap<String, Scene>,
    order: Vec<String>,
    midi_map: BTreeMap<u8, String>,
}

impl SceneTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scene.
    ///
    /// A repeated key replaces the earlier scene but keeps its position. A
    /// repeated MIDI number points at the later scene.
    pub fn insert(&mut self, scene: Scene) -> Option<Scene> {
        if let Some(number) = scene.midi {
            self.midi_map.insert(number, scene.key.clone());
        }

        let key = scene.key.clone();
        let previous = self.scenes.insert(key.clone(), scene);
        if previous.is_none() {
            self.order.push(key);
        }
        previous
    }

    pub fn get(&self, key: &str) -> Option<&Scene> {
        self.scenes.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.scenes.contains_key(key)
    }

    /// Scene keys in declaration order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scene> {
        self.order.iter().filter_map(|k| self.scenes.get(k))
    }

    /// Scene key registered for a MIDI number
    pub fn key_for_midi(&self, number: u8) -> Option<&str> {
        self.midi_map.get(&number).map(String::as_str)
    }

    pub fn midi_map(&self) -> &BTreeMap<u8, String> {
        &self.midi_map
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// MIDI number addressed by a `/midi-scene/<fraction>` trigger.
///
/// `round(fraction * 127)` with ties to even. Kept separate from
/// [`midi_fraction`]: the two are not inverses for every number.
pub fn midi_number(fraction: f64) -> Option<u8> {
    if !fraction.is_finite() {
        return None;
    }
    let number = (fraction * 127.0).round_ties_even();
    (0.0..=127.0).contains(&number).then_some(number as u8)
}

/// Fraction a MIDI number is announced under: `round(number / 127, 2)`
pub fn midi_fraction(number: u8) -> f64 {
    (f64::from(number) / 127.0 * 100.0).round_ties_even() / 100.0
}

/// Trigger address announced for a MIDI number, e.g. `/midi-scene/0.5`
pub fn midi_trigger_address(number: u8) -> String {
    format!("/midi-scene/{:?}", midi_fraction(number))
}

/// Result of one successful (re)load
#[derive(Debug, Clone, Default)]
pub struct CompiledConfig {
    pub endpoints: EndpointRegistry,
    pub scenes: SceneTable,
    /// Reply endpoint from the `server` section, if any
    pub reply: Option<Endpoint>,
    pub listen_port: Option<u16>,
    pub warnings: Vec<CompileWarning>,
}

impl CompiledConfig {
    /// Port to listen on: an explicit override, then the `server` section,
    /// then [`DEFAULT_LISTEN_PORT`]
    pub fn listen_port_or(&self, override_port: Option<u16>) -> u16 {
        override_port
            .or(self.listen_port)
            .unwrap_or(DEFAULT_LISTEN_PORT)
    }
}

/// Read, validate and compile a scene file
pub async fn load(path: &str) -> Result<CompiledConfig, ConfigError> {
    let document = SceneDocument::load(path).await?;
    compile(&document)
}

/// Validate and compile a scene document held in memory
pub fn load_from_bytes(bytes: &[u8]) -> Result<CompiledConfig, ConfigError> {
    let document = SceneDocument::from_bytes(bytes)?;
    compile(&document)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(key: &str, midi: Option<u8>) -> Scene {
        Scene {
            key: key.to_string(),
            display_name: key.to_uppercase(),
            midi,
            commands: Vec::new(),
        }
    }

    #[test]
    fn test_listen_port_precedence() {
        let mut config = CompiledConfig::default();
        assert_eq!(config.listen_port_or(None), DEFAULT_LISTEN_PORT);
        config.listen_port = Some(9100);
        assert_eq!(config.listen_port_or(None), 9100);
        assert_eq!(config.listen_port_or(Some(9200)), 9200);
    }

    #[test]
    fn test_duplicate_key_keeps_position() {
        let mut table = SceneTable::new();
        table.insert(scene("a", None));
        table.insert(scene("b", None));
        let mut replacement = scene("a", None);
        replacement.display_name = "Second A".into();
        assert!(table.insert(replacement).is_some());

        assert_eq!(table.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(table.get("a").unwrap().display_name, "Second A");
    }

    #[test]
    fn test_midi_map_always_resolves() {
        let mut table = SceneTable::new();
        table.insert(scene("a", Some(1)));
        table.insert(scene("b", Some(1)));
        table.insert(scene("a", None));

        assert_eq!(table.key_for_midi(1), Some("b"));
        for key in table.midi_map().values() {
            assert!(table.contains(key));
        }
    }

    #[test]
    fn test_midi_number_rounding() {
        assert_eq!(midi_number(0.5), Some(64));
        assert_eq!(midi_number(0.504), Some(64));
        assert_eq!(midi_number(0.0), Some(0));
        assert_eq!(midi_number(1.0), Some(127));
        assert_eq!(midi_number(0.02), Some(3));
        assert_eq!(midi_number(1.5), None);
        assert_eq!(midi_number(-0.5), None);
        assert_eq!(midi_number(f64::NAN), None);
    }

    #[test]
    fn test_midi_trigger_address() {
        assert_eq!(midi_trigger_address(64), "/midi-scene/0.5");
        assert_eq!(midi_trigger_address(127), "/midi-scene/1.0");
        assert_eq!(midi_trigger_address(0), "/midi-scene/0.0");
        assert_eq!(midi_trigger_address(2), "/midi-scene/0.02");
        assert_eq!(midi_trigger_address(65), "/midi-scene/0.51");
    }

    #[test]
    fn test_announced_address_does_not_always_round_trip() {
        // 63 and 64 share /midi-scene/0.5, which resolves to 64
        assert_eq!(midi_fraction(63), 0.5);
        assert_eq!(midi_number(midi_fraction(63)), Some(64));
        // 2 is announced as 0.02, which resolves to 3
        assert_eq!(midi_number(midi_fraction(2)), Some(3));
        // 12 is announced as 0.09, which resolves to 11
        assert_eq!(midi_number(midi_fraction(12)), Some(11));
        // most numbers survive
        assert_eq!(midi_number(midi_fraction(1)), Some(1));
        assert_eq!(midi_number(midi_fraction(65)), Some(65));
        assert_eq!(midi_number(midi_fraction(127)), Some(127));
    }
}
