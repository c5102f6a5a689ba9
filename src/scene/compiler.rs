//! Scene compilation: YAML scene fields → ordered command lists
//!
//! Nothing in here is fatal past document validation. A field that cannot be
//! resolved is reported as a [`CompileWarning`] and skipped, so one typo costs
//! one command and not the whole show.

use super::command::{is_message_text, parse_delay, OutgoingCommand};
use super::{CompiledConfig, Scene, SceneTable};
use crate::config::{describe, scene_key, EndpointConfig, SceneDocument, RESERVED_SCENE_FIELDS};
use crate::endpoints::{Endpoint, EndpointRegistry, SCENE_PREFIX};
use crate::error::{CompileWarning, ConfigError};
use crate::value::ValueType;
use serde_yaml::{Mapping, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Selector that never picks an `in` variant
const NONE_SELECTOR: &str = "none";

/// Placeholder replaced by the scaled value in integer templates
const VALUE_PLACEHOLDER: &str = "x";

/// Compile a validated document into endpoints and scenes.
///
/// Endpoints are built first so their value types are known to every command.
pub fn compile(document: &SceneDocument) -> Result<CompiledConfig, ConfigError> {
    let mut warnings = Vec::new();

    let endpoints = compile_endpoints(&document.endpoints, &mut warnings);

    let reply = document.server.reply.as_deref().and_then(|target| {
        Endpoint::reply(target)
            .map_err(|e| {
                warnings.push(CompileWarning {
                    context: "server".to_string(),
                    key: "reply".to_string(),
                    value: format!("'{}'", target),
                    mapping: "-".to_string(),
                    reason: e.to_string(),
                })
            })
            .ok()
    });

    let mut scenes = SceneTable::new();
    for (index, entry) in document.scenes.iter().enumerate() {
        let key = scene_key(entry).ok_or(ConfigError::MissingSceneKey { index })?;

        let mut compiler = CommandCompiler::new(&key, &endpoints);
        let scene = compiler.compile_scene(entry, &document.map);
        warnings.append(&mut compiler.warnings);

        debug!(
            "Compiled scene '{}' ({} commands)",
            scene.key,
            scene.commands.len()
        );

        if scenes.insert(scene).is_some() {
            warnings.push(CompileWarning {
                context: format!("scene '{}'", key),
                key: "key".to_string(),
                value: format!("'{}'", key),
                mapping: "-".to_string(),
                reason: "duplicate scene key, the later declaration replaces the earlier one"
                    .to_string(),
            });
        }
    }

    for warning in &warnings {
        warn!("⚠️  {}", warning);
    }

    info!(
        "Compiled {} scene(s) for {} endpoint(s) ({} warning(s))",
        scenes.len(),
        endpoints.len(),
        warnings.len()
    );

    Ok(CompiledConfig {
        endpoints,
        scenes,
        reply,
        listen_port: document.server.listen_port,
        warnings,
    })
}

fn compile_endpoints(entries: &[Value], warnings: &mut Vec<CompileWarning>) -> EndpointRegistry {
    let mut registry = EndpointRegistry::new();

    for (index, entry) in entries.iter().enumerate() {
        let mut reject = |reason: String| {
            warnings.push(CompileWarning {
                context: "endpoints".to_string(),
                key: format!("#{}", index),
                value: describe(entry),
                mapping: "-".to_string(),
                reason,
            })
        };

        let config: EndpointConfig = match serde_yaml::from_value(entry.clone()) {
            Ok(config) => config,
            Err(e) => {
                reject(e.to_string());
                continue;
            }
        };

        let prefix = config.prefix.trim().trim_matches('/').to_string();
        if prefix.is_empty() || prefix.contains('/') {
            reject(format!("prefix '{}' must be a single path segment", config.prefix));
            continue;
        }
        if prefix == SCENE_PREFIX {
            reject("prefix 'scene' is reserved for the reply endpoint".to_string());
            continue;
        }

        let value_type = match ValueType::parse(&config.value_type) {
            Some(value_type) => value_type,
            None => {
                reject(format!(
                    "unknown valueType '{}', sending as int",
                    config.value_type
                ));
                ValueType::Int
            }
        };

        let endpoint = Endpoint::new(prefix, config.ip, config.port, value_type);
        info!("Sending commands that start with {}", endpoint);
        if let Some(previous) = registry.insert(endpoint) {
            reject(format!(
                "duplicate prefix '/{}', replacing {}",
                previous.prefix,
                previous.target()
            ));
        }
    }

    registry
}

/// Resolves one scene's fields against the `map` section
pub struct CommandCompiler<'a> {
    scene: &'a str,
    endpoints: &'a EndpointRegistry,
    warnings: Vec<CompileWarning>,
}

impl<'a> CommandCompiler<'a> {
    pub fn new(scene: &'a str, endpoints: &'a EndpointRegistry) -> Self {
        Self {
            scene,
            endpoints,
            warnings: Vec::new(),
        }
    }

    /// Build a [`Scene`] from one entry of the `scenes` list
    pub fn compile_scene(&mut self, entry: &Mapping, map: &Mapping) -> Scene {
        let display_name = match entry.get("name") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => self.scene.to_string(),
        };

        let midi = match entry.get("midi") {
            None => None,
            Some(value) => match value.as_u64().filter(|n| *n <= 127) {
                Some(n) => Some(n as u8),
                None => {
                    self.warn("midi", value, &Value::Null, "MIDI number must be an integer in 0..=127");
                    None
                }
            },
        };

        let mut commands = Vec::new();
        for (field, value) in entry {
            let Some(field) = key_text(field) else {
                self.warn("?", field, &Value::Null, "field names must be strings");
                continue;
            };
            if RESERVED_SCENE_FIELDS.contains(&field.as_str()) {
                continue;
            }

            match map.get(field.as_str()) {
                Some(node) => self.compile_field(&field, value, node, &mut commands),
                None => self.warn(&field, value, &Value::Null, "no mapping defined for this field"),
            }
        }

        Scene {
            key: self.scene.to_string(),
            display_name,
            midi,
            commands,
        }
    }

    /// Resolve one scene field against its mapping node, appending commands.
    ///
    /// Recursive over nested mappings; lists select `in`/`out` variants,
    /// strings select a single message and integers fill a template.
    pub fn compile_field(
        &mut self,
        key: &str,
        value: &Value,
        node: &Value,
        commands: &mut Vec<OutgoingCommand>,
    ) {
        match value {
            Value::Mapping(children) => self.compile_nested(key, children, value, node, commands),
            Value::Sequence(items) => self.compile_selection(key, items, value, node, commands),
            Value::String(token) => self.compile_selector(key, token, value, node, commands),
            Value::Number(n) => match n.as_i64() {
                Some(level) if (0..=127).contains(&level) => {
                    self.compile_level(key, level as u8, value, node, commands)
                }
                _ => self.warn(key, value, node, "numeric values must be integers in 0..=127"),
            },
            _ => self.warn(key, value, node, "unsupported value"),
        }
    }

    fn compile_nested(
        &mut self,
        key: &str,
        children: &Mapping,
        value: &Value,
        node: &Value,
        commands: &mut Vec<OutgoingCommand>,
    ) {
        let Value::Mapping(node_children) = node else {
            self.warn(key, value, node, "nested value needs a nested mapping");
            return;
        };

        for (child_key, child_value) in children {
            let name = key_text(child_key).unwrap_or_else(|| describe(child_key));
            match node_children.get(child_key) {
                Some(child_node) => self.compile_field(&name, child_value, child_node, commands),
                None => self.warn(&name, child_value, node, "no mapping defined for this key"),
            }
        }
    }

    fn compile_selection(
        &mut self,
        key: &str,
        items: &[Value],
        value: &Value,
        node: &Value,
        commands: &mut Vec<OutgoingCommand>,
    ) {
        let Value::Mapping(options) = node else {
            self.warn(key, value, node, "list value needs a mapping of in/out options");
            return;
        };

        let mut delay = Duration::ZERO;
        let mut selectors = Vec::new();
        for item in items {
            let Some(text) = key_text(item) else {
                self.warn(key, value, node, "list entries must be strings or numbers");
                return;
            };

            if text.contains("delay") {
                match text.split_whitespace().nth(1).and_then(parse_delay) {
                    Some(d) => delay = d,
                    None => {
                        self.warn(key, value, node, "malformed delay, expected \"delay <N>s\" of at most 24h");
                        return;
                    }
                }
            } else {
                selectors.push(text);
            }
        }

        for selector in &selectors {
            let known = selector == NONE_SELECTOR
                || options.keys().any(|k| key_text(k).as_deref() == Some(selector.as_str()));
            if !known {
                self.warn(key, value, node, &format!("unknown option '{}' ignored", selector));
            }
        }

        for (option_key, option) in options {
            let name = key_text(option_key).unwrap_or_default();
            let selected = name != NONE_SELECTOR && selectors.contains(&name);
            let variant = if selected { "in" } else { "out" };

            match option.get(variant).and_then(Value::as_str) {
                Some(text) => self.push_message(key, value, node, text, delay, commands),
                None => self.warn(
                    key,
                    value,
                    node,
                    &format!("option '{}' has no '{}' command", name, variant),
                ),
            }
        }
    }

    fn compile_selector(
        &mut self,
        key: &str,
        token: &str,
        value: &Value,
        node: &Value,
        commands: &mut Vec<OutgoingCommand>,
    ) {
        let mut parts = token.split_whitespace();
        let Some(selector) = parts.next() else {
            self.warn(key, value, node, "empty selector");
            return;
        };

        let delay = match parts.next() {
            None => Duration::ZERO,
            Some(d) => match parse_delay(d) {
                Some(delay) => delay,
                None => {
                    self.warn(key, value, node, "malformed delay, expected \"<selector> <N>s\" of at most 24h");
                    return;
                }
            },
        };

        match node.get(selector).and_then(Value::as_str) {
            Some(text) => self.push_message(key, value, node, text, delay, commands),
            None => self.warn(key, value, node, &format!("no command for '{}'", selector)),
        }
    }

    fn compile_level(
        &mut self,
        key: &str,
        level: u8,
        value: &Value,
        node: &Value,
        commands: &mut Vec<OutgoingCommand>,
    ) {
        let Some(template) = node.as_str() else {
            self.warn(key, value, node, "numeric value needs a template string with 'x'");
            return;
        };

        let scaled = format!("{:?}", f64::from(level) / 127.0);
        let mut tokens = template.split_whitespace();
        let address = tokens.next().unwrap_or_default();
        let text = std::iter::once(address)
            .chain(tokens.map(|t| if t == VALUE_PLACEHOLDER { scaled.as_str() } else { t }))
            .collect::<Vec<_>>()
            .join(" ");

        self.push_message(key, value, node, &text, Duration::ZERO, commands);
    }

    fn push_message(
        &mut self,
        key: &str,
        value: &Value,
        node: &Value,
        text: &str,
        delay: Duration,
        commands: &mut Vec<OutgoingCommand>,
    ) {
        if !is_message_text(text) {
            self.warn(key, value, node, &format!("'{}' is not an OSC command", text));
            return;
        }

        let endpoints = self.endpoints;
        match OutgoingCommand::parse(text, |prefix| endpoints.hint(prefix)) {
            Ok(command) => commands.push(command.with_delay(delay)),
            Err(reason) => self.warn(key, value, node, &reason),
        }
    }

    fn warn(&mut self, key: &str, value: &Value, node: &Value, reason: &str) {
        self.warnings.push(CompileWarning {
            context: format!("scene '{}'", self.scene),
            key: key.to_string(),
            value: describe(value),
            mapping: describe(node),
            reason: reason.to_string(),
        });
    }
}

/// Mapping keys and list selectors compare as text
fn key_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
