//! Scene configuration document
//!
//! Handles loading and structural validation of the YAML scene file. The
//! free-form `map` trees and scene entries stay as YAML values here; turning
//! them into commands is the job of [`crate::scene::compile`].

pub mod watcher;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tokio::fs;

pub use watcher::ConfigWatcher;

/// Listen port used when neither the document nor the command line sets one
pub const DEFAULT_LISTEN_PORT: u16 = 8002;

/// Scene fields with a fixed meaning; every other field is resolved against `map`
pub const RESERVED_SCENE_FIELDS: [&str; 3] = ["key", "name", "midi"];

/// Root document as written by the user
#[derive(Debug, Clone, Deserialize, Serialize)]
struct RawDocument {
    #[serde(default)]
    server: Option<ServerConfig>,
    #[serde(default)]
    endpoints: Option<Value>,
    #[serde(default)]
    map: Option<Value>,
    #[serde(default)]
    scenes: Option<Value>,
}

/// Validated scene document
#[derive(Debug, Clone)]
pub struct SceneDocument {
    pub server: ServerConfig,
    /// Raw endpoint entries, typed one by one at compile time so a single
    /// bad entry only costs a warning
    pub endpoints: Vec<Value>,
    pub map: Mapping,
    pub scenes: Vec<Mapping>,
}

/// Optional `server` section
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen_port: Option<u16>,
    /// Reply destination as `host:port`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
}

/// One entry of the `endpoints` list
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EndpointConfig {
    pub prefix: String,
    pub ip: String,
    pub port: u16,
    #[serde(rename = "valueType", default = "default_value_type")]
    pub value_type: String,
}

impl SceneDocument {
    /// Load and validate a scene document from disk
    pub async fn load(path: &str) -> Result<Self, ConfigError> {
        let contents = fs::read(path).await.map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;

        Self::from_bytes(&contents)
    }

    /// Parse and validate a scene document from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(ConfigError::MissingSection("endpoints"));
        }

        // A document holding only comments parses as null
        let raw: Option<RawDocument> = serde_yaml::from_slice(bytes)?;
        let raw = raw.ok_or(ConfigError::MissingSection("endpoints"))?;

        let document = Self::from_raw(raw)?;
        document.validate()?;
        Ok(document)
    }

    fn from_raw(raw: RawDocument) -> Result<Self, ConfigError> {
        let endpoints = match raw.endpoints {
            None | Some(Value::Null) => return Err(ConfigError::MissingSection("endpoints")),
            Some(Value::Sequence(seq)) => seq,
            Some(_) => return Err(ConfigError::NotAMapping("endpoints", "list")),
        };

        let map = match raw.map {
            None | Some(Value::Null) => return Err(ConfigError::MissingSection("map")),
            Some(Value::Mapping(m)) => m,
            Some(_) => return Err(ConfigError::NotAMapping("map", "mapping")),
        };

        let scenes = match raw.scenes {
            None | Some(Value::Null) => return Err(ConfigError::MissingSection("scenes")),
            Some(Value::Sequence(seq)) => seq,
            Some(_) => return Err(ConfigError::NotAMapping("scenes", "list")),
        };

        let scenes = scenes
            .into_iter()
            .enumerate()
            .map(|(index, scene)| match scene {
                Value::Mapping(m) => Ok(m),
                _ => Err(ConfigError::MissingSceneKey { index }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            server: raw.server.unwrap_or_default(),
            endpoints,
            map,
            scenes,
        })
    }

    /// Every scene must carry a usable `key`; everything else is checked
    /// leniently by the compiler
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, scene) in self.scenes.iter().enumerate() {
            if scene_key(scene).is_none() {
                return Err(ConfigError::MissingSceneKey { index });
            }
        }
        Ok(())
    }
}

/// Read a scene's `key` field. Numbers are accepted and stringified.
pub fn scene_key(scene: &Mapping) -> Option<String> {
    match scene.get("key")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Render a YAML value on one line for log messages
pub fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s),
        other => serde_json::to_string(other).unwrap_or_else(|_| format!("{:?}", other)),
    }
}

fn default_value_type() -> String {
    "int".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
endpoints:
  - prefix: qlc
    ip: 127.0.0.1
    port: 7700
    valueType: float
map:
  lights:
    on: /qlc/lights 1
scenes:
  - key: intro
    name: Intro
    lights: on
"#;

    #[test]
    fn test_parse_minimal_document() {
        let doc = SceneDocument::from_bytes(MINIMAL.as_bytes()).unwrap();
        assert_eq!(doc.endpoints.len(), 1);
        assert_eq!(doc.scenes.len(), 1);
        assert_eq!(scene_key(&doc.scenes[0]).as_deref(), Some("intro"));
        assert_eq!(doc.server.listen_port, None);
    }

    #[test]
    fn test_server_section() {
        let yaml = format!("server:\n  listen_port: 9100\n  reply: 10.0.0.2:9000\n{}", MINIMAL);
        let doc = SceneDocument::from_bytes(yaml.as_bytes()).unwrap();
        assert_eq!(doc.server.listen_port, Some(9100));
        assert_eq!(doc.server.reply.as_deref(), Some("10.0.0.2:9000"));
    }

    #[test]
    fn test_missing_sections_are_fatal() {
        let err = SceneDocument::from_bytes(b"map: {}\nscenes: []\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection("endpoints")));

        let err = SceneDocument::from_bytes(b"endpoints: []\nscenes: []\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection("map")));

        let err = SceneDocument::from_bytes(b"endpoints: []\nmap: {}\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection("scenes")));

        let err = SceneDocument::from_bytes(b"").unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection(_)));
    }

    #[test]
    fn test_scene_without_key_is_fatal() {
        let yaml = "endpoints: []\nmap: {}\nscenes:\n  - key: a\n  - name: No Key\n";
        let err = SceneDocument::from_bytes(yaml.as_bytes()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSceneKey { index: 1 }));
    }

    #[test]
    fn test_malformed_yaml_is_syntax_error() {
        let err = SceneDocument::from_bytes(b"endpoints: [\n").unwrap_err();
        assert!(matches!(err, ConfigError::Syntax(_)));
    }

    #[test]
    fn test_numeric_scene_key() {
        let yaml = "endpoints: []\nmap: {}\nscenes:\n  - key: 7\n";
        let doc = SceneDocument::from_bytes(yaml.as_bytes()).unwrap();
        assert_eq!(scene_key(&doc.scenes[0]).as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = SceneDocument::load("/nonexistent/scenes.yaml").await.unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
