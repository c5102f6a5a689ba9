//! Error taxonomy for scene compilation, routing and listening
//!
//! Only [`ConfigError`] and [`BindError`] abort an operation. Compile and
//! routing problems are warnings: they are logged and the single offending
//! entry or message is dropped.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Fatal to a (re)load, never to the process.
///
/// The previously compiled table stays active when a reload fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed configuration document: {0}")]
    Syntax(#[from] serde_yaml::Error),

    #[error("configuration is missing the required '{0}' section")]
    MissingSection(&'static str),

    #[error("section '{0}' must be a {1}")]
    NotAMapping(&'static str, &'static str),

    #[error("scene #{index} has no 'key'")]
    MissingSceneKey { index: usize },
}

/// Refusal to open an inbound port.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("port {port} is already in use or reserved: {source}")]
    PortInUse {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("port {port} is the outbound port of endpoint '/{prefix}', listening on it would loop messages back")]
    CollidesWithEndpoint { port: u16, prefix: String },
}

/// Non-fatal problem while routing a single inbound or outbound message.
#[derive(Debug, Error)]
pub enum RoutingWarning {
    #[error("received invalid message: {0}")]
    InvalidAddress(String),

    #[error("received undefined scene '{0}'")]
    UndefinedScene(String),

    #[error("no endpoint registered for prefix '/{prefix}' (dropping {address})")]
    UnknownPrefix { prefix: String, address: String },

    #[error("no reply endpoint configured (dropping {0})")]
    NoReplyEndpoint(String),

    #[error("no configuration loaded (dropping {0})")]
    NotLoaded(String),

    #[error("delay of {delay:?} is out of range (dropping {address})")]
    DelayOutOfRange { address: String, delay: Duration },

    #[error("failed to encode {address}: {reason}")]
    Encode { address: String, reason: String },

    #[error("failed to send {address} to {target}: {source}")]
    Transport {
        address: String,
        target: String,
        #[source]
        source: anyhow::Error,
    },
}

/// A scene entry the compiler could not turn into commands.
///
/// Carries enough context to find the offending YAML: the field key, the
/// value found in the scene and the mapping node it was resolved against.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileWarning {
    /// Where the entry lives, e.g. `scene 'intro'` or `endpoints`
    pub context: String,
    pub key: String,
    pub value: String,
    pub mapping: String,
    pub reason: String,
}

impl fmt::Display for CompileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "could not process item in {} with key '{}', value: {}, and map value: {} ({})",
            self.context, self.key, self.value, self.mapping, self.reason
        )
    }
}
