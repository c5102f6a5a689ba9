//! Outbound endpoints keyed by address prefix

use crate::value::ValueType;
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Prefix reserved for scene activation messages, routed to the reply endpoint
pub const SCENE_PREFIX: &str = "scene";

/// One outbound UDP destination bound to a prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub prefix: String,
    pub host: String,
    pub port: u16,
    pub value_type: ValueType,
}

impl Endpoint {
    pub fn new(prefix: impl Into<String>, host: impl Into<String>, port: u16, value_type: ValueType) -> Self {
        Self {
            prefix: prefix.into(),
            host: host.into(),
            port,
            value_type,
        }
    }

    /// Build the reply endpoint from a `host:port` string
    pub fn reply(target: &str) -> Result<Self> {
        let (host, port) = target
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| anyhow!("reply destination '{}' must be host:port", target))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(anyhow!("reply destination '{}' has no host", target));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| anyhow!("reply destination '{}' has an invalid port", target))?;

        Ok(Self::new(SCENE_PREFIX, host, port, ValueType::Int))
    }

    /// `host:port` form accepted by the UDP transport
    pub fn target(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{} → {} ({})", self.prefix, self.target(), self.value_type)
    }
}

/// Endpoints of one loaded configuration, in declaration order
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    endpoints: HashMap<String, Endpoint>,
    order: Vec<String>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint, returning the one it replaced (same prefix)
    pub fn insert(&mut self, endpoint: Endpoint) -> Option<Endpoint> {
        let prefix = endpoint.prefix.clone();
        let previous = self.endpoints.insert(prefix.clone(), endpoint);
        if previous.is_none() {
            self.order.push(prefix);
        }
        previous
    }

    pub fn get(&self, prefix: &str) -> Option<&Endpoint> {
        self.endpoints.get(prefix)
    }

    /// Declared value type for a prefix, if an endpoint exists
    pub fn hint(&self, prefix: &str) -> Option<ValueType> {
        self.endpoints.get(prefix).map(|e| e.value_type)
    }

    /// First endpoint sending to the given port (self-collision guard)
    pub fn find_by_port(&self, port: u16) -> Option<&Endpoint> {
        self.iter().find(|e| e.port == port)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.order.iter().filter_map(|p| self.endpoints.get(p))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
