//! Outgoing OSC commands and the message-text form used in scene files

use crate::endpoints::SCENE_PREFIX;
use crate::value::{coerce, coerce_activation, TypedValue, ValueType};
use rosc::OscMessage;
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// One message a scene sends, in emission order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingCommand {
    /// First path segment, selects the endpoint
    pub prefix: String,
    pub address: String,
    pub arguments: Vec<TypedValue>,
    #[serde(rename = "delay_secs", serialize_with = "serialize_secs")]
    delay: Duration,
}

impl OutgoingCommand {
    pub fn new(address: impl Into<String>, arguments: Vec<TypedValue>) -> Self {
        let address = address.into();
        Self {
            prefix: prefix_of(&address).to_string(),
            address,
            arguments,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Parse message text such as `/qlc/lights/front 255`.
    ///
    /// Arguments are coerced with the cascade and then re-typed with the
    /// endpoint hint returned by `hint`. The `scene` prefix always yields
    /// integers. Returns the reason on failure.
    pub fn parse<F>(text: &str, hint: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<ValueType>,
    {
        if !is_message_text(text) {
            return Err(format!("'{}' is not an OSC command (expected \"/prefix/path arg\")", text));
        }

        let mut tokens = text.split_whitespace();
        let address = tokens.next().unwrap_or_default();
        let prefix = prefix_of(address);

        let arguments = if prefix == SCENE_PREFIX {
            tokens
                .map(|t| {
                    coerce_activation(t)
                        .map(TypedValue::Int)
                        .ok_or_else(|| format!("scene activation argument '{}' is not numeric", t))
                })
                .collect::<Result<Vec<_>, _>>()?
        } else {
            let hint = hint(prefix);
            tokens
                .map(|t| {
                    let value = coerce(t);
                    match hint {
                        Some(value_type) => value_type.apply(value),
                        None => value,
                    }
                })
                .collect()
        };

        Ok(Self::new(address, arguments))
    }

    /// `/scene/<key> 1` or `/scene/<key> 0`
    pub fn activation(key: &str, on: bool) -> Self {
        Self::new(format!("/{}/{}", SCENE_PREFIX, key), vec![TypedValue::Int(on as i32)])
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Hand the delay over to the scheduler.
    ///
    /// Returns the delay and leaves the command with none, so the scheduled
    /// copy is sent on its next pass instead of being scheduled again.
    pub fn take_delay(&mut self) -> Option<Duration> {
        if self.delay.is_zero() {
            return None;
        }
        Some(std::mem::replace(&mut self.delay, Duration::ZERO))
    }

    pub fn to_osc(&self) -> OscMessage {
        OscMessage {
            addr: self.address.clone(),
            args: self.arguments.iter().map(TypedValue::to_osc).collect(),
        }
    }
}

impl fmt::Display for OutgoingCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)?;
        for arg in &self.arguments {
            write!(f, " {}", arg)?;
        }
        if !self.delay.is_zero() {
            write!(f, " (after {:?})", self.delay)?;
        }
        Ok(())
    }
}

/// First path segment of an address (`/qlc/a/b` → `qlc`)
pub fn prefix_of(address: &str) -> &str {
    address.split('/').nth(1).unwrap_or_default()
}

/// Address starting with `/`, with a prefix and at least one more segment,
/// followed by at least one argument
pub fn is_message_text(text: &str) -> bool {
    let text = text.trim();
    let mut tokens = text.split_whitespace();
    let Some(address) = tokens.next() else {
        return false;
    };

    address.starts_with('/')
        && address.split('/').count() > 2
        && !prefix_of(address).is_empty()
        && tokens.next().is_some()
}

/// Longest delay a scene may ask for
pub const MAX_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Parse a delay token: `2s`, `2`, `0.5s`. Anything above [`MAX_DELAY`] is
/// rejected.
pub fn parse_delay(token: &str) -> Option<Duration> {
    let secs: f64 = token.trim().trim_end_matches('s').parse().ok()?;
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|delay| *delay <= MAX_DELAY)
}

fn serialize_secs<S: Serializer>(delay: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(delay.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_hints(_: &str) -> Option<ValueType> {
        None
    }

    #[test]
    fn test_message_text_shape() {
        assert!(is_message_text("/qlc/lights 1"));
        assert!(is_message_text("/atem/me/1/program 3 2"));
        assert!(!is_message_text("/qlc 1"));
        assert!(!is_message_text("/qlc/lights"));
        assert!(!is_message_text("qlc/lights 1"));
        assert!(!is_message_text("//lights 1"));
        assert!(!is_message_text(""));
    }

    #[test]
    fn test_parse_applies_hint() {
        let cmd = OutgoingCommand::parse("/qlc/dimmer 1", |p| {
            (p == "qlc").then_some(ValueType::Float)
        })
        .unwrap();
        assert_eq!(cmd.prefix, "qlc");
        assert_eq!(cmd.address, "/qlc/dimmer");
        assert_eq!(cmd.arguments, vec![TypedValue::Float(1.0)]);
    }

    #[test]
    fn test_parse_without_endpoint_keeps_cascade() {
        let cmd = OutgoingCommand::parse("/obs/scene Main 0.5 true", no_hints).unwrap();
        assert_eq!(
            cmd.arguments,
            vec![
                TypedValue::Str("Main".into()),
                TypedValue::Float(0.5),
                TypedValue::Bool(true)
            ]
        );
    }

    #[test]
    fn test_scene_prefix_is_always_int() {
        let cmd = OutgoingCommand::parse("/scene/intro 1.0", |_| Some(ValueType::Float)).unwrap();
        assert_eq!(cmd.arguments, vec![TypedValue::Int(1)]);
        assert!(OutgoingCommand::parse("/scene/intro on", no_hints).is_err());
    }

    #[test]
    fn test_take_delay_is_consumed_once() {
        let mut cmd = OutgoingCommand::activation("a", true).with_delay(Duration::from_secs(2));
        assert_eq!(cmd.take_delay(), Some(Duration::from_secs(2)));
        assert_eq!(cmd.take_delay(), None);
        assert!(cmd.delay().is_zero());
    }

    #[test]
    fn test_parse_delay() {
        assert_eq!(parse_delay("2s"), Some(Duration::from_secs(2)));
        assert_eq!(parse_delay("0.5s"), Some(Duration::from_millis(500)));
        assert_eq!(parse_delay("3"), Some(Duration::from_secs(3)));
        assert_eq!(parse_delay("-1s"), None);
        assert_eq!(parse_delay("soon"), None);
        assert_eq!(parse_delay("86400s"), Some(MAX_DELAY));
        assert_eq!(parse_delay("86401s"), None);
        assert_eq!(parse_delay("1e19s"), None);
        assert_eq!(parse_delay("1e20s"), None);
        assert_eq!(parse_delay("infs"), None);
    }

    #[test]
    fn test_display() {
        let cmd = OutgoingCommand::activation("intro", false);
        assert_eq!(cmd.to_string(), "/scene/intro 0");
        let osc = cmd.to_osc();
        assert_eq!(osc.addr, "/scene/intro");
        assert_eq!(osc.args, vec![rosc::OscType::Int(0)]);
    }
}
