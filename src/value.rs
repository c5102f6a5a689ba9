//! Typed OSC argument values and the token coercion cascade

use rosc::OscType;
use serde::Serialize;
use std::fmt;

/// A single OSC argument as produced by [`coerce`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TypedValue {
    Int(i32),
    Float(f32),
    Bool(bool),
    Str(String),
}

/// Classify a raw token.
///
/// Precedence is fixed: digits only → `Int`, then any finite decimal →
/// `Float`, then case-insensitive `true`/`false` → `Bool`, else the token is
/// kept verbatim as `Str`. Never fails.
pub fn coerce(token: &str) -> TypedValue {
    if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(i) = token.parse::<i32>() {
            return TypedValue::Int(i);
        }
        // Too large for an OSC int32, fall through to float
    }

    if let Ok(f) = token.parse::<f32>() {
        if f.is_finite() {
            return TypedValue::Float(f);
        }
    }

    if token.eq_ignore_ascii_case("true") {
        return TypedValue::Bool(true);
    }
    if token.eq_ignore_ascii_case("false") {
        return TypedValue::Bool(false);
    }

    TypedValue::Str(token.to_string())
}

/// Coerce a token for the reserved `scene` prefix (activation flag).
///
/// Always an integer; `None` if the token has no numeric reading at all.
pub fn coerce_activation(token: &str) -> Option<i32> {
    match coerce(token) {
        TypedValue::Int(i) => Some(i),
        TypedValue::Float(f) => Some(f.round() as i32),
        TypedValue::Bool(b) => Some(b as i32),
        TypedValue::Str(_) => None,
    }
}

impl TypedValue {
    /// True for the "off" values a device echoes back (`0`, `0.0`, `false`)
    pub fn is_zero(&self) -> bool {
        match self {
            TypedValue::Int(i) => *i == 0,
            TypedValue::Float(f) => *f == 0.0,
            TypedValue::Bool(b) => !*b,
            TypedValue::Str(_) => false,
        }
    }

    /// Convert an inbound OSC argument.
    ///
    /// Strings go through the coercion cascade; wire types without a typed
    /// counterpart (blobs, timetags, nil...) yield `None`.
    pub fn from_osc(arg: &OscType) -> Option<Self> {
        match arg {
            OscType::Int(i) => Some(TypedValue::Int(*i)),
            OscType::Float(f) => Some(TypedValue::Float(*f)),
            OscType::Bool(b) => Some(TypedValue::Bool(*b)),
            OscType::String(s) => Some(coerce(s)),
            OscType::Long(l) => Some(
                i32::try_from(*l)
                    .map(TypedValue::Int)
                    .unwrap_or(TypedValue::Float(*l as f32)),
            ),
            OscType::Double(d) => Some(TypedValue::Float(*d as f32)),
            OscType::Char(c) => Some(TypedValue::Str(c.to_string())),
            _ => None,
        }
    }

    pub fn to_osc(&self) -> OscType {
        match self {
            TypedValue::Int(i) => OscType::Int(*i),
            TypedValue::Float(f) => OscType::Float(*f),
            TypedValue::Bool(b) => OscType::Bool(*b),
            TypedValue::Str(s) => OscType::String(s.clone()),
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Int(i) => write!(f, "{}", i),
            TypedValue::Float(v) => write!(f, "{:?}", v),
            TypedValue::Bool(b) => write!(f, "{}", b),
            TypedValue::Str(s) => f.write_str(s),
        }
    }
}

/// Argument encoding declared by an endpoint (`valueType` in the config)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    #[default]
    Int,
    Float,
}

impl ValueType {
    /// Parse the config spelling. Unknown spellings return `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" => Some(ValueType::Int),
            "float" => Some(ValueType::Float),
            _ => None,
        }
    }

    /// Re-type a coerced value for this endpoint, best effort.
    ///
    /// Strings have no numeric reading and are passed through unchanged.
    pub fn apply(self, value: TypedValue) -> TypedValue {
        match (self, value) {
            (ValueType::Int, TypedValue::Float(f)) => TypedValue::Int(f.round() as i32),
            (ValueType::Int, TypedValue::Bool(b)) => TypedValue::Int(b as i32),
            (ValueType::Float, TypedValue::Int(i)) => TypedValue::Float(i as f32),
            (ValueType::Float, TypedValue::Bool(b)) => TypedValue::Float(if b { 1.0 } else { 0.0 }),
            (_, other) => other,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Int => f.write_str("int"),
            ValueType::Float => f.write_str("float"),
        }
    }
}
