//! Atomic property types and value coercion.
//!
//! CMIS properties travel as typed string nodes. This module defines the
//! eight atomic types, the native [`Value`] representation, and the
//! bidirectional coercion rules between the two. Cardinality is carried one
//! level up by [`PropertyValue`]: a single-valued property with no wire
//! value is [`PropertyValue::Absent`], a repeating property with no wire
//! value is an empty [`PropertyValue::Multi`], never the other way around.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The atomic type of a CMIS property, as declared by its definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AtomicType {
    /// Plain string.
    String,
    /// Boolean; wire forms `true`/`1` and `false`/`0` are accepted on read.
    Boolean,
    /// Signed integer.
    Integer,
    /// Decimal number.
    Decimal,
    /// Timestamp; RFC 3339 on the wire.
    DateTime,
    /// Object/type identifier.
    Id,
    /// URI string.
    Uri,
    /// HTML fragment.
    Html,
}

impl AtomicType {
    /// Lowercase protocol name of this atomic type.
    pub fn name(self) -> &'static str {
        match self {
            AtomicType::String => "string",
            AtomicType::Boolean => "boolean",
            AtomicType::Integer => "integer",
            AtomicType::Decimal => "decimal",
            AtomicType::DateTime => "datetime",
            AtomicType::Id => "id",
            AtomicType::Uri => "uri",
            AtomicType::Html => "html",
        }
    }
}

/// A native scalar value for one CMIS property slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// String property value.
    Text(String),
    /// Boolean property value.
    Boolean(bool),
    /// Integer property value.
    Integer(i64),
    /// Decimal property value.
    Decimal(f64),
    /// Datetime property value.
    DateTime(DateTime<Utc>),
    /// Identifier property value.
    Id(String),
    /// URI property value.
    Uri(String),
    /// HTML property value.
    Html(String),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Text(_) => "string",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Decimal(_) => "decimal",
            Value::DateTime(_) => "datetime",
            Value::Id(_) => "id",
            Value::Uri(_) => "uri",
            Value::Html(_) => "html",
        }
    }

    /// The string content, for the string-shaped variants.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Id(s) | Value::Uri(s) | Value::Html(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Decimal(d)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::DateTime(t)
    }
}

/// One property slot of an object, carrying cardinality.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PropertyValue {
    /// Single-valued property with no value set.
    #[default]
    Absent,
    /// Single-valued property.
    Single(Value),
    /// Repeating property; empty when no wire value is present.
    Multi(Vec<Value>),
}

impl PropertyValue {
    /// True for `Absent` and for an empty `Multi`.
    pub fn is_empty(&self) -> bool {
        match self {
            PropertyValue::Absent => true,
            PropertyValue::Single(_) => false,
            PropertyValue::Multi(values) => values.is_empty(),
        }
    }

    /// The single value, if this slot holds exactly one.
    pub fn as_single(&self) -> Option<&Value> {
        match self {
            PropertyValue::Single(value) => Some(value),
            _ => None,
        }
    }

    /// The values of this slot as a sequence (empty for `Absent`).
    pub fn values(&self) -> &[Value] {
        match self {
            PropertyValue::Absent => &[],
            PropertyValue::Single(value) => std::slice::from_ref(value),
            PropertyValue::Multi(values) => values,
        }
    }

    /// Reshape into the `Multi` form a repeating property requires. A
    /// scalar becomes a one-element sequence, `Absent` an empty one.
    pub fn into_repeating(self) -> PropertyValue {
        match self {
            PropertyValue::Absent => PropertyValue::Multi(Vec::new()),
            PropertyValue::Single(value) => PropertyValue::Multi(vec![value]),
            multi => multi,
        }
    }
}

impl<V: Into<Value>> From<V> for PropertyValue {
    fn from(value: V) -> Self {
        PropertyValue::Single(value.into())
    }
}

/// Parse one wire scalar into a native value of the given atomic type.
pub fn to_native(atomic: AtomicType, wire: &str) -> Result<Value> {
    match atomic {
        AtomicType::String => Ok(Value::Text(wire.to_string())),
        AtomicType::Id => Ok(Value::Id(wire.to_string())),
        AtomicType::Uri => Ok(Value::Uri(wire.to_string())),
        AtomicType::Html => Ok(Value::Html(wire.to_string())),
        AtomicType::Boolean => match wire {
            "true" | "1" => Ok(Value::Boolean(true)),
            "false" | "0" => Ok(Value::Boolean(false)),
            other => Err(mismatch("boolean", other)),
        },
        AtomicType::Integer => {
            wire.parse::<i64>().map(Value::Integer).map_err(|_| mismatch("integer", wire))
        }
        AtomicType::Decimal => {
            wire.parse::<f64>().map(Value::Decimal).map_err(|_| mismatch("decimal", wire))
        }
        AtomicType::DateTime => DateTime::parse_from_rfc3339(wire)
            .map(|t| Value::DateTime(t.with_timezone(&Utc)))
            .map_err(|_| mismatch("datetime", wire)),
    }
}

/// Render a native value into its canonical wire form.
///
/// Booleans always serialize as `true`/`false`, never `1`/`0`.
pub fn to_wire(atomic: AtomicType, value: &Value) -> Result<String> {
    validate(atomic, value)?;
    Ok(match value {
        Value::Text(s) | Value::Id(s) | Value::Uri(s) | Value::Html(s) => s.clone(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::DateTime(t) => t.to_rfc3339_opts(SecondsFormat::Secs, true),
    })
}

/// Check that a native value is compatible with an atomic type.
pub fn validate(atomic: AtomicType, value: &Value) -> Result<()> {
    let ok = matches!(
        (atomic, value),
        (AtomicType::String, Value::Text(_))
            | (AtomicType::Boolean, Value::Boolean(_))
            | (AtomicType::Integer, Value::Integer(_))
            | (AtomicType::Decimal, Value::Decimal(_))
            | (AtomicType::DateTime, Value::DateTime(_))
            | (AtomicType::Id, Value::Id(_))
            | (AtomicType::Uri, Value::Uri(_))
            | (AtomicType::Html, Value::Html(_))
            // Ids, URIs and HTML are strings on the wire; accept plain text for them.
            | (AtomicType::Id, Value::Text(_))
            | (AtomicType::Uri, Value::Text(_))
            | (AtomicType::Html, Value::Text(_))
    );
    if ok {
        Ok(())
    } else {
        Err(mismatch(atomic.name(), value.kind()))
    }
}

/// Parse a loosely-typed boolean wire form (`true`/`1`/`false`/`0`).
pub(crate) fn wire_bool(text: &str) -> Option<bool> {
    match text {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn mismatch(expected: &'static str, actual: &str) -> Error {
    Error::TypeMismatch { expected, actual: actual.to_string() }
}
