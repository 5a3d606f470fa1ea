//! Tolerant decoding of raw event maps into typed records.
//!
//! Event publishers are loosely typed: the same field may arrive as
//! `"level": 2` from one producer and `"level": "2"` from another, and key
//! spelling drifts between `created_at` and `createdAt`. Instead of letting
//! serde reject those events, each record declares a coercion table of
//! [`FieldRule`]s. [`apply`] walks the table once, resolves every key
//! case/format-insensitively, and converts each value according to its
//! [`FieldKind`]:
//!
//! | Kind      | Accepted source representations                                   |
//! |-----------|-------------------------------------------------------------------|
//! | `Text`    | string, number (decimal text), boolean (`"true"`/`"false"`)        |
//! | `Integer` | integral number, integral float, numeric text, boolean (`1`/`0`)  |
//! | `Boolean` | boolean, number (non-zero is true), `1 t T TRUE true True` / `0 f F FALSE false False`, empty text (false) |
//! | `Email`   | string holding a valid email address                              |
//! | `Object`  | JSON object                                                       |
//!
//! `null` counts as absent for every kind. Optional `Text` keeps blank
//! strings as they are; blank text counts as absent for `Email`, `Integer`
//! and required `Text` fields.

use serde_json::Value;
use validator::ValidateEmail;

use crate::types::RawEvent;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// A raw event did not fit the record's coercion table.
///
/// Messages name the offending field path but never echo its value, since
/// event payloads carry personal data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// A required field is absent, null or blank.
    #[error("Missing required field `{field}`")]
    Missing { field: String },

    /// The value has no coercion to the field's kind.
    #[error("Field `{field}` cannot be read as {expected} (found {found})")]
    Mismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    /// The recipient address failed validation.
    #[error("Field `{field}` is not a deliverable email address")]
    InvalidAddress { field: String },
}

impl SchemaError {
    /// Dotted path of the field that failed.
    pub fn field(&self) -> &str {
        match self {
            Self::Missing { field }
            | Self::Mismatch { field, .. }
            | Self::InvalidAddress { field } => field,
        }
    }
}

// ---------------------------------------------------------------------------
// Coercion table
// ---------------------------------------------------------------------------

/// Target representation of a decoded field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Boolean,
    Email,
    Object,
}

impl FieldKind {
    fn describe(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "an integer",
            Self::Boolean => "a boolean",
            Self::Email => "an email address",
            Self::Object => "an object",
        }
    }
}

/// One row of a record's coercion table.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    /// Canonical (snake_case) field name.
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldRule {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

/// A value after coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced<'a> {
    Text(String),
    Integer(i64),
    Boolean(bool),
    Object(&'a RawEvent),
}

/// Result of applying a coercion table: one optional value per rule.
#[derive(Debug)]
pub struct FieldValues<'a> {
    scope: String,
    entries: Vec<(&'static str, Option<Coerced<'a>>)>,
}

impl<'a> FieldValues<'a> {
    fn get(&self, name: &str) -> Option<&Coerced<'a>> {
        self.entries
            .iter()
            .find(|(rule, _)| *rule == name)
            .and_then(|(_, value)| value.as_ref())
    }

    /// Text (or email) value of `name`, if present.
    pub fn text(&self, name: &str) -> Option<String> {
        match self.get(name) {
            Some(Coerced::Text(s)) => Some(s.clone()),
            _ => None,
        }
    }

    /// Text value of a field the table marks as required.
    pub fn required_text(&self, name: &str) -> Result<String, SchemaError> {
        self.text(name).ok_or_else(|| SchemaError::Missing {
            field: self.path(name),
        })
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(Coerced::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        match self.get(name) {
            Some(Coerced::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    /// Nested object of a field the table marks as required.
    pub fn required_object(&self, name: &str) -> Result<&'a RawEvent, SchemaError> {
        match self.get(name) {
            Some(Coerced::Object(map)) => Ok(map),
            _ => Err(SchemaError::Missing {
                field: self.path(name),
            }),
        }
    }

    /// Dotted path of `name` within this scope, used for nested decoding.
    pub fn path(&self, name: &str) -> String {
        join_path(&self.scope, name)
    }
}

/// Apply a coercion table to `source`.
///
/// `scope` is the dotted path of `source` itself (empty for the top level)
/// and only affects error messages. Every rule is evaluated; the first
/// failing rule in table order is reported.
pub fn apply<'a>(
    table: &[FieldRule],
    source: &'a RawEvent,
    scope: &str,
) -> Result<FieldValues<'a>, SchemaError> {
    let mut entries = Vec::with_capacity(table.len());

    for rule in table {
        let field = join_path(scope, rule.name);
        let value = match lookup(source, rule.name) {
            Some(raw) => coerce(rule.kind, raw, &field)?,
            None => None,
        };

        let blank = matches!(&value, Some(Coerced::Text(t)) if t.trim().is_empty());
        if rule.required && (value.is_none() || blank) {
            return Err(SchemaError::Missing { field });
        }
        entries.push((rule.name, value));
    }

    Ok(FieldValues {
        scope: scope.to_string(),
        entries,
    })
}

/// Canonical form of a key: lowercase ASCII alphanumerics only.
///
/// `created_at`, `createdAt`, `CreatedAt` and `created-at` all normalise to
/// `createdat`.
pub fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Find `name` in `source`, preferring an exact key match.
fn lookup<'a>(source: &'a RawEvent, name: &str) -> Option<&'a Value> {
    if let Some(value) = source.get(name) {
        return Some(value);
    }
    let wanted = normalize_key(name);
    source
        .iter()
        .find(|(key, _)| normalize_key(key) == wanted)
        .map(|(_, value)| value)
}

fn coerce<'a>(
    kind: FieldKind,
    raw: &'a Value,
    field: &str,
) -> Result<Option<Coerced<'a>>, SchemaError> {
    if raw.is_null() {
        return Ok(None);
    }

    let coerced = match kind {
        FieldKind::Text => coerce_text(raw).map(|t| t.map(Coerced::Text)),
        FieldKind::Integer => coerce_integer(raw).map(|n| n.map(Coerced::Integer)),
        FieldKind::Boolean => coerce_boolean(raw).map(|b| Some(Coerced::Boolean(b))),
        FieldKind::Email => match raw {
            Value::String(s) if s.trim().is_empty() => Some(None),
            Value::String(s) => {
                let address = s.trim().to_string();
                if !address.validate_email() {
                    return Err(SchemaError::InvalidAddress {
                        field: field.to_string(),
                    });
                }
                Some(Some(Coerced::Text(address)))
            }
            _ => None,
        },
        FieldKind::Object => match raw {
            Value::Object(map) => Some(Some(Coerced::Object(map))),
            _ => None,
        },
    };

    coerced.ok_or_else(|| SchemaError::Mismatch {
        field: field.to_string(),
        expected: kind.describe(),
        found: json_type(raw),
    })
}

/// `None` means irreconcilable.
fn coerce_text(raw: &Value) -> Option<Option<String>> {
    match raw {
        Value::String(s) => Some(Some(s.clone())),
        Value::Number(n) => Some(Some(n.to_string())),
        Value::Bool(b) => Some(Some(b.to_string())),
        _ => None,
    }
}

fn coerce_integer(raw: &Value) -> Option<Option<i64>> {
    match raw {
        Value::Number(n) => integral(n).map(Some),
        Value::Bool(b) => Some(Some(i64::from(*b))),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Some(None);
            }
            if let Ok(n) = s.parse::<i128>() {
                return i64::try_from(n).ok().map(Some);
            }
            s.parse::<f64>().ok().and_then(integral_f64).map(Some)
        }
        _ => None,
    }
}

fn coerce_boolean(raw: &Value) -> Option<bool> {
    match raw {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim() {
            "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
            "" | "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn integral(n: &serde_json::Number) -> Option<i64> {
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    n.as_f64().and_then(integral_f64)
}

/// `i64::MAX as f64` rounds up to 2^63, so the upper bound is exclusive.
fn integral_f64(f: f64) -> Option<i64> {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn join_path(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{scope}.{name}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
