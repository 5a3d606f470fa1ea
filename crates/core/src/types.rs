use std::fmt;

use serde::{Deserialize, Serialize};

/// Untyped event body carried in the `event` claim of a signed token.
pub type RawEvent = serde_json::Map<String, serde_json::Value>;

/// Verified claim set of an event token.
///
/// Only produced by the token verifier, so holding a `Claims` means the
/// signature and expiry checks already passed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Audience, either a single string or an array of strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    /// The event payload, decoded later into a typed record.
    pub event: RawEvent,
}

/// Output of rendering one template against one record.
///
/// Immutable once built; handed by value to the dispatcher and dropped after
/// the send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument(Vec<u8>);

impl RenderedDocument {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Body as text, replacing invalid UTF-8 sequences.
    pub fn to_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for RenderedDocument {
    fn from(text: String) -> Self {
        Self(text.into_bytes())
    }
}

/// Delivery transport credential.
///
/// `Debug` is redacted and there is no `Display`, so the value can only reach
/// output through an explicit [`ApiKey::expose`] call.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw credential, for handing to the transport.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}
