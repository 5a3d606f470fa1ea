//! Extraction of the signed token from a broker message body.
//!
//! Publishers emit either a bare compact JWT or a JWS general JSON
//! serialization:
//!
//! ```json
//! {"payload": "<b64>", "signatures": [{"protected": "<b64>", "signature": "<b64>"}]}
//! ```
//!
//! The JSON form is reassembled into compact `protected.payload.signature`
//! so both reach the verifier in the same shape.

use serde::Deserialize;

/// A message body that does not carry a token.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Nothing but whitespace in the body.
    #[error("Message body is empty")]
    Empty,

    /// The body is not UTF-8 text.
    #[error("Message body is not valid UTF-8")]
    NotUtf8,

    /// The body looks like a JSON envelope but does not parse as one.
    #[error("Message envelope is not valid JSON: {0}")]
    Json(String),

    /// A JSON envelope with an empty `signatures` list.
    #[error("Message envelope carries no signature")]
    Unsigned,

    /// The text is not three base64url segments.
    #[error("Message body is not a compact token")]
    NotCompact,
}

#[derive(Debug, Deserialize)]
struct JwsEnvelope {
    payload: String,
    signatures: Vec<JwsSignature>,
}

#[derive(Debug, Deserialize)]
struct JwsSignature {
    protected: String,
    signature: String,
}

/// Pull the compact token out of a raw message body.
pub fn extract_token(body: &[u8]) -> Result<String, EnvelopeError> {
    let text = std::str::from_utf8(body)
        .map_err(|_| EnvelopeError::NotUtf8)?
        .trim();

    if text.is_empty() {
        return Err(EnvelopeError::Empty);
    }

    let token = if text.starts_with('{') {
        let envelope: JwsEnvelope =
            serde_json::from_str(text).map_err(|e| EnvelopeError::Json(e.to_string()))?;
        let signature = envelope
            .signatures
            .into_iter()
            .next()
            .ok_or(EnvelopeError::Unsigned)?;
        format!(
            "{}.{}.{}",
            signature.protected, envelope.payload, signature.signature
        )
    } else {
        text.to_string()
    };

    if !is_compact(&token) {
        return Err(EnvelopeError::NotCompact);
    }
    Ok(token)
}

/// Three non-empty base64url segments.
fn is_compact(token: &str) -> bool {
    let segments: Vec<&str> = token.split('.').collect();
    segments.len() == 3
        && segments.iter().all(|s| {
            !s.is_empty()
                && s.bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'=')
        })
}
