//! Event token verification.
//!
//! Event publishers sign every event as a JWT whose `event` claim carries the
//! payload. [`TokenVerifier`] checks the signature, expiry and the optional
//! issuer/audience constraints, and only then exposes the payload as
//! [`Claims`].
//!
//! Production publishers sign with RS256; a shared HS256 secret is accepted
//! as well for closed deployments and local development.

use std::fmt;

use base64::Engine as _;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use postmaster_core::{Claims, ConfigError};
use sha2::{Digest, Sha256};

/// Default allowance for clock drift between publisher and consumer.
pub const DEFAULT_LEEWAY_SECS: u64 = 60;

/// Number of hex digits kept from the token digest for log correlation.
const FINGERPRINT_LEN: usize = 12;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Why a token was refused.
///
/// Never carries token text; the underlying decoder messages only describe
/// the failing check.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Not a decodable token, or the claims lack `event`/`exp`.
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// `exp` is in the past beyond the configured leeway.
    #[error("Token has expired")]
    Expired,

    /// Signature or algorithm does not match the trust material.
    #[error("Token signature does not match")]
    BadSignature,

    /// Issuer, audience or `nbf` checks failed.
    #[error("Token claims rejected: {0}")]
    ClaimsRejected(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => Self::BadSignature,
            ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAudience
            | ErrorKind::InvalidSubject
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_) => Self::ClaimsRejected(err.to_string()),
            _ => Self::Malformed(err.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// TokenConfig
// ---------------------------------------------------------------------------

/// Key material tokens are verified against.
#[derive(Clone)]
pub enum TrustMaterial {
    /// PEM-encoded RSA public key (RS256).
    RsaPublicKey(Vec<u8>),
    /// Shared HMAC secret (HS256).
    SharedSecret(Vec<u8>),
}

impl TrustMaterial {
    /// Parse an RSA public key given either as PEM text or as base64-encoded
    /// PEM (the form publishers usually export into environment variables).
    pub fn rsa_public_key(value: &str) -> Result<Self, ConfigError> {
        let value = value.trim();
        if value.starts_with("-----BEGIN") {
            return Ok(Self::RsaPublicKey(value.as_bytes().to_vec()));
        }

        let pem = base64::engine::general_purpose::STANDARD
            .decode(value)
            .map_err(|e| ConfigError::Invalid {
                name: "JWT_PUBLIC_KEY",
                reason: format!("neither PEM nor base64: {e}"),
            })?;
        Ok(Self::RsaPublicKey(pem))
    }

    fn algorithm(&self) -> Algorithm {
        match self {
            Self::RsaPublicKey(_) => Algorithm::RS256,
            Self::SharedSecret(_) => Algorithm::HS256,
        }
    }
}

impl fmt::Debug for TrustMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RsaPublicKey(pem) => write!(f, "RsaPublicKey({} bytes)", pem.len()),
            Self::SharedSecret(_) => f.write_str("SharedSecret(<redacted>)"),
        }
    }
}

/// Token verification settings.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub trust: TrustMaterial,
    /// Required `iss` claim, if any.
    pub issuer: Option<String>,
    /// Required `aud` claim, if any.
    pub audience: Option<String>,
    /// Clock leeway in seconds (default: 60).
    pub leeway_secs: u64,
}

impl TokenConfig {
    pub fn new(trust: TrustMaterial) -> Self {
        Self {
            trust,
            issuer: None,
            audience: None,
            leeway_secs: DEFAULT_LEEWAY_SECS,
        }
    }
}

// ---------------------------------------------------------------------------
// TokenVerifier
// ---------------------------------------------------------------------------

/// Validates event tokens and yields their verified [`Claims`].
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Build a verifier, rejecting unusable key material up front.
    pub fn new(config: &TokenConfig) -> Result<Self, ConfigError> {
        let key = match &config.trust {
            TrustMaterial::RsaPublicKey(pem) => {
                DecodingKey::from_rsa_pem(pem).map_err(|e| ConfigError::Invalid {
                    name: "JWT_PUBLIC_KEY",
                    reason: e.to_string(),
                })?
            }
            TrustMaterial::SharedSecret(secret) => {
                if secret.is_empty() {
                    return Err(ConfigError::Invalid {
                        name: "JWT_SECRET",
                        reason: "must not be empty".to_string(),
                    });
                }
                DecodingKey::from_secret(secret)
            }
        };

        let mut validation = Validation::new(config.trust.algorithm());
        validation.leeway = config.leeway_secs;
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Ok(Self { key, validation })
    }

    /// Verify `token` and return its claims.
    ///
    /// Checks the signature, `exp` (with leeway) and, when configured, `iss`
    /// and `aud`. A token whose payload lacks the `event` claim is malformed.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token.trim(), &self.key, &self.validation)?;
        Ok(data.claims)
    }
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("algorithms", &self.validation.algorithms)
            .field("leeway", &self.validation.leeway)
            .finish_non_exhaustive()
    }
}

/// Short, non-reversible identifier for a token, safe to log.
pub fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.trim().as_bytes());
    let mut hex = format!("{digest:x}");
    hex.truncate(FINGERPRINT_LEN);
    hex
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
