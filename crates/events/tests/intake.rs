//! Broker body to verified claims, as the consumer loop sees it.

use assert_matches::assert_matches;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use postmaster_events::{
    extract_token, EnvelopeError, TokenConfig, TokenError, TokenVerifier, TrustMaterial,
};
use serde_json::json;

const RSA_PRIVATE: &str = include_str!("fixtures/rsa_private.pem");
const RSA_PUBLIC_B64: &str = include_str!("fixtures/rsa_public.pem.b64");

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock after epoch")
        .as_secs() as i64
}

fn signed_event() -> String {
    let claims = json!({
        "iss": "barong",
        "jti": "0f3a",
        "exp": now() + 300,
        "event": {"user": {"email": "a@b.com", "name": "A"}, "token": "0c2fe3ac"}
    });
    encode(
        &Header::new(Algorithm::RS256),
        &claims,
        &EncodingKey::from_rsa_pem(RSA_PRIVATE.as_bytes()).expect("private key should load"),
    )
    .expect("encoding should succeed")
}

fn verifier() -> TokenVerifier {
    let trust = TrustMaterial::rsa_public_key(RSA_PUBLIC_B64).expect("key should parse");
    TokenVerifier::new(&TokenConfig::new(trust)).expect("verifier should build")
}

/// Split a compact token into the JWS general JSON serialization.
fn json_envelope(token: &str) -> Vec<u8> {
    let mut parts = token.split('.');
    let protected = parts.next().expect("header segment");
    let payload = parts.next().expect("payload segment");
    let signature = parts.next().expect("signature segment");
    json!({
        "payload": payload,
        "signatures": [{ "protected": protected, "signature": signature }]
    })
    .to_string()
    .into_bytes()
}

#[test]
fn compact_body_verifies() {
    let token = signed_event();
    let body = format!("{token}\n").into_bytes();

    let extracted = extract_token(&body).expect("token should be extracted");
    let claims = verifier().verify(&extracted).expect("token should verify");

    assert_eq!(claims.event["user"]["email"], "a@b.com");
}

#[test]
fn json_envelope_body_verifies() {
    let token = signed_event();

    let extracted = extract_token(&json_envelope(&token)).expect("token should be extracted");
    assert_eq!(extracted, token);

    let claims = verifier().verify(&extracted).expect("token should verify");
    assert_eq!(claims.jti.as_deref(), Some("0f3a"));
    assert_eq!(claims.event["token"], "0c2fe3ac");
}

#[test]
fn tampered_envelope_fails_verification() {
    let token = signed_event();
    let mut envelope: serde_json::Value =
        serde_json::from_slice(&json_envelope(&token)).expect("envelope is JSON");
    let forged = json!({"exp": now() + 300, "event": {"user": {"email": "evil@x.com"}}});
    envelope["payload"] = json!(URL_SAFE_NO_PAD.encode(forged.to_string()));

    let extracted = extract_token(envelope.to_string().as_bytes()).expect("still compact");
    assert_matches!(verifier().verify(&extracted), Err(TokenError::BadSignature));
}

#[test]
fn envelope_without_signatures_is_rejected() {
    let body = json!({"payload": "e30", "signatures": []}).to_string();
    assert_eq!(extract_token(body.as_bytes()), Err(EnvelopeError::Unsigned));
}
