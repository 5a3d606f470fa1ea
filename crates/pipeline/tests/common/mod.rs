//! Shared helpers for pipeline integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use jsonwebtoken::{encode, EncodingKey, Header};
use postmaster_core::ApiKey;
use postmaster_events::{
    DeliveryError, DeliveryRequest, DeliveryTransport, Dispatcher, Receipt, Sender, TokenConfig,
    TokenVerifier, TrustMaterial,
};
use postmaster_pipeline::{
    EmailConfirmationNotice, EventPipeline, FsTemplateStore, MailerConfig, TemplateRenderer,
};
use serde_json::{json, Value};

pub const SECRET: &[u8] = b"pipeline-test-secret-long-enough-for-hmac";
pub const API_KEY: &str = "SG.pipeline-test-key";

/// Outcome a [`RecordingTransport`] reports for every send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Accept,
    NetworkDown,
    Unauthorized,
}

/// Transport that records every request it is handed.
#[derive(Clone)]
pub struct RecordingTransport {
    pub sent: Arc<Mutex<Vec<DeliveryRequest>>>,
    pub outcome: Outcome,
}

impl RecordingTransport {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            outcome,
        }
    }

    pub fn requests(&self) -> Vec<DeliveryRequest> {
        self.sent.lock().expect("lock should not be poisoned").clone()
    }
}

impl DeliveryTransport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(
        &self,
        request: &DeliveryRequest,
        credential: &ApiKey,
    ) -> Result<Receipt, DeliveryError> {
        assert_eq!(credential.expose(), API_KEY);
        self.sent
            .lock()
            .expect("lock should not be poisoned")
            .push(request.clone());
        match self.outcome {
            Outcome::Accept => Ok(Receipt {
                transport: self.name(),
                status: "202".to_string(),
                message_id: Some("msg-1".to_string()),
            }),
            Outcome::NetworkDown => Err(DeliveryError::Network("connection refused".to_string())),
            Outcome::Unauthorized => Err(DeliveryError::Unauthorized),
        }
    }
}

pub type TestPipeline = EventPipeline<EmailConfirmationNotice, FsTemplateStore, RecordingTransport>;

/// Directory holding the templates shipped with the worker.
pub fn shipped_templates() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../templates")
}

pub fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock after epoch")
        .as_secs() as i64
}

pub fn build_pipeline(templates: &Path, transport: RecordingTransport) -> TestPipeline {
    let verifier = TokenVerifier::new(&TokenConfig::new(TrustMaterial::SharedSecret(
        SECRET.to_vec(),
    )))
    .expect("verifier should build");

    EventPipeline::new(
        verifier,
        TemplateRenderer::new(FsTemplateStore::new(templates)),
        Dispatcher::new(transport),
        MailerConfig {
            credential: ApiKey::new(API_KEY),
            sender: Sender {
                address: "noreply@postmaster.com".to_string(),
                name: "postmaster".to_string(),
            },
        },
    )
}

/// Sign `event` as the body of a fresh token.
pub fn sign_event(event: Value, secret: &[u8]) -> String {
    let claims = json!({
        "iss": "barong",
        "jti": "evt-42",
        "iat": now(),
        "exp": now() + 300,
        "event": event,
    });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
        .expect("encoding should succeed")
}

pub fn confirmation_event(email: &str, name: &str) -> Value {
    json!({
        "user": {
            "uid": "ID873B710D88",
            "email": email,
            "name": name,
            "role": "member",
            "level": "1",
            "otp": "false",
            "state": "pending",
        },
        "token": "0c2fe3ac"
    })
}
