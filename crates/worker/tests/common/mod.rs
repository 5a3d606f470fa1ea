//! Shared helpers for worker integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use jsonwebtoken::{encode, EncodingKey, Header};
use postmaster_core::ApiKey;
use postmaster_events::{
    BrokerError, DeliveryError, DeliveryRequest, DeliveryTransport, Dispatcher, InboundMessage,
    Receipt, Sender, TokenConfig, TokenVerifier, TrustMaterial,
};
use postmaster_pipeline::{
    EmailConfirmationNotice, EventPipeline, FsTemplateStore, MailerConfig, TemplateRenderer,
};
use postmaster_worker::ConsumerLoop;
use serde_json::{json, Value};

pub const SECRET: &[u8] = b"worker-test-secret-long-enough-for-hmac";

/// Transport that counts sends and fails for recipients on a fixed domain.
#[derive(Clone, Default)]
pub struct CountingTransport {
    pub attempts: Arc<AtomicUsize>,
}

pub const UNREACHABLE_DOMAIN: &str = "@unreachable.test";

impl CountingTransport {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl DeliveryTransport for CountingTransport {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn send(
        &self,
        request: &DeliveryRequest,
        _credential: &ApiKey,
    ) -> Result<Receipt, DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if request.to.ends_with(UNREACHABLE_DOMAIN) {
            return Err(DeliveryError::Network("connection refused".to_string()));
        }
        Ok(Receipt {
            transport: self.name(),
            status: "202".to_string(),
            message_id: None,
        })
    }
}

pub type TestLoop = ConsumerLoop<EmailConfirmationNotice, FsTemplateStore, CountingTransport>;

pub fn build_loop(templates: &std::path::Path, transport: CountingTransport) -> TestLoop {
    let verifier = TokenVerifier::new(&TokenConfig::new(TrustMaterial::SharedSecret(
        SECRET.to_vec(),
    )))
    .expect("verifier should build");

    ConsumerLoop::new(EventPipeline::new(
        verifier,
        TemplateRenderer::new(FsTemplateStore::new(templates)),
        Dispatcher::new(transport),
        MailerConfig {
            credential: ApiKey::new("SG.worker-test"),
            sender: Sender {
                address: "noreply@postmaster.com".to_string(),
                name: "postmaster".to_string(),
            },
        },
    ))
}

pub fn template_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    std::fs::write(
        dir.path().join("sign_up.html"),
        "<p>Confirm {{ user.email }}</p>",
    )
    .expect("template should be written");
    dir
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock after epoch")
        .as_secs() as i64
}

pub fn sign(event: Value) -> String {
    let claims = json!({ "exp": now() + 300, "event": event });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET))
        .expect("encoding should succeed")
}

pub fn message(tag: u64, body: impl Into<Vec<u8>>) -> Result<InboundMessage, BrokerError> {
    Ok(InboundMessage {
        delivery_tag: tag,
        routing_key: "user.email.confirmation.token".to_string(),
        redelivered: false,
        body: body.into(),
    })
}

pub fn confirmation(email: &str) -> Vec<u8> {
    sign(json!({ "user": { "email": email, "name": "A" } })).into_bytes()
}
