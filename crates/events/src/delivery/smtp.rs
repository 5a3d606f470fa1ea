//! Email delivery via SMTP.
//!
//! [`SmtpTransport`] wraps the `lettre` async SMTP transport (STARTTLS) and
//! sends the rendered document as an HTML message. The delivery credential is
//! used as the SMTP password, which matches relays such as SendGrid's that
//! accept the API key with the fixed username `apikey`.

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use postmaster_core::ApiKey;

use super::{DeliveryError, DeliveryRequest, DeliveryTransport, Receipt};

/// Default SMTP port (STARTTLS).
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Default SMTP username for API-key relays.
pub const DEFAULT_SMTP_USER: &str = "apikey";

/// SMTP relay settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: String,
    /// Port (defaults to 587).
    pub port: u16,
    pub username: String,
}

/// Sends notifications through an SMTP relay.
pub struct SmtpTransport {
    config: SmtpConfig,
}

impl SmtpTransport {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }
}

/// Assemble the MIME message for `request`.
pub fn build_message(request: &DeliveryRequest) -> Result<Message, DeliveryError> {
    let from_address: Address = request
        .from_address
        .parse()
        .map_err(|e: lettre::address::AddressError| DeliveryError::Address(e.to_string()))?;
    let to: Mailbox = request
        .to
        .parse()
        .map_err(|e: lettre::address::AddressError| DeliveryError::Address(e.to_string()))?;

    Message::builder()
        .from(Mailbox::new(Some(request.from_name.clone()), from_address))
        .to(to)
        .subject(request.subject.clone())
        .header(ContentType::TEXT_HTML)
        .body(request.body.to_text().into_owned())
        .map_err(|e| DeliveryError::Build(e.to_string()))
}

impl DeliveryTransport for SmtpTransport {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn send(
        &self,
        request: &DeliveryRequest,
        credential: &ApiKey,
    ) -> Result<Receipt, DeliveryError> {
        let email = build_message(request)?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
            .map_err(|e| DeliveryError::Network(e.to_string()))?
            .port(self.config.port)
            .credentials(Credentials::new(
                self.config.username.clone(),
                credential.expose().to_string(),
            ))
            .build();

        let response = mailer.send(email).await.map_err(|e| {
            if e.is_permanent() {
                DeliveryError::Rejected(e.to_string())
            } else {
                DeliveryError::Network(e.to_string())
            }
        })?;

        Ok(Receipt {
            transport: self.name(),
            status: response.code().to_string(),
            message_id: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
