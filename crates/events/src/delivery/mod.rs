//! Outbound delivery of rendered notifications.
//!
//! [`Dispatcher`] makes exactly one send attempt per call through a
//! [`DeliveryTransport`]. Transports available:
//!
//! - [`sendgrid::SendGridTransport`]: SendGrid v3 HTTP API (default).
//! - [`smtp::SmtpTransport`]: any SMTP relay via `lettre`.

pub mod sendgrid;
pub mod smtp;

use std::future::Future;

use postmaster_core::{ApiKey, RenderedDocument};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// A send attempt failed.
///
/// Not retried by the dispatcher. Variants never include the credential.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The sender or recipient address could not be parsed.
    #[error("Invalid email address: {0}")]
    Address(String),

    /// The MIME message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),

    /// Connection, TLS or timeout failure before a reply was received.
    #[error("Transport unreachable: {0}")]
    Network(String),

    /// The transport refused the API key (HTTP 401/403).
    #[error("Transport rejected the credential")]
    Unauthorized,

    /// Any other refusal: non-2xx status or permanent SMTP reply.
    #[error("Transport rejected the message: {0}")]
    Rejected(String),
}

// ---------------------------------------------------------------------------
// Request / receipt
// ---------------------------------------------------------------------------

/// Configured sender identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub address: String,
    pub name: String,
}

/// Everything one send needs, built fresh per pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRequest {
    pub from_address: String,
    pub from_name: String,
    pub subject: String,
    pub to: String,
    pub body: RenderedDocument,
}

impl DeliveryRequest {
    pub fn new(
        sender: &Sender,
        subject: impl Into<String>,
        to: impl Into<String>,
        body: RenderedDocument,
    ) -> Self {
        Self {
            from_address: sender.address.clone(),
            from_name: sender.name.clone(),
            subject: subject.into(),
            to: to.into(),
            body,
        }
    }
}

/// Transport acknowledgement of an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Transport name, e.g. `"sendgrid"`.
    pub transport: &'static str,
    /// HTTP status or SMTP reply code.
    pub status: String,
    /// Transport-assigned message id, when reported.
    pub message_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// An external service that sends one message per call.
pub trait DeliveryTransport: Send + Sync {
    /// Short transport name for logs and receipts.
    fn name(&self) -> &'static str;

    /// Attempt a single send.
    fn send(
        &self,
        request: &DeliveryRequest,
        credential: &ApiKey,
    ) -> impl Future<Output = Result<Receipt, DeliveryError>> + Send;
}

/// Transport chosen at startup from configuration.
pub enum MailTransport {
    SendGrid(sendgrid::SendGridTransport),
    Smtp(smtp::SmtpTransport),
}

impl DeliveryTransport for MailTransport {
    fn name(&self) -> &'static str {
        match self {
            Self::SendGrid(t) => t.name(),
            Self::Smtp(t) => t.name(),
        }
    }

    async fn send(
        &self,
        request: &DeliveryRequest,
        credential: &ApiKey,
    ) -> Result<Receipt, DeliveryError> {
        match self {
            Self::SendGrid(t) => t.send(request, credential).await,
            Self::Smtp(t) => t.send(request, credential).await,
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Hands rendered documents to the configured transport.
pub struct Dispatcher<T> {
    transport: T,
}

impl<T: DeliveryTransport> Dispatcher<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send `request` once. Failures are returned to the caller as-is.
    pub async fn dispatch(
        &self,
        request: DeliveryRequest,
        credential: &ApiKey,
    ) -> Result<Receipt, DeliveryError> {
        let transport = self.transport.name();
        match self.transport.send(&request, credential).await {
            Ok(receipt) => {
                tracing::info!(
                    transport,
                    status = %receipt.status,
                    message_id = receipt.message_id.as_deref(),
                    bytes = request.body.len(),
                    "Notification accepted by transport"
                );
                Ok(receipt)
            }
            Err(e) => {
                tracing::warn!(transport, error = %e, "Notification send failed");
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
