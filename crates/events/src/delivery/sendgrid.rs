//! Email delivery via the SendGrid v3 HTTP API.
//!
//! [`SendGridTransport`] posts one `mail/send` request per call with the API
//! key as bearer credential. No retries: a failed attempt is reported as a
//! [`DeliveryError`] and the caller decides what happens next.

use std::time::Duration;

use postmaster_core::ApiKey;
use reqwest::StatusCode;
use serde_json::json;

use super::{DeliveryError, DeliveryRequest, DeliveryTransport, Receipt};

/// Public SendGrid API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.sendgrid.com";

const SEND_PATH: &str = "/v3/mail/send";

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Response header carrying the SendGrid message id.
const MESSAGE_ID_HEADER: &str = "x-message-id";

/// Sends notifications through SendGrid's HTTP API.
pub struct SendGridTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl SendGridTransport {
    /// Create a transport against `api_base` (normally [`DEFAULT_API_BASE`]).
    pub fn new(api_base: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self::with_client(client, api_base)
    }

    /// Create a transport using a pre-built HTTP client.
    pub fn with_client(client: reqwest::Client, api_base: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}{SEND_PATH}", api_base.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Default for SendGridTransport {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE)
    }
}

/// JSON body of a single-recipient HTML `mail/send` request.
pub fn mail_body(request: &DeliveryRequest) -> serde_json::Value {
    json!({
        "personalizations": [
            { "to": [ { "email": request.to } ] }
        ],
        "from": { "email": request.from_address, "name": request.from_name },
        "subject": request.subject,
        "content": [
            { "type": "text/html", "value": request.body.to_text() }
        ]
    })
}

impl DeliveryTransport for SendGridTransport {
    fn name(&self) -> &'static str {
        "sendgrid"
    }

    async fn send(
        &self,
        request: &DeliveryRequest,
        credential: &ApiKey,
    ) -> Result<Receipt, DeliveryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(credential.expose())
            .json(&mail_body(request))
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.without_url().to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(DeliveryError::Unauthorized);
        }
        if !status.is_success() {
            return Err(DeliveryError::Rejected(format!("HTTP {}", status.as_u16())));
        }

        let message_id = response
            .headers()
            .get(MESSAGE_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(Receipt {
            transport: self.name(),
            status: status.as_u16().to_string(),
            message_id,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use postmaster_core::RenderedDocument;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;
    use crate::delivery::Sender;

    /// Transport talking straight to the local test server.
    fn local_transport(base: &str) -> SendGridTransport {
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .expect("client should build");
        SendGridTransport::with_client(client, base)
    }

    fn request() -> DeliveryRequest {
        let sender = Sender {
            address: "noreply@postmaster.com".to_string(),
            name: "postmaster".to_string(),
        };
        DeliveryRequest::new(
            &sender,
            "Email Confirmation Instructions",
            "a@b.com",
            RenderedDocument::from("<p>Hello A</p>".to_string()),
        )
    }

    /// Serve one HTTP request with a canned response and return the raw
    /// request text.
    async fn serve_once(response: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");
        let base = format!("http://{}", listener.local_addr().expect("local addr"));

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept should succeed");
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.expect("read should succeed");
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                if request_complete(&raw) {
                    break;
                }
            }
            socket
                .write_all(response.as_bytes())
                .await
                .expect("write should succeed");
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&raw).into_owned()
        });

        (base, handle)
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        raw.len() >= header_end + 4 + content_length
    }

    #[test]
    fn endpoint_joins_base_and_path() {
        assert_eq!(
            SendGridTransport::default().endpoint(),
            "https://api.sendgrid.com/v3/mail/send"
        );
        assert_eq!(
            SendGridTransport::new("http://localhost:8080/").endpoint(),
            "http://localhost:8080/v3/mail/send"
        );
    }

    #[test]
    fn mail_body_has_single_html_personalization() {
        let body = mail_body(&request());
        assert_eq!(body["personalizations"][0]["to"][0]["email"], "a@b.com");
        assert_eq!(body["from"]["email"], "noreply@postmaster.com");
        assert_eq!(body["from"]["name"], "postmaster");
        assert_eq!(body["subject"], "Email Confirmation Instructions");
        assert_eq!(body["content"][0]["type"], "text/html");
        assert_eq!(body["content"][0]["value"], "<p>Hello A</p>");
    }

    #[tokio::test]
    async fn accepted_response_yields_receipt() {
        let (base, server) = serve_once(
            "HTTP/1.1 202 Accepted\r\nx-message-id: msg-123\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;

        let receipt = local_transport(&base)
            .send(&request(), &ApiKey::new("SG.test-key"))
            .await
            .expect("send should succeed");

        assert_eq!(receipt.transport, "sendgrid");
        assert_eq!(receipt.status, "202");
        assert_eq!(receipt.message_id.as_deref(), Some("msg-123"));

        let raw = server.await.expect("server task should finish");
        assert!(raw.starts_with("POST /v3/mail/send"));
        assert!(raw.to_ascii_lowercase().contains("authorization: bearer sg.test-key"));
        assert!(raw.contains("\"a@b.com\""));
    }

    #[tokio::test]
    async fn unauthorized_response_is_reported_without_key() {
        let (base, _server) = serve_once(
            "HTTP/1.1 401 Unauthorized\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;

        let err = local_transport(&base)
            .send(&request(), &ApiKey::new("SG.test-key"))
            .await
            .unwrap_err();

        assert_matches!(err, DeliveryError::Unauthorized);
        assert!(!err.to_string().contains("SG.test-key"));
    }

    #[tokio::test]
    async fn bad_request_is_rejected() {
        let (base, _server) = serve_once(
            "HTTP/1.1 400 Bad Request\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;

        let err = local_transport(&base)
            .send(&request(), &ApiKey::new("SG.test-key"))
            .await
            .unwrap_err();

        assert_matches!(err, DeliveryError::Rejected(ref reason) if reason == "HTTP 400");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_network_error() {
        // Bind then drop to obtain a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);

        let err = local_transport(&format!("http://{addr}"))
            .send(&request(), &ApiKey::new("SG.test-key"))
            .await
            .unwrap_err();

        assert_matches!(err, DeliveryError::Network(_));
    }
}
