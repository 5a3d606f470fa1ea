//! Postmaster event intake and notification delivery.
//!
//! - [`broker`]: AMQP queue subscription ([`Subscription`]).
//! - [`envelope`]: token extraction from message bodies.
//! - [`token`]: signed event token verification ([`TokenVerifier`]).
//! - [`delivery`]: outbound delivery ([`Dispatcher`], SendGrid and SMTP
//!   transports).

pub mod broker;
pub mod delivery;
pub mod envelope;
pub mod token;

pub use broker::{BrokerConfig, BrokerError, InboundMessage, Subscription};
pub use delivery::{
    DeliveryError, DeliveryRequest, DeliveryTransport, Dispatcher, MailTransport, Receipt, Sender,
};
pub use envelope::{extract_token, EnvelopeError};
pub use token::{TokenConfig, TokenError, TokenVerifier, TrustMaterial};
