//! Notification routes.
//!
//! A route ties one broker routing key to the record its events decode into
//! and the template and subject used to notify the recipient.

use postmaster_core::{DomainRecord, EmailConfirmation};

pub trait Notification {
    /// Record the event body decodes into.
    type Record: DomainRecord;

    /// Broker routing key the route's queue is bound to.
    const ROUTING_KEY: &'static str;
    const TEMPLATE_ID: &'static str;
    const SUBJECT: &'static str;
}

/// Address confirmation sent after sign-up.
#[derive(Debug, Clone, Copy)]
pub struct EmailConfirmationNotice;

impl Notification for EmailConfirmationNotice {
    type Record = EmailConfirmation;

    const ROUTING_KEY: &'static str = "user.email.confirmation.token";
    const TEMPLATE_ID: &'static str = "sign_up";
    const SUBJECT: &'static str = "Email Confirmation Instructions";
}
