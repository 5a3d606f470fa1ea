//! Typed domain records decoded from raw events.

use serde::{Deserialize, Serialize};

use crate::decode::{self, FieldKind, FieldRule, SchemaError};
use crate::types::RawEvent;

/// A record a notification can be rendered from.
///
/// Serialization is the template context, so every field a template uses
/// must be part of the serialized form.
pub trait DomainRecord: Serialize + Sized {
    /// Decode from a verified event body.
    fn decode(event: &RawEvent) -> Result<Self, SchemaError>;

    /// Address the rendered notification is delivered to.
    fn recipient(&self) -> &str;
}

// ---------------------------------------------------------------------------
// UserRecord
// ---------------------------------------------------------------------------

/// The account a user-lifecycle event is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub uid: Option<String>,
    pub email: String,
    pub name: Option<String>,
    pub role: Option<String>,
    pub level: Option<i64>,
    pub otp: Option<bool>,
    pub state: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

const USER_FIELDS: &[FieldRule] = &[
    FieldRule::optional("uid", FieldKind::Text),
    FieldRule::required("email", FieldKind::Email),
    FieldRule::optional("name", FieldKind::Text),
    FieldRule::optional("role", FieldKind::Text),
    FieldRule::optional("level", FieldKind::Integer),
    FieldRule::optional("otp", FieldKind::Boolean),
    FieldRule::optional("state", FieldKind::Text),
    FieldRule::optional("created_at", FieldKind::Text),
    FieldRule::optional("updated_at", FieldKind::Text),
];

impl UserRecord {
    /// Decode a user object found at `scope` inside an event.
    pub fn decode_at(source: &RawEvent, scope: &str) -> Result<Self, SchemaError> {
        let fields = decode::apply(USER_FIELDS, source, scope)?;
        Ok(Self {
            uid: fields.text("uid"),
            email: fields.required_text("email")?,
            name: fields.text("name"),
            role: fields.text("role"),
            level: fields.integer("level"),
            otp: fields.boolean("otp"),
            state: fields.text("state"),
            created_at: fields.text("created_at"),
            updated_at: fields.text("updated_at"),
        })
    }
}

// ---------------------------------------------------------------------------
// EmailConfirmation
// ---------------------------------------------------------------------------

/// Body of a `user.email.confirmation.token` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailConfirmation {
    pub user: UserRecord,
    /// Confirmation token the recipient sends back to verify the address.
    pub token: Option<String>,
}

const EMAIL_CONFIRMATION_FIELDS: &[FieldRule] = &[
    FieldRule::required("user", FieldKind::Object),
    FieldRule::optional("token", FieldKind::Text),
];

impl DomainRecord for EmailConfirmation {
    fn decode(event: &RawEvent) -> Result<Self, SchemaError> {
        let fields = decode::apply(EMAIL_CONFIRMATION_FIELDS, event, "")?;
        let user = fields.required_object("user")?;
        Ok(Self {
            user: UserRecord::decode_at(user, &fields.path("user"))?,
            token: fields.text("token"),
        })
    }

    fn recipient(&self) -> &str {
        &self.user.email
    }
}
