//! Postmaster shared types.
//!
//! - [`types`]: verified [`Claims`], the untyped [`RawEvent`] body, the
//!   [`RenderedDocument`] and the redacted [`ApiKey`] credential.
//! - [`decode`]: coercion-table decoding of loosely typed events.
//! - [`record`]: typed domain records rendered into notifications.
//! - [`error`]: startup configuration errors.

pub mod decode;
pub mod error;
pub mod record;
pub mod types;

pub use decode::SchemaError;
pub use error::ConfigError;
pub use record::{DomainRecord, EmailConfirmation, UserRecord};
pub use types::{ApiKey, Claims, RawEvent, RenderedDocument};
