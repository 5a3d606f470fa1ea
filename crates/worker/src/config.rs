use std::path::PathBuf;

use postmaster_core::{ApiKey, ConfigError};
use postmaster_events::broker::DEFAULT_EXCHANGE;
use postmaster_events::delivery::sendgrid::{SendGridTransport, DEFAULT_API_BASE};
use postmaster_events::delivery::smtp::{
    SmtpConfig, SmtpTransport, DEFAULT_SMTP_PORT, DEFAULT_SMTP_USER,
};
use postmaster_events::token::DEFAULT_LEEWAY_SECS;
use postmaster_events::{BrokerConfig, MailTransport, Sender, TokenConfig, TrustMaterial};
use postmaster_pipeline::MailerConfig;

pub const DEFAULT_SENDER_EMAIL: &str = "noreply@postmaster.com";
pub const DEFAULT_SENDER_NAME: &str = "postmaster";
pub const DEFAULT_TEMPLATES_DIR: &str = "templates";

/// Outbound transport selected at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    /// SendGrid v3 HTTP API rooted at `api_base`.
    SendGrid { api_base: String },
    Smtp(SmtpConfig),
}

impl TransportConfig {
    pub fn build(&self) -> MailTransport {
        match self {
            Self::SendGrid { api_base } => MailTransport::SendGrid(SendGridTransport::new(api_base)),
            Self::Smtp(config) => MailTransport::Smtp(SmtpTransport::new(config.clone())),
        }
    }
}

/// Worker configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub broker: BrokerConfig,
    pub token: TokenConfig,
    pub mailer: MailerConfig,
    pub transport: TransportConfig,
    pub templates_dir: PathBuf,
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var             | Default                    |
    /// |---------------------|----------------------------|
    /// | `SENDGRID_API_KEY`  | required                   |
    /// | `RABBITMQ_URL`      | required                   |
    /// | `JWT_PUBLIC_KEY`    | required unless `JWT_SECRET` |
    /// | `JWT_SECRET`        | required unless `JWT_PUBLIC_KEY` |
    /// | `SENDER_EMAIL`      | `noreply@postmaster.com`   |
    /// | `SENDER_NAME`       | `postmaster`               |
    /// | `RABBITMQ_EXCHANGE` | `barong.events.system`     |
    /// | `JWT_ISSUER`        | unset                      |
    /// | `JWT_AUDIENCE`      | unset                      |
    /// | `JWT_LEEWAY_SECS`   | `60`                       |
    /// | `TEMPLATES_DIR`     | `templates`                |
    /// | `SMTP_HOST`         | unset (use the HTTP API)   |
    /// | `SMTP_PORT`         | `587`                      |
    /// | `SMTP_USER`         | `apikey`                   |
    /// | `SENDGRID_API_URL`  | `https://api.sendgrid.com` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |name: &'static str| var(name).ok_or(ConfigError::Missing(name));

        let credential = ApiKey::new(required("SENDGRID_API_KEY")?);
        let sender = Sender {
            address: var("SENDER_EMAIL").unwrap_or_else(|| DEFAULT_SENDER_EMAIL.into()),
            name: var("SENDER_NAME").unwrap_or_else(|| DEFAULT_SENDER_NAME.into()),
        };

        let broker = BrokerConfig {
            uri: required("RABBITMQ_URL")?,
            exchange: var("RABBITMQ_EXCHANGE").unwrap_or_else(|| DEFAULT_EXCHANGE.into()),
        };

        let trust = match (var("JWT_PUBLIC_KEY"), var("JWT_SECRET")) {
            (Some(key), _) => TrustMaterial::rsa_public_key(&key)?,
            (None, Some(secret)) => TrustMaterial::SharedSecret(secret.into_bytes()),
            (None, None) => return Err(ConfigError::Missing("JWT_PUBLIC_KEY or JWT_SECRET")),
        };
        let token = TokenConfig {
            trust,
            issuer: var("JWT_ISSUER"),
            audience: var("JWT_AUDIENCE"),
            leeway_secs: parse_or("JWT_LEEWAY_SECS", var("JWT_LEEWAY_SECS"), DEFAULT_LEEWAY_SECS)?,
        };

        let transport = match var("SMTP_HOST") {
            Some(host) => TransportConfig::Smtp(SmtpConfig {
                host,
                port: parse_or("SMTP_PORT", var("SMTP_PORT"), DEFAULT_SMTP_PORT)?,
                username: var("SMTP_USER").unwrap_or_else(|| DEFAULT_SMTP_USER.into()),
            }),
            None => TransportConfig::SendGrid {
                api_base: var("SENDGRID_API_URL").unwrap_or_else(|| DEFAULT_API_BASE.into()),
            },
        };

        let templates_dir = var("TEMPLATES_DIR")
            .unwrap_or_else(|| DEFAULT_TEMPLATES_DIR.into())
            .into();

        Ok(Self {
            broker,
            token,
            mailer: MailerConfig { credential, sender },
            transport,
            templates_dir,
        })
    }
}

fn parse_or<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
