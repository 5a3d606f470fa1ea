/// Startup configuration failure.
///
/// Always fatal: the worker refuses to start rather than failing every
/// message later. Variants carry the variable name only, never its value, so
/// secrets cannot leak through the error text.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset or blank.
    #[error("Missing required configuration: {0}")]
    Missing(&'static str),

    /// A variable is set but cannot be parsed.
    #[error("Invalid configuration for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}
