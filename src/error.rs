use miette::{Diagnostic, Result};
use thiserror::Error;

/// Main error type for the application
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("Environment error: {0}")]
    #[diagnostic(code(meeting_reminder::environment))]
    Environment(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(meeting_reminder::config))]
    Config(String),

    #[error("Authentication error: {0}")]
    #[diagnostic(code(meeting_reminder::auth))]
    Auth(String),

    #[error("Calendar fetch error: {0}")]
    #[diagnostic(code(meeting_reminder::fetch))]
    Fetch(String),

    #[error("Malformed event: {0}")]
    #[diagnostic(code(meeting_reminder::malformed_event))]
    MalformedEvent(#[from] SkipReason),

    #[error("Reminder display error: {0}")]
    #[diagnostic(code(meeting_reminder::display))]
    Display(String),

    #[error(transparent)]
    #[diagnostic(code(meeting_reminder::io))]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(meeting_reminder::serialization))]
    Serialization(String),

    #[error("Other error: {0}")]
    #[diagnostic(code(meeting_reminder::other))]
    Other(String),
}

/// Why a fetched event was dropped before matching
#[derive(Debug, Error)]
pub enum SkipReason {
    #[error("missing 'subject' field")]
    MissingSubject,

    #[error("missing 'start.dateTime' field")]
    MissingStart,

    #[error("unparseable start time '{value}': {source}")]
    InvalidStart {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Type alias for Result with our Error type
pub type AppResult<T> = Result<T, Error>;

/// Helper to create environment errors
pub fn env_error(var: &str) -> Error {
    Error::Environment(format!("Missing environment variable: {}", var))
}

/// Helper to create configuration errors
pub fn config_error(message: &str) -> Error {
    Error::Config(message.to_string())
}

/// Helper to create authentication errors
pub fn auth_error(message: &str) -> Error {
    Error::Auth(message.to_string())
}

/// Helper to create calendar fetch errors
pub fn fetch_error(message: &str) -> Error {
    Error::Fetch(message.to_string())
}

/// Helper to create reminder display errors
pub fn display_error(message: &str) -> Error {
    Error::Display(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helpers_pick_variant() {
        assert!(matches!(env_error("CLIENT_ID"), Error::Environment(m) if m.contains("CLIENT_ID")));
        assert!(matches!(fetch_error("boom"), Error::Fetch(m) if m == "boom"));
        assert!(matches!(display_error("x"), Error::Display(_)));
        assert!(matches!(config_error("bad"), Error::Config(m) if m == "bad"));
        assert!(matches!(auth_error("expired"), Error::Auth(m) if m == "expired"));
    }

    #[test]
    fn test_library_errors_convert() {
        let io: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(io, Error::Io(_)));

        let json: Error = serde_json::from_str::<u32>("\"x\"").unwrap_err().into();
        assert!(matches!(json, Error::Serialization(_)));
    }

    #[test]
    fn test_skip_reason_converts() {
        let err: Error = SkipReason::MissingSubject.into();
        assert_eq!(err.to_string(), "Malformed event: missing 'subject' field");
    }
}
