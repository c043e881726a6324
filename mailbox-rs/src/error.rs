use thiserror::Error;

use crate::provisioning::SetupStep;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SMTP protocol error: {0}")]
    SmtpProtocol(String),

    #[error("Relay error: {0}")]
    Relay(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The provider answered with `success = false` and at least one error entry.
    #[error("{provider} API error: {message}")]
    Provider {
        provider: &'static str,
        message: String,
        codes: Vec<i64>,
    },

    /// The provider answered with something that is not a usable envelope.
    #[error("Unexpected response from {provider}: {detail}")]
    UnexpectedResponse {
        provider: &'static str,
        detail: String,
    },

    #[error("{0} not configured")]
    NotConfigured(String),

    #[error("Setup incomplete, missing: {}", .missing.join(", "))]
    SetupIncomplete { missing: Vec<String> },

    #[error("Setup aborted at step '{step}': {source}")]
    StepFailed {
        step: SetupStep,
        #[source]
        source: Box<MailError>,
    },

    #[error("Setup already in progress for {0}")]
    SetupInProgress(String),

    #[error("Resource not found: {0}")]
    NotFound(String),
}

impl MailError {
    /// Wrap an error with the provisioning step it aborted.
    pub fn at_step(self, step: SetupStep) -> Self {
        MailError::StepFailed {
            step,
            source: Box::new(self),
        }
    }
}

impl From<::config::ConfigError> for MailError {
    fn from(e: ::config::ConfigError) -> Self {
        MailError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MailError>;
