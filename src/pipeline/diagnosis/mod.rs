pub mod types;
pub mod prompt;
pub mod parser;
pub mod classifier;
pub mod advice;
pub mod orchestrator;

pub use types::*;
pub use prompt::*;
pub use parser::*;
pub use classifier::*;
pub use advice::*;
pub use orchestrator::*;

use std::fmt;

use thiserror::Error;

/// Which remote collaborator a transport failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Classification,
    Advice,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classification => write!(f, "classification service"),
            Self::Advice => write!(f, "advice service"),
        }
    }
}

/// Failures of one diagnosis run. Low confidence is not an error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiagnosisError {
    #[error("Request to {service} failed: {message}")]
    Transport { service: Service, message: String },

    #[error("Malformed classification response: {0}")]
    MalformedResponse(String),

    #[error("Cannot submit: {0}")]
    Precondition(String),
}

impl DiagnosisError {
    pub(crate) fn transport(service: Service, message: impl Into<String>) -> Self {
        Self::Transport {
            service,
            message: message.into(),
        }
    }

    /// Maps a reqwest failure the way every remote call reports it.
    pub(crate) fn from_reqwest(service: Service, url: &str, e: &reqwest::Error) -> Self {
        let message = if e.is_connect() {
            format!("not reachable at {url}")
        } else if e.is_timeout() {
            "request timed out".to_string()
        } else {
            e.to_string()
        };
        Self::transport(service, message)
    }

    /// Non-success status, with the service's own error message when it sent one.
    pub(crate) fn from_status(service: Service, status: reqwest::StatusCode, body: &str) -> Self {
        let message = match service_error_message(body) {
            Some(detail) => format!("status {}: {detail}", status.as_u16()),
            None => format!("status {}", status.as_u16()),
        };
        Self::transport(service, message)
    }
}

/// Pull `error` (string) or `error.message` out of an error body.
fn service_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    let message = error
        .as_str()
        .or_else(|| error.get("message").and_then(|m| m.as_str()))?;
    Some(message.trim().to_string()).filter(|m| !m.is_empty())
}
