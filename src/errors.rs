//! Error types for the console core

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConsoleError>;

/// Uniform classification of everything that can go wrong talking to one backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection-level failure (refused, reset, DNS)
    #[error("network error: {0}")]
    Network(String),

    /// No response within the descriptor's budget
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Non-2xx response
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Success response whose body was not the expected JSON
    #[error("unexpected response body: {0}")]
    Parse(String),
}

impl TransportError {
    /// Whether a caller-side retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network(_) | TransportError::Timeout(_) => true,
            TransportError::Http { status, .. } => *status == 429 || *status >= 500,
            TransportError::Parse(_) => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("settings error: {0}")]
    Settings(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// Every fetch strategy for a list view failed
    #[error("failed to load {entity} after {} attempt(s): {}", .attempts.len(), summarize(.attempts))]
    FetchFailed {
        entity: String,
        attempts: Vec<TransportError>,
    },
}

impl ConsoleError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ConsoleError::Transport(err) => err.is_retryable(),
            ConsoleError::FetchFailed { attempts, .. } => {
                attempts.is_empty() || attempts.iter().any(TransportError::is_retryable)
            }
            _ => false,
        }
    }
}

fn summarize(attempts: &[TransportError]) -> String {
    match attempts.last() {
        Some(last) => last.to_string(),
        None => "no strategies configured".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(TransportError::Network("refused".into()).is_retryable());
        assert!(TransportError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(TransportError::Http { status: 503, body: String::new() }.is_retryable());
        assert!(TransportError::Http { status: 429, body: String::new() }.is_retryable());
        assert!(!TransportError::Http { status: 404, body: String::new() }.is_retryable());
        assert!(!TransportError::Parse("bad".into()).is_retryable());
    }

    #[test]
    fn test_fetch_failed_message_uses_last_attempt() {
        let err = ConsoleError::FetchFailed {
            entity: "students".to_string(),
            attempts: vec![
                TransportError::Http { status: 404, body: "no pages".into() },
                TransportError::Timeout(Duration::from_millis(250)),
            ],
        };

        let message = err.to_string();
        assert!(message.contains("students"));
        assert!(message.contains("2 attempt(s)"));
        assert!(message.contains("250ms"));
        assert!(err.is_retryable());
    }
}
