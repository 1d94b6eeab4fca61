//! Error types for the chat core.
//!
//! Nothing in the core aborts the process. The worker turns these into [`AppEvent::TurnFailed`](crate::events::AppEvent)
//! so the owning loop can show them and keep running.
//!
//! | Error | Retryable | Typical cause |
//! |-------|-----------|---------------|
//! | `Config` | No | `hosts.json` missing, unreadable or malformed |
//! | `Auth` | Yes | Identity endpoint rejected the OAuth token |
//! | `Transport` | Yes | DNS, connect refused, timeout |
//!
//! Error envelopes inside a completion stream are not errors at this level:
//! the decoder surfaces them as the assistant's reply.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChatError>;

/// Failures of the credential, request and transport layers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Local credential source is unreadable or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Identity endpoint refused or returned garbage.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Connection failure, timeout or broken body.
    #[error("Network error: {0}")]
    Transport(String),
}

impl ChatError {
    /// Whether resubmitting the same turn can succeed without user action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChatError::Auth(_) | ChatError::Transport(_))
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ChatError::Transport(format!("request timed out: {}", err))
        } else {
            ChatError::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_variants() {
        assert!(!ChatError::Config("missing".into()).is_retryable());
        assert!(ChatError::Auth("401".into()).is_retryable());
        assert!(ChatError::Transport("refused".into()).is_retryable());
    }

    #[test]
    fn test_display_includes_detail() {
        let err = ChatError::Auth("token request failed: 403".into());
        assert_eq!(err.to_string(), "Authentication failed: token request failed: 403");
    }
}
