use thiserror::Error;

/// Errors surfaced by the selection wizard.
///
/// None of these are fatal: the state is left unchanged, so the caller can
/// show the message and let the user retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Cannot {action} while {from}")]
    InvalidTransition { from: &'static str, action: &'static str },
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl SessionError {
    pub fn validation(message: impl Into<String>) -> Self {
        SessionError::Validation(message.into())
    }

    /// Wrap a store failure, keeping the whole context chain in the message.
    pub fn persistence(error: &anyhow::Error) -> Self {
        SessionError::Persistence(format!("{error:#}"))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Persistence(_))
    }
}
