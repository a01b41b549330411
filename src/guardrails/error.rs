use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardrailErrorKind {
    Authentication,
    InvalidCredentials,
}

/// Rejection raised before a request reaches the planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardrailError {
    pub kind: GuardrailErrorKind,
    pub message: String,
}

impl GuardrailError {
    pub fn new(kind: GuardrailErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for GuardrailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for GuardrailError {}

pub fn authentication_failed(message: impl Into<String>) -> GuardrailError {
    GuardrailError::new(GuardrailErrorKind::Authentication, message)
}

pub fn invalid_credentials(message: impl Into<String>) -> GuardrailError {
    GuardrailError::new(GuardrailErrorKind::InvalidCredentials, message)
}
