use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterErrorKind {
    InvalidInput,
    Unavailable,
    Upstream,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterError {
    pub kind: AdapterErrorKind,
    pub message: String,
}

impl AdapterError {
    pub fn new(kind: AdapterErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AdapterError {}

pub fn invalid_input(message: impl Into<String>) -> AdapterError {
    AdapterError::new(AdapterErrorKind::InvalidInput, message)
}

pub fn unavailable(message: impl Into<String>) -> AdapterError {
    AdapterError::new(AdapterErrorKind::Unavailable, message)
}

pub fn upstream_failed(message: impl Into<String>) -> AdapterError {
    AdapterError::new(AdapterErrorKind::Upstream, message)
}
