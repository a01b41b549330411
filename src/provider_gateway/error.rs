use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayErrorKind {
    InvalidRequest,
    NotConfigured,
    Authentication,
    Authorization,
    RateLimited,
    Timeout,
    BudgetExceeded,
    BackendTransient,
    BackendPermanent,
    ProtocolViolation,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub message: String,
    pub retryable: bool,
    pub provider_type: Option<String>,
    pub http_status: Option<u16>,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: matches!(
                kind,
                GatewayErrorKind::RateLimited
                    | GatewayErrorKind::Timeout
                    | GatewayErrorKind::BackendTransient
            ),
            provider_type: None,
            http_status: None,
        }
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_provider(mut self, provider_type: impl Into<String>) -> Self {
        self.provider_type = Some(provider_type.into());
        self
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.provider_type, self.http_status) {
            (Some(provider), Some(status)) => {
                write!(f, "{} (provider={}, status={})", self.message, provider, status)
            }
            (Some(provider), None) => write!(f, "{} (provider={})", self.message, provider),
            (None, Some(status)) => write!(f, "{} (status={})", self.message, status),
            (None, None) => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for GatewayError {}

pub fn invalid_request(message: impl Into<String>) -> GatewayError {
    GatewayError::new(GatewayErrorKind::InvalidRequest, message).with_retryable(false)
}

pub fn not_configured(message: impl Into<String>) -> GatewayError {
    GatewayError::new(GatewayErrorKind::NotConfigured, message).with_retryable(false)
}

pub fn internal_error(message: impl Into<String>) -> GatewayError {
    GatewayError::new(GatewayErrorKind::Internal, message).with_retryable(false)
}

pub fn map_http_error(status: u16, provider_type: &str, body: &str) -> GatewayError {
    let normalized_body = body.chars().take(240).collect::<String>();

    let mut err = match status {
        401 => GatewayError::new(GatewayErrorKind::Authentication, "authentication failed"),
        403 => GatewayError::new(GatewayErrorKind::Authorization, "authorization failed"),
        408 | 429 => GatewayError::new(
            GatewayErrorKind::RateLimited,
            format!("provider returned status {}", status),
        ),
        400..=499 => GatewayError::new(
            GatewayErrorKind::InvalidRequest,
            format!("provider returned status {}", status),
        ),
        _ => GatewayError::new(
            GatewayErrorKind::BackendTransient,
            format!("provider returned status {}", status),
        ),
    };

    err = err.with_provider(provider_type).with_http_status(status);
    if !normalized_body.is_empty() {
        err.message = format!("{}: {}", err.message, normalized_body);
    }
    err
}
