use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanErrorKind {
    InvalidRequest,
    Reasoning,
    Rejected,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanError {
    pub kind: PlanErrorKind,
    pub message: String,
    pub issues: Vec<String>,
}

impl PlanError {
    pub fn new(kind: PlanErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            issues: Vec::new(),
        }
    }
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PlanError {}

pub fn invalid_request(message: impl Into<String>) -> PlanError {
    PlanError::new(PlanErrorKind::InvalidRequest, message)
}

pub fn reasoning_failed(message: impl Into<String>) -> PlanError {
    PlanError::new(PlanErrorKind::Reasoning, message)
}

pub fn planning_cancelled(message: impl Into<String>) -> PlanError {
    PlanError::new(PlanErrorKind::Cancelled, message)
}

pub fn plan_rejected(issues: Vec<String>) -> PlanError {
    PlanError {
        kind: PlanErrorKind::Rejected,
        message: format!("Reasoning validation failed: {}", issues.join("; ")),
        issues,
    }
}
