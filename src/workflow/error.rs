use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowErrorKind {
    Retrieval,
    Tool,
    Generation,
    ValidationInternal,
    MessageAssembly,
    Timeout,
    Cancelled,
}

/// Failure of a single workflow node. The driver turns these into state
/// mutations; they never escape `execute_plan`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowError {
    pub kind: WorkflowErrorKind,
    pub message: String,
}

impl WorkflowError {
    pub fn new(kind: WorkflowErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for WorkflowError {}

pub fn retrieval_failed(message: impl Into<String>) -> WorkflowError {
    WorkflowError::new(WorkflowErrorKind::Retrieval, message)
}

pub fn tool_failed(message: impl Into<String>) -> WorkflowError {
    WorkflowError::new(WorkflowErrorKind::Tool, message)
}

pub fn generation_failed(message: impl Into<String>) -> WorkflowError {
    WorkflowError::new(WorkflowErrorKind::Generation, message)
}

pub fn validation_internal(message: impl Into<String>) -> WorkflowError {
    WorkflowError::new(WorkflowErrorKind::ValidationInternal, message)
}

pub fn message_assembly_failed(message: impl Into<String>) -> WorkflowError {
    WorkflowError::new(WorkflowErrorKind::MessageAssembly, message)
}

pub fn timed_out(operation: &str, after_ms: u128) -> WorkflowError {
    WorkflowError::new(
        WorkflowErrorKind::Timeout,
        format!("{operation} timed out after {after_ms}ms"),
    )
}

pub fn cancelled(operation: &str) -> WorkflowError {
    WorkflowError::new(
        WorkflowErrorKind::Cancelled,
        format!("{operation} cancelled by caller"),
    )
}
