pub mod cache;
pub mod engine;
pub mod error;
pub mod guard;
pub mod machine;
pub mod messages;
pub mod result;
pub mod state;
pub mod validator;

pub use engine::{
    FALLBACK_MESSAGES, WorkflowConfig, WorkflowEngine, WorkflowTelemetryEvent,
    WorkflowTelemetryHook,
};
pub use error::{WorkflowError, WorkflowErrorKind};
pub use machine::{WorkflowNode, next_node};
pub use result::{ExecutionMetadata, ExecutionResult};
pub use state::{DataSourceResult, ToolResult, ToolStatus, WorkflowState, WorkflowStatus};
pub use validator::{
    ACCEPTANCE_THRESHOLD, HeuristicResponseValidator, ResponseValidator, ValidationResult,
};
