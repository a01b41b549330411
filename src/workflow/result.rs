use serde::{Deserialize, Serialize};

use crate::workflow::state::{WorkflowState, WorkflowStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    pub execution_steps: Vec<String>,
    pub errors: Vec<String>,
    pub duration_seconds: f64,
    pub confidence_score: f64,
    pub validation_attempts: u32,
    pub start_time: String,
    #[serde(default)]
    pub end_time: Option<String>,
}

/// What the workflow hands back for one executed plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub content: String,
    pub execution_id: String,
    pub status: WorkflowStatus,
    pub confidence: f64,
    pub metadata: ExecutionMetadata,
}

impl From<&WorkflowState> for ExecutionResult {
    fn from(state: &WorkflowState) -> Self {
        let success = state.llm_succeeded
            && state.content_is_usable()
            && state.status.is_completed()
            && !state.fallback_applied;

        Self {
            success,
            content: state.final_content.clone(),
            execution_id: state.execution_id.clone(),
            status: state.status,
            confidence: state.confidence_score,
            metadata: ExecutionMetadata {
                execution_steps: state.execution_steps.clone(),
                errors: state.errors.clone(),
                duration_seconds: state.duration_seconds(),
                confidence_score: state.confidence_score,
                validation_attempts: state.validation_attempts,
                start_time: state.start_time.clone(),
                end_time: state.end_time.clone(),
            },
        }
    }
}
