use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    planner::ExecutionSpec,
    retrieval::RetrievedDocument,
    types::{BrainRequest, ChatMessage, now_rfc3339},
};

pub const DEFAULT_MAX_VALIDATION_RUNS: u32 = 5;

/// Prefix that marks `final_content` as a generation failure rather than an answer.
pub const ERROR_MARKER: &str = "Error:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::CompletedWithErrors => "completed_with_errors",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::CompletedWithErrors
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceResult {
    pub source: String,
    #[serde(default)]
    pub results: Vec<RetrievedDocument>,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DataSourceResult {
    pub fn retrieved(source: impl Into<String>, results: Vec<RetrievedDocument>) -> Self {
        Self {
            source: source.into(),
            count: results.len(),
            results,
            error: None,
        }
    }

    pub fn failed(source: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            results: Vec::new(),
            count: 0,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Executed,
    Failed,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool: String,
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn executed(tool: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            status: ToolStatus::Executed,
            result: Some(result.into()),
            error: None,
        }
    }

    pub fn failed(tool: impl Into<String>, status: ToolStatus, error: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            status,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Mutable record of one in-flight execution, owned by the task driving it.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    pub execution_id: String,
    pub request: BrainRequest,
    pub specs: ExecutionSpec,
    /// Prior turns of the session, oldest first.
    pub history: Vec<ChatMessage>,
    pub data_source_results: Vec<DataSourceResult>,
    pub tool_results: Vec<ToolResult>,
    pub messages: Vec<ChatMessage>,
    pub llm_response: Option<Value>,
    pub llm_succeeded: bool,
    pub final_content: String,
    pub errors: Vec<String>,
    pub execution_steps: Vec<String>,
    pub status: WorkflowStatus,
    pub start_time: String,
    pub end_time: Option<String>,
    pub validation_attempts: u32,
    pub max_validation_runs: u32,
    pub validation_feedback: Option<String>,
    pub is_validated: bool,
    pub confidence_score: f64,
    pub fallback_applied: bool,
    started: Instant,
    finished: Option<Instant>,
}

impl WorkflowState {
    pub fn new(
        request: BrainRequest,
        specs: ExecutionSpec,
        history: Vec<ChatMessage>,
        max_validation_runs: u32,
    ) -> Self {
        Self {
            execution_id: Uuid::now_v7().to_string(),
            request,
            specs,
            history,
            data_source_results: Vec::new(),
            tool_results: Vec::new(),
            messages: Vec::new(),
            llm_response: None,
            llm_succeeded: false,
            final_content: String::new(),
            errors: Vec::new(),
            execution_steps: Vec::new(),
            status: WorkflowStatus::Running,
            start_time: now_rfc3339(),
            end_time: None,
            validation_attempts: 0,
            max_validation_runs: max_validation_runs.max(1),
            validation_feedback: None,
            is_validated: false,
            confidence_score: 0.0,
            fallback_applied: false,
            started: Instant::now(),
            finished: None,
        }
    }

    pub fn record_step(&mut self, step: &str) {
        self.execution_steps.push(step.to_string());
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn content_is_usable(&self) -> bool {
        !self.final_content.trim().is_empty() && !self.final_content.starts_with(ERROR_MARKER)
    }

    pub fn is_retry(&self) -> bool {
        self.validation_attempts > 0 && self.validation_feedback.is_some()
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.validation_attempts >= self.max_validation_runs
    }

    pub fn mark_finished(&mut self, status: WorkflowStatus) {
        self.status = status;
        self.end_time = Some(now_rfc3339());
        self.finished = Some(Instant::now());
    }

    pub fn duration_seconds(&self) -> f64 {
        self.finished
            .unwrap_or_else(Instant::now)
            .duration_since(self.started)
            .as_secs_f64()
    }
}
