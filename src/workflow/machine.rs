use crate::workflow::state::WorkflowState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowNode {
    Initialize,
    QueryDataSources,
    ExecuteTools,
    BuildMessages,
    CallProvider,
    ValidateResponse,
    Finalize,
}

impl WorkflowNode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowNode::Initialize => "initialize",
            WorkflowNode::QueryDataSources => "query_data_sources",
            WorkflowNode::ExecuteTools => "execute_tools",
            WorkflowNode::BuildMessages => "build_messages",
            WorkflowNode::CallProvider => "call_provider",
            WorkflowNode::ValidateResponse => "validate_response",
            WorkflowNode::Finalize => "finalize",
        }
    }
}

/// Transition function of the workflow graph. `None` after `Finalize`.
pub fn next_node(node: WorkflowNode, state: &WorkflowState) -> Option<WorkflowNode> {
    let has_sources = state.specs.enabled_data_sources().next().is_some();
    let has_tools = state.specs.enabled_tools().next().is_some();

    match node {
        WorkflowNode::Initialize if has_sources => Some(WorkflowNode::QueryDataSources),
        WorkflowNode::Initialize | WorkflowNode::QueryDataSources if has_tools => {
            Some(WorkflowNode::ExecuteTools)
        }
        WorkflowNode::Initialize | WorkflowNode::QueryDataSources | WorkflowNode::ExecuteTools => {
            Some(WorkflowNode::BuildMessages)
        }
        WorkflowNode::BuildMessages => Some(WorkflowNode::CallProvider),
        WorkflowNode::CallProvider => Some(WorkflowNode::ValidateResponse),
        WorkflowNode::ValidateResponse => {
            if state.is_validated || state.attempts_exhausted() {
                Some(WorkflowNode::Finalize)
            } else {
                Some(WorkflowNode::BuildMessages)
            }
        }
        WorkflowNode::Finalize => None,
    }
}
