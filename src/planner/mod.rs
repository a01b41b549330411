pub mod error;
pub mod estimators;
pub mod plan;
pub mod reasoning;
pub mod runtime;
pub mod spec;

pub use error::{PlanError, PlanErrorKind};
pub use estimators::{CostEstimator, LatencyEstimator};
pub use plan::{ExecutionPlan, PlanSummary};
pub use reasoning::{HeuristicReasoner, ReasoningOutcome, ReasoningPort};
pub use runtime::{Planner, validate_plan};
pub use spec::{
    AgentMessageContext, DataSourceRequest, ExecutionSpec, ExecutionStrategy, HistoryEntry,
    ProcessingPolicy, ProviderRequest, ToolRequest,
};
