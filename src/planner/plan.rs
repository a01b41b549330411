use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::planner::spec::ExecutionSpec;

/// The resolved spec handed to the workflow engine, with annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub plan_id: String,
    pub original_specs: ExecutionSpec,
    pub optimized_specs: Option<ExecutionSpec>,
    pub reasoning_applied: bool,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning_notes: Map<String, Value>,
    pub estimated_cost: f64,
    pub estimated_latency: f64,
}

impl ExecutionPlan {
    /// Spec the workflow should run: the optimized one when present.
    pub fn execution_specs(&self) -> &ExecutionSpec {
        self.optimized_specs.as_ref().unwrap_or(&self.original_specs)
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            plan_id: self.plan_id.clone(),
            strategy: self
                .original_specs
                .processing
                .execution_strategy
                .as_str()
                .to_string(),
            reasoning_applied: self.reasoning_applied,
            confidence: self.confidence,
            estimated_cost: self.estimated_cost,
            estimated_latency: self.estimated_latency,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub plan_id: String,
    pub strategy: String,
    pub reasoning_applied: bool,
    pub confidence: f64,
    pub estimated_cost: f64,
    pub estimated_latency: f64,
}
