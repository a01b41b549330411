use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::{
    planner::{error::PlanError, spec::ExecutionSpec},
    types::BrainRequest,
};

/// What a reasoning step proposes for a spec.
#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningOutcome {
    pub optimized_specs: Option<ExecutionSpec>,
    pub confidence: f64,
    pub notes: Map<String, Value>,
}

#[async_trait]
pub trait ReasoningPort: Send + Sync {
    async fn optimize(
        &self,
        spec: &ExecutionSpec,
        request: &BrainRequest,
    ) -> Result<ReasoningOutcome, PlanError>;
}

const HEURISTIC_CONFIDENCE: f64 = 0.75;
const CHEAPER_MODEL_WORD_LIMIT: usize = 50;

/// Annotates the spec without changing it.
#[derive(Debug, Default, Clone)]
pub struct HeuristicReasoner;

#[async_trait]
impl ReasoningPort for HeuristicReasoner {
    async fn optimize(
        &self,
        spec: &ExecutionSpec,
        request: &BrainRequest,
    ) -> Result<ReasoningOutcome, PlanError> {
        let mut notes = Map::new();
        if let Some(provider) = &spec.provider {
            notes.insert(
                "provider".to_string(),
                json!({
                    "original_provider": provider.provider_type,
                    "can_use_cheaper":
                        request.message.split_whitespace().count() < CHEAPER_MODEL_WORD_LIMIT,
                }),
            );
        }
        if !spec.data_sources.is_empty() {
            notes.insert(
                "data_sources".to_string(),
                json!({"count": spec.data_sources.len()}),
            );
        }
        if !spec.tools.is_empty() {
            notes.insert("tools".to_string(), json!({"count": spec.tools.len()}));
        }

        Ok(ReasoningOutcome {
            optimized_specs: Some(spec.clone()),
            confidence: HEURISTIC_CONFIDENCE,
            notes,
        })
    }
}
