use std::sync::Arc;

use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use validator::Validate;

use crate::{
    evaluation::{LatencyStats, LatencyTracker},
    planner::{
        error::{
            PlanError, PlanErrorKind, invalid_request, plan_rejected, planning_cancelled,
            reasoning_failed,
        },
        estimators::estimate_or_default,
        plan::ExecutionPlan,
        reasoning::{ReasoningOutcome, ReasoningPort},
        spec::{ExecutionSpec, ExecutionStrategy, canonicalize_json},
    },
    types::BrainRequest,
};

/// Reasoning confidence below which an applied plan is refused.
pub const MIN_REASONING_CONFIDENCE: f64 = 0.3;

pub struct Planner {
    reasoner: Arc<dyn ReasoningPort>,
    latency: Arc<LatencyTracker>,
}

impl Planner {
    pub fn new(reasoner: Arc<dyn ReasoningPort>, latency: Arc<LatencyTracker>) -> Self {
        Self { reasoner, latency }
    }

    /// Produces the plan for one request. Reasoning failures never escape:
    /// they degrade to the direct plan. Malformed input and cancellation are
    /// errors.
    pub async fn plan(
        &self,
        spec: &ExecutionSpec,
        request: &BrainRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionPlan, PlanError> {
        if request.message.trim().is_empty() {
            return Err(invalid_request("request message cannot be empty"));
        }
        if request.user_context.user_id.trim().is_empty() {
            return Err(invalid_request("request user context requires a user_id"));
        }
        spec.validate()
            .map_err(|errors| invalid_request(format!("invalid execution spec: {}", errors)))?;

        let history = self.latency.statistics().await;
        let strategy = spec.processing.execution_strategy;
        let plan = match strategy {
            ExecutionStrategy::Direct => {
                let mut notes = Map::new();
                notes.insert("strategy".to_string(), json!("direct"));
                notes.insert(
                    "message".to_string(),
                    json!("Skipped reasoning as requested"),
                );
                direct_plan(spec, request, history.as_ref(), notes)
            }
            ExecutionStrategy::Reasoned => match self.reason(spec, request, cancel).await {
                Ok(outcome) => reasoned_plan(spec, request, outcome, history.as_ref()),
                Err(err) if err.kind == PlanErrorKind::Cancelled => return Err(err),
                Err(err) => self.fallback_plan(spec, request, history.as_ref(), strategy, err),
            },
            ExecutionStrategy::Adaptive => match self.reason(spec, request, cancel).await {
                Err(err) if err.kind == PlanErrorKind::Cancelled => return Err(err),
                Ok(outcome) if outcome.confidence >= spec.processing.reasoning_threshold => {
                    reasoned_plan(spec, request, outcome, history.as_ref())
                }
                Ok(outcome) => {
                    tracing::info!(
                        target: "planner",
                        request_id = %request.id,
                        confidence = outcome.confidence,
                        threshold = spec.processing.reasoning_threshold,
                        "adaptive_reasoning_skipped"
                    );
                    let mut notes = Map::new();
                    notes.insert(
                        "skipped".to_string(),
                        json!(format!(
                            "confidence {:.2} < {:.2}",
                            outcome.confidence, spec.processing.reasoning_threshold
                        )),
                    );
                    notes.insert("suggestion".to_string(), Value::Object(outcome.notes));
                    direct_plan(spec, request, history.as_ref(), notes)
                }
                Err(err) => self.fallback_plan(spec, request, history.as_ref(), strategy, err),
            },
        };

        tracing::debug!(
            target: "planner",
            request_id = %request.id,
            plan_id = %plan.plan_id,
            strategy = strategy.as_str(),
            reasoning_applied = plan.reasoning_applied,
            confidence = plan.confidence,
            estimated_cost = plan.estimated_cost,
            estimated_latency = plan.estimated_latency,
            "plan_created"
        );
        Ok(plan)
    }

    async fn reason(
        &self,
        spec: &ExecutionSpec,
        request: &BrainRequest,
        cancel: &CancellationToken,
    ) -> Result<ReasoningOutcome, PlanError> {
        let deadline = spec.processing.timeout();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(planning_cancelled("reasoning cancelled by caller")),
            outcome = timeout(deadline, self.reasoner.optimize(spec, request)) => match outcome {
                Ok(result) => result,
                Err(_) => Err(reasoning_failed(format!(
                    "reasoning timed out after {}ms",
                    deadline.as_millis()
                ))),
            },
        }
    }

    fn fallback_plan(
        &self,
        spec: &ExecutionSpec,
        request: &BrainRequest,
        history: Option<&LatencyStats>,
        strategy: ExecutionStrategy,
        err: PlanError,
    ) -> ExecutionPlan {
        tracing::warn!(
            target: "planner",
            request_id = %request.id,
            strategy = strategy.as_str(),
            error = %err,
            "reasoning_failed_fallback_direct"
        );
        let mut notes = Map::new();
        notes.insert("strategy".to_string(), json!("direct"));
        notes.insert(
            "fallback".to_string(),
            json!(format!("{} reasoning failed: {}", strategy.as_str(), err)),
        );
        direct_plan(spec, request, history, notes)
    }
}

fn direct_plan(
    spec: &ExecutionSpec,
    request: &BrainRequest,
    history: Option<&LatencyStats>,
    notes: Map<String, Value>,
) -> ExecutionPlan {
    let (estimated_cost, estimated_latency) = estimate_or_default(spec, history);
    ExecutionPlan {
        plan_id: derive_plan_id(&request.id, spec),
        original_specs: spec.clone(),
        optimized_specs: Some(spec.clone()),
        reasoning_applied: false,
        confidence: 1.0,
        reasoning_notes: notes,
        estimated_cost,
        estimated_latency,
    }
}

fn reasoned_plan(
    spec: &ExecutionSpec,
    request: &BrainRequest,
    outcome: ReasoningOutcome,
    history: Option<&LatencyStats>,
) -> ExecutionPlan {
    let estimate_source = outcome.optimized_specs.as_ref().unwrap_or(spec);
    let (estimated_cost, estimated_latency) = estimate_or_default(estimate_source, history);
    ExecutionPlan {
        plan_id: derive_plan_id(&request.id, estimate_source),
        original_specs: spec.clone(),
        optimized_specs: outcome.optimized_specs,
        reasoning_applied: true,
        confidence: outcome.confidence.clamp(0.0, 1.0),
        reasoning_notes: outcome.notes,
        estimated_cost,
        estimated_latency,
    }
}

pub fn derive_plan_id(request_id: &str, spec: &ExecutionSpec) -> String {
    let canonical = canonicalize_json(&json!({
        "request_id": request_id,
        "spec": spec.fingerprint(),
    }));

    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    format!("plan:{}", &hex[..24])
}

/// Checks a plan before it reaches the workflow engine.
pub fn validate_plan(plan: &ExecutionPlan) -> Result<(), PlanError> {
    let mut issues = Vec::new();

    match &plan.optimized_specs {
        None => issues.push("No optimized specs in plan".to_string()),
        Some(specs) => match &specs.provider {
            None => issues.push("No provider specified in optimized specs".to_string()),
            Some(provider) => {
                if provider.provider_type.trim().is_empty() {
                    issues.push("Provider type not specified".to_string());
                }
                if provider
                    .model
                    .as_deref()
                    .is_none_or(|model| model.trim().is_empty())
                {
                    issues.push("Provider model not specified".to_string());
                }
            }
        },
    }

    if plan.reasoning_applied {
        if plan.confidence < MIN_REASONING_CONFIDENCE {
            issues.push(format!("Reasoning confidence too low: {:.2}", plan.confidence));
        }
        if let Some(specs) = &plan.optimized_specs
            && specs.fingerprint() == plan.original_specs.fingerprint()
        {
            tracing::info!(
                target: "planner",
                plan_id = %plan.plan_id,
                "reasoning_applied_specs_unchanged"
            );
        }
    }

    if plan.estimated_cost < 0.0 {
        issues.push(format!("Invalid estimated cost: {}", plan.estimated_cost));
    }
    if plan.estimated_latency < 0.0 {
        issues.push(format!("Invalid estimated latency: {}", plan.estimated_latency));
    }

    if issues.is_empty() {
        Ok(())
    } else {
        tracing::warn!(
            target: "planner",
            plan_id = %plan.plan_id,
            issue_count = issues.len(),
            issues = %issues.join(", "),
            "plan_rejected"
        );
        Err(plan_rejected(issues))
    }
}
