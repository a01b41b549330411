#[path = "../support/mod.rs"]
mod support;

use std::{
    sync::{Arc, atomic::Ordering},
    time::{Duration, Instant},
};

use brain::{
    evaluation::LatencyTracker,
    planner::{
        ExecutionSpec, ExecutionStrategy, PlanErrorKind, Planner, ProviderRequest, validate_plan,
    },
    types::{BrainRequest, UserContext},
};
use support::FixedReasoner;
use tokio_util::sync::CancellationToken;

fn spec_with(strategy: ExecutionStrategy) -> ExecutionSpec {
    let mut spec = ExecutionSpec::direct(ProviderRequest::new("openai", Some("gpt-4o-mini")));
    spec.processing.execution_strategy = strategy;
    spec
}

fn request() -> BrainRequest {
    BrainRequest::new("How do I calm down before an exam?", UserContext::anonymous("u1"))
}

fn live() -> CancellationToken {
    CancellationToken::new()
}

fn planner(reasoner: Arc<FixedReasoner>) -> Planner {
    Planner::new(reasoner, Arc::new(LatencyTracker::default()))
}

#[tokio::test]
async fn given_direct_strategy_when_planning_then_reasoner_is_never_called() {
    let reasoner = Arc::new(FixedReasoner::confident(0.9));
    let plan = planner(Arc::clone(&reasoner))
        .plan(&spec_with(ExecutionStrategy::Direct), &request(), &live())
        .await
        .expect("direct plan should be produced");

    assert_eq!(reasoner.calls.load(Ordering::SeqCst), 0);
    assert!(!plan.reasoning_applied);
    assert_eq!(plan.confidence, 1.0);
    assert_eq!(
        plan.reasoning_notes.get("message").and_then(|v| v.as_str()),
        Some("Skipped reasoning as requested")
    );
    assert!(validate_plan(&plan).is_ok());
}

#[tokio::test]
async fn given_adaptive_below_threshold_when_planning_then_direct_plan_carries_suggestion() {
    let reasoner = Arc::new(FixedReasoner::confident(0.5));
    let spec = spec_with(ExecutionStrategy::Adaptive);
    let plan = planner(Arc::clone(&reasoner))
        .plan(&spec, &request(), &live())
        .await
        .expect("adaptive plan should be produced");

    assert_eq!(reasoner.calls.load(Ordering::SeqCst), 1);
    assert!(!plan.reasoning_applied);
    assert_eq!(plan.confidence, 1.0);
    assert_eq!(plan.optimized_specs.as_ref(), Some(&spec));
    assert_eq!(
        plan.reasoning_notes.get("skipped").and_then(|v| v.as_str()),
        Some("confidence 0.50 < 0.70")
    );
    assert!(plan.reasoning_notes.contains_key("suggestion"));
}

#[tokio::test]
async fn given_adaptive_above_threshold_when_planning_then_reasoning_is_applied() {
    let plan = planner(Arc::new(FixedReasoner::confident(0.9)))
        .plan(&spec_with(ExecutionStrategy::Adaptive), &request(), &live())
        .await
        .expect("adaptive plan should be produced");

    assert!(plan.reasoning_applied);
    assert!((plan.confidence - 0.9).abs() < 1e-9);
    assert!(plan.optimized_specs.is_some());
    assert!(validate_plan(&plan).is_ok());
}

#[tokio::test]
async fn given_reasoner_failure_when_planning_reasoned_then_direct_fallback_is_noted() {
    let plan = planner(Arc::new(FixedReasoner::broken()))
        .plan(&spec_with(ExecutionStrategy::Reasoned), &request(), &live())
        .await
        .expect("reasoning failure should degrade, not fail");

    assert!(!plan.reasoning_applied);
    let fallback = plan
        .reasoning_notes
        .get("fallback")
        .and_then(|v| v.as_str())
        .expect("fallback note should be recorded");
    assert!(fallback.starts_with("reasoned reasoning failed"), "{fallback}");
}

#[tokio::test]
async fn given_low_reasoning_confidence_when_validating_then_plan_is_rejected() {
    let plan = planner(Arc::new(FixedReasoner::confident(0.2)))
        .plan(&spec_with(ExecutionStrategy::Reasoned), &request(), &live())
        .await
        .expect("plan should be produced");

    let err = validate_plan(&plan).expect_err("confidence 0.2 should be rejected");
    assert_eq!(err.kind, PlanErrorKind::Rejected);
    assert_eq!(
        err.to_string(),
        "Reasoning validation failed: Reasoning confidence too low: 0.20"
    );
}

#[tokio::test]
async fn given_spec_without_provider_when_validating_then_issue_names_missing_provider() {
    let plan = planner(Arc::new(FixedReasoner::confident(0.9)))
        .plan(&ExecutionSpec::default(), &request(), &live())
        .await
        .expect("plan should be produced");

    let err = validate_plan(&plan).expect_err("missing provider should be rejected");
    assert_eq!(err.issues, vec!["No provider specified in optimized specs"]);
}

#[tokio::test]
async fn given_same_request_and_spec_when_planning_twice_then_plan_id_is_stable() {
    let planner = planner(Arc::new(FixedReasoner::confident(0.9)));
    let spec = spec_with(ExecutionStrategy::Direct);
    let request = request();

    let first = planner.plan(&spec, &request, &live()).await.expect("plan");
    let second = planner.plan(&spec, &request, &live()).await.expect("plan");
    assert_eq!(first.plan_id, second.plan_id);
    assert!(first.plan_id.starts_with("plan:"));
}

#[tokio::test]
async fn given_blank_message_when_planning_then_request_is_invalid() {
    let request = BrainRequest::new("   ", UserContext::anonymous("u1"));
    let err = planner(Arc::new(FixedReasoner::confident(0.9)))
        .plan(&spec_with(ExecutionStrategy::Direct), &request, &live())
        .await
        .expect_err("blank message should fail");
    assert_eq!(err.kind, PlanErrorKind::InvalidRequest);
}

#[tokio::test]
async fn given_cancelled_token_when_reasoning_is_slow_then_planning_stops_without_fallback() {
    let reasoner = Arc::new(FixedReasoner::confident(0.9).with_delay(Duration::from_secs(3)));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let started = Instant::now();
    let err = planner(Arc::clone(&reasoner))
        .plan(&spec_with(ExecutionStrategy::Reasoned), &request(), &cancel)
        .await
        .expect_err("cancelled planning should not fall back to a direct plan");

    assert_eq!(err.kind, PlanErrorKind::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(1));
}
