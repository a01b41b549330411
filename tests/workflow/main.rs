#[path = "../support/mod.rs"]
mod support;

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use brain::{
    planner::{DataSourceRequest, ExecutionPlan, ExecutionSpec, ProviderRequest, ToolRequest},
    provider_gateway::ProviderFactory,
    retrieval::AdapterCatalog,
    types::{BrainRequest, ChatRole, UserContext},
    workflow::{
        FALLBACK_MESSAGES, HeuristicResponseValidator, ResponseValidator, WorkflowConfig,
        WorkflowEngine, WorkflowErrorKind, WorkflowStatus, WorkflowTelemetryEvent,
        WorkflowTelemetryHook,
    },
};
use serde_json::Map;
use support::{
    BrokenValidator, CancellingValidator, EchoTool, GOOD_ANSWER, ScriptedProviders,
    ScriptedValidator, SourceCounters, registries_for, with_static_source,
};
use tokio_util::sync::CancellationToken;

fn base_spec() -> ExecutionSpec {
    ExecutionSpec::direct(ProviderRequest::new("openai", Some("gpt-4o-mini")))
}

fn plan_for(spec: ExecutionSpec) -> ExecutionPlan {
    ExecutionPlan {
        plan_id: "plan:test".to_string(),
        original_specs: spec.clone(),
        optimized_specs: Some(spec),
        reasoning_applied: false,
        confidence: 1.0,
        reasoning_notes: Map::new(),
        estimated_cost: 0.0,
        estimated_latency: 1.0,
    }
}

fn request() -> BrainRequest {
    BrainRequest::new("How can I ground myself?", UserContext::anonymous("u1"))
}

fn engine(
    providers: Arc<ScriptedProviders>,
    adapters: AdapterCatalog,
    validator: Option<Arc<dyn ResponseValidator>>,
    telemetry_hook: Option<WorkflowTelemetryHook>,
) -> WorkflowEngine {
    let factory: Arc<dyn ProviderFactory> = providers;
    let registries = registries_for(factory.as_ref(), &adapters);
    let validator = validator.unwrap_or_else(|| {
        Arc::new(HeuristicResponseValidator::new(
            Arc::clone(&factory),
            Arc::clone(&registries),
        ))
    });
    WorkflowEngine::new(
        WorkflowConfig::default(),
        factory,
        adapters,
        registries,
        validator,
        telemetry_hook,
    )
}

#[tokio::test]
async fn given_direct_plan_and_good_answer_when_executing_then_one_generation_completes() {
    let providers = Arc::new(ScriptedProviders::replying(&[GOOD_ANSWER]));
    let validator = Arc::new(ScriptedValidator::new(&[0.9]));
    let engine = engine(
        Arc::clone(&providers),
        AdapterCatalog::new(),
        Some(validator.clone()),
        None,
    );

    let result = engine
        .execute_plan(&plan_for(base_spec()), &request(), Vec::new(), &CancellationToken::new())
        .await;

    assert!(result.success);
    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(result.content, GOOD_ANSWER);
    assert_eq!(result.metadata.validation_attempts, 1);
    assert_eq!(
        result.metadata.execution_steps,
        vec![
            "initialize",
            "build_messages",
            "call_provider",
            "validate_response",
            "finalize"
        ]
    );
    assert_eq!(providers.counters.generations(), 1);
    assert_eq!(providers.counters.releases(), providers.counters.acquisitions());
    assert_eq!(validator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn given_five_char_replies_when_executing_then_attempts_exhaust_and_fallback_is_returned() {
    let providers = Arc::new(ScriptedProviders::replying(&["Hi!!!"]));
    let engine = engine(Arc::clone(&providers), AdapterCatalog::new(), None, None);

    let result = engine
        .execute_plan(&plan_for(base_spec()), &request(), Vec::new(), &CancellationToken::new())
        .await;

    assert!(!result.success);
    assert_eq!(result.status, WorkflowStatus::CompletedWithErrors);
    assert_eq!(result.content, FALLBACK_MESSAGES[0]);
    assert_eq!(result.metadata.validation_attempts, 5);
    assert!((result.confidence - 0.1).abs() < 1e-9);
    assert!(
        result
            .metadata
            .errors
            .iter()
            .any(|error| error == "Response validation failed after 5 attempts")
    );
    assert_eq!(providers.counters.generations(), 5);
    assert_eq!(providers.counters.releases(), 5);

    let retry_prompt = providers.counters.prompt(1);
    let guidance = retry_prompt
        .iter()
        .find(|message| message.role == ChatRole::System)
        .expect("retry prompt should carry guidance");
    assert!(guidance.content.contains("Previous response: Hi!!!"));
    assert!(guidance.content.contains("Feedback: Response is too short"));
}

#[tokio::test]
async fn given_rejection_then_acceptance_when_executing_then_loop_stops_at_second_attempt() {
    let providers = Arc::new(ScriptedProviders::replying(&[GOOD_ANSWER]));
    let validator = Arc::new(ScriptedValidator::new(&[0.4, 0.8]));
    let engine = engine(
        Arc::clone(&providers),
        AdapterCatalog::new(),
        Some(validator.clone()),
        None,
    );

    let result = engine
        .execute_plan(&plan_for(base_spec()), &request(), Vec::new(), &CancellationToken::new())
        .await;

    assert!(result.success);
    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(result.metadata.validation_attempts, 2);
    assert!((result.confidence - 0.8).abs() < 1e-9);
    assert_eq!(providers.counters.generations(), 2);
}

#[tokio::test]
async fn given_one_failing_data_source_when_executing_then_others_still_feed_the_prompt() {
    let healthy = SourceCounters::default();
    let broken = SourceCounters::default();
    let adapters = with_static_source(
        with_static_source(AdapterCatalog::new(), "broken", &[], true, &broken),
        "kb",
        &["breathing exercise"],
        false,
        &healthy,
    );
    let providers = Arc::new(ScriptedProviders::replying(&[GOOD_ANSWER]));
    let engine = engine(
        Arc::clone(&providers),
        adapters,
        Some(Arc::new(ScriptedValidator::new(&[0.9]))),
        None,
    );

    let mut spec = base_spec();
    spec.data_sources = vec![DataSourceRequest::new("broken"), DataSourceRequest::new("kb")];
    let result = engine
        .execute_plan(&plan_for(spec), &request(), Vec::new(), &CancellationToken::new())
        .await;

    assert!(result.success);
    assert_eq!(result.status, WorkflowStatus::CompletedWithErrors);
    assert_eq!(result.content, GOOD_ANSWER);
    assert!(
        result
            .metadata
            .errors
            .iter()
            .any(|error| error.starts_with("DS Error: broken query failed"))
    );
    assert_eq!(broken.closes(), 1);
    assert_eq!(healthy.closes(), 1);

    let prompt = providers.counters.prompt(0);
    assert!(prompt[0].content.contains("Data from kb: breathing exercise"));
    assert!(!prompt[0].content.contains("Data from broken"));
}

#[tokio::test]
async fn given_several_sources_and_tools_when_executing_then_spec_order_is_preserved() {
    let counters = SourceCounters::default();
    let tool_calls = Arc::new(AtomicUsize::new(0));
    let adapters = with_static_source(
        with_static_source(AdapterCatalog::new(), "zeta", &["z-doc"], false, &counters),
        "alpha",
        &["a-doc"],
        false,
        &counters,
    )
    .with_tool(
        "echo_b",
        Arc::new(EchoTool {
            calls: Arc::clone(&tool_calls),
        }),
    )
    .with_tool(
        "echo_a",
        Arc::new(EchoTool {
            calls: Arc::clone(&tool_calls),
        }),
    );
    let providers = Arc::new(ScriptedProviders::replying(&[GOOD_ANSWER]));
    let engine = engine(
        Arc::clone(&providers),
        adapters,
        Some(Arc::new(ScriptedValidator::new(&[0.9]))),
        None,
    );

    let mut spec = base_spec();
    spec.data_sources = vec![DataSourceRequest::new("zeta"), DataSourceRequest::new("alpha")];
    spec.tools = vec![ToolRequest::new("echo_b"), ToolRequest::new("echo_a")];
    let result = engine
        .execute_plan(&plan_for(spec), &request(), Vec::new(), &CancellationToken::new())
        .await;

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(counters.queries(), 2);
    assert_eq!(tool_calls.load(Ordering::SeqCst), 2);

    let system = &providers.counters.prompt(0)[0].content;
    let zeta = system.find("Data from zeta").expect("zeta context");
    let alpha = system.find("Data from alpha").expect("alpha context");
    assert!(zeta < alpha);
    let echo_b = system
        .find("Tool echo_b: echo: How can I ground myself?")
        .expect("echo_b result");
    let echo_a = system.find("Tool echo_a").expect("echo_a result");
    assert!(echo_b < echo_a);
}

#[tokio::test]
async fn given_tool_missing_required_param_when_executing_then_failure_is_isolated() {
    let tool_calls = Arc::new(AtomicUsize::new(0));
    let adapters = AdapterCatalog::new().with_tool(
        "echo",
        Arc::new(EchoTool {
            calls: Arc::clone(&tool_calls),
        }),
    );
    let providers = Arc::new(ScriptedProviders::replying(&[GOOD_ANSWER]));
    let engine = engine(
        Arc::clone(&providers),
        adapters,
        Some(Arc::new(ScriptedValidator::new(&[0.9]))),
        None,
    );

    let mut tool = ToolRequest::new("echo");
    tool.required_params = vec!["locale".to_string()];
    let mut spec = base_spec();
    spec.tools = vec![tool];
    let result = engine
        .execute_plan(&plan_for(spec), &request(), Vec::new(), &CancellationToken::new())
        .await;

    assert!(result.success);
    assert_eq!(result.status, WorkflowStatus::CompletedWithErrors);
    assert_eq!(tool_calls.load(Ordering::SeqCst), 0);
    assert!(
        result
            .metadata
            .errors
            .iter()
            .any(|error| error.starts_with("Tool Error:") && error.contains("locale"))
    );
}

#[tokio::test]
async fn given_provider_failure_when_executing_then_error_marker_never_reaches_the_caller() {
    let providers = Arc::new(ScriptedProviders::failing("upstream 503"));
    let validator = Arc::new(ScriptedValidator::new(&[0.9]));
    let engine = engine(
        Arc::clone(&providers),
        AdapterCatalog::new(),
        Some(validator.clone()),
        None,
    );

    let result = engine
        .execute_plan(&plan_for(base_spec()), &request(), Vec::new(), &CancellationToken::new())
        .await;

    assert!(!result.success);
    assert_eq!(result.content, FALLBACK_MESSAGES[0]);
    assert_eq!(result.confidence, 0.0);
    assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
    assert!(result.metadata.errors.iter().any(|error| error == "upstream 503"));
    assert_eq!(providers.counters.releases(), providers.counters.acquisitions());
}

#[tokio::test]
async fn given_slow_provider_when_deadline_passes_then_attempt_times_out() {
    let providers = Arc::new(
        ScriptedProviders::replying(&[GOOD_ANSWER]).with_delay(Duration::from_millis(500)),
    );
    let engine = engine(
        Arc::clone(&providers),
        AdapterCatalog::new(),
        Some(Arc::new(ScriptedValidator::new(&[0.9]))),
        None,
    );

    let mut spec = base_spec();
    spec.processing.timeout_seconds = 0.02;
    let result = engine
        .execute_plan(&plan_for(spec), &request(), Vec::new(), &CancellationToken::new())
        .await;

    assert!(!result.success);
    assert_eq!(result.status, WorkflowStatus::CompletedWithErrors);
    assert_eq!(result.metadata.validation_attempts, 5);
    assert!(
        result
            .metadata
            .errors
            .iter()
            .any(|error| error.contains("timed out after 20ms"))
    );
    assert_eq!(providers.counters.releases(), providers.counters.acquisitions());
}

#[tokio::test]
async fn given_cancelled_request_when_generation_is_pending_then_execution_is_cancelled() {
    let providers = Arc::new(
        ScriptedProviders::replying(&[GOOD_ANSWER]).with_delay(Duration::from_secs(5)),
    );
    let engine = engine(
        Arc::clone(&providers),
        AdapterCatalog::new(),
        Some(Arc::new(ScriptedValidator::new(&[0.9]))),
        None,
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = engine
        .execute_plan(&plan_for(base_spec()), &request(), Vec::new(), &cancel)
        .await;

    assert!(!result.success);
    assert_eq!(result.status, WorkflowStatus::Cancelled);
    assert_eq!(result.metadata.execution_steps.last().map(String::as_str), Some("finalize"));
    assert!(
        result
            .metadata
            .errors
            .iter()
            .any(|error| error.contains("cancelled by caller"))
    );
    assert_eq!(providers.counters.acquisitions(), 1);
    assert_eq!(providers.counters.releases(), 1);
}

#[tokio::test]
async fn given_rejected_attempt_when_request_is_cancelled_then_fallback_replaces_it() {
    let providers = Arc::new(ScriptedProviders::replying(&[
        "I'm sorry, but I cannot help with that.",
    ]));
    let cancel = CancellationToken::new();
    let engine = engine(
        Arc::clone(&providers),
        AdapterCatalog::new(),
        Some(Arc::new(CancellingValidator {
            token: cancel.clone(),
            confidence: 0.3,
        })),
        None,
    );

    let result = engine
        .execute_plan(&plan_for(base_spec()), &request(), Vec::new(), &cancel)
        .await;

    assert!(!result.success);
    assert_eq!(result.status, WorkflowStatus::Cancelled);
    assert_eq!(result.content, FALLBACK_MESSAGES[0]);
    assert!((result.confidence - 0.3).abs() < 1e-9);
    assert!(
        result
            .metadata
            .errors
            .iter()
            .any(|error| error == "Low confidence response (0.30) replaced with fallback")
    );
    assert_eq!(providers.counters.generations(), 1);
    assert_eq!(providers.counters.releases(), providers.counters.acquisitions());
}

#[tokio::test]
async fn given_finished_execution_when_looking_up_then_cache_and_telemetry_agree() {
    let finished = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&finished);
    let hook: WorkflowTelemetryHook = Arc::new(move |event| {
        if let WorkflowTelemetryEvent::ExecutionFinished {
            execution_id,
            status,
            ..
        } = event
        {
            sink.lock()
                .expect("telemetry sink should not be poisoned")
                .push((execution_id, status));
        }
    });
    let providers = Arc::new(ScriptedProviders::replying(&[GOOD_ANSWER]));
    let engine = engine(
        providers,
        AdapterCatalog::new(),
        Some(Arc::new(ScriptedValidator::new(&[0.9]))),
        Some(hook),
    );

    let result = engine
        .execute_plan(&plan_for(base_spec()), &request(), Vec::new(), &CancellationToken::new())
        .await;

    let cached = engine
        .cached_result(&result.execution_id)
        .await
        .expect("result should be cached");
    assert_eq!(cached, result);
    assert_eq!(
        finished
            .lock()
            .expect("telemetry sink should not be poisoned")
            .as_slice(),
        &[(result.execution_id.clone(), WorkflowStatus::Completed)]
    );
}

#[tokio::test]
async fn given_failing_validator_when_executing_then_response_is_accepted_at_neutral_confidence() {
    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&failures);
    let hook: WorkflowTelemetryHook = Arc::new(move |event| {
        if let WorkflowTelemetryEvent::NodeFailed { node, kind, .. } = event {
            sink.lock()
                .expect("telemetry sink should not be poisoned")
                .push((node, kind));
        }
    });
    let providers = Arc::new(ScriptedProviders::replying(&[GOOD_ANSWER]));
    let engine = engine(
        Arc::clone(&providers),
        AdapterCatalog::new(),
        Some(Arc::new(BrokenValidator)),
        Some(hook),
    );

    let result = engine
        .execute_plan(&plan_for(base_spec()), &request(), Vec::new(), &CancellationToken::new())
        .await;

    assert!(result.success);
    assert_eq!(result.content, GOOD_ANSWER);
    assert_eq!(result.status, WorkflowStatus::CompletedWithErrors);
    assert!((result.confidence - 0.5).abs() < 1e-9);
    assert_eq!(result.metadata.validation_attempts, 1);
    assert_eq!(
        result.metadata.errors,
        vec!["Validation error: grader unreachable"]
    );
    assert_eq!(providers.counters.generations(), 1);
    assert_eq!(
        failures
            .lock()
            .expect("telemetry sink should not be poisoned")
            .as_slice(),
        &[("validate_response", WorkflowErrorKind::ValidationInternal)]
    );
}

#[tokio::test]
async fn given_high_grade_when_executing_then_grader_score_is_blended_with_base() {
    let providers = Arc::new(ScriptedProviders::replying(&[
        GOOD_ANSWER,
        "SCORE: 90\nREASONING: clear and kind",
    ]));
    let engine = engine(Arc::clone(&providers), AdapterCatalog::new(), None, None);

    let result = engine
        .execute_plan(&plan_for(base_spec()), &request(), Vec::new(), &CancellationToken::new())
        .await;

    assert!(result.success);
    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(result.content, GOOD_ANSWER);
    assert!((result.confidence - 0.78).abs() < 1e-9);
    assert_eq!(result.metadata.validation_attempts, 1);
    assert_eq!(providers.counters.generations(), 2);
    assert_eq!(providers.counters.releases(), providers.counters.acquisitions());

    let grading = providers.counters.prompt(1);
    assert_eq!(grading.len(), 1);
    assert!(grading[0].content.contains("User Message: How can I ground myself?"));
    assert!(grading[0].content.contains(&format!("AI Response: {GOOD_ANSWER}")));
}

#[tokio::test]
async fn given_low_grade_when_executing_then_grader_reasoning_drives_the_retry() {
    let providers = Arc::new(ScriptedProviders::replying(&[
        GOOD_ANSWER,
        "SCORE: 40\nREASONING: too generic",
        GOOD_ANSWER,
        "SCORE: 95\nREASONING: specific",
    ]));
    let engine = engine(Arc::clone(&providers), AdapterCatalog::new(), None, None);

    let result = engine
        .execute_plan(&plan_for(base_spec()), &request(), Vec::new(), &CancellationToken::new())
        .await;

    assert!(result.success);
    assert_eq!(result.metadata.validation_attempts, 2);
    assert!((result.confidence - 0.815).abs() < 1e-9);
    assert_eq!(providers.counters.generations(), 4);
    assert!(
        providers
            .counters
            .prompt(2)
            .iter()
            .any(|message| message.content.contains("Confidence too low (0.43): too generic"))
    );
}

#[tokio::test]
async fn given_grade_without_score_when_executing_then_keywords_decide() {
    let providers = Arc::new(ScriptedProviders::replying(&[
        GOOD_ANSWER,
        "This answer is good and grounded.",
    ]));
    let engine = engine(Arc::clone(&providers), AdapterCatalog::new(), None, None);

    let result = engine
        .execute_plan(&plan_for(base_spec()), &request(), Vec::new(), &CancellationToken::new())
        .await;

    assert!(result.success);
    assert!((result.confidence - 0.75).abs() < 1e-9);
    assert_eq!(result.metadata.validation_attempts, 1);
}

#[tokio::test]
async fn given_spec_without_provider_when_grading_then_base_confidence_is_accepted() {
    let providers = Arc::new(ScriptedProviders::replying(&["SCORE: 10"]));
    let factory: Arc<dyn ProviderFactory> = providers.clone();
    let registries = registries_for(factory.as_ref(), &AdapterCatalog::new());
    let validator = HeuristicResponseValidator::new(factory, registries);
    let mut spec = base_spec();
    spec.provider = None;

    let result = validator
        .validate(GOOD_ANSWER, "How can I ground myself?", &spec, &CancellationToken::new())
        .await
        .expect("grading should not fail");

    assert!(result.is_valid);
    assert_eq!(result.confidence, 0.5);
    assert_eq!(providers.counters.acquisitions(), 0);
}

#[tokio::test]
async fn given_failing_grading_call_when_grading_then_base_confidence_is_accepted() {
    let providers = Arc::new(ScriptedProviders::failing("grader offline"));
    let factory: Arc<dyn ProviderFactory> = providers.clone();
    let registries = registries_for(factory.as_ref(), &AdapterCatalog::new());
    let validator = HeuristicResponseValidator::new(factory, registries);

    let result = validator
        .validate(
            GOOD_ANSWER,
            "How can I ground myself?",
            &base_spec(),
            &CancellationToken::new(),
        )
        .await
        .expect("grading should not fail");

    assert!(result.is_valid);
    assert_eq!(result.confidence, 0.5);
    assert_eq!(providers.counters.generations(), 1);
    assert_eq!(providers.counters.releases(), 1);
}
