use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    planner::{DataSourceRequest, ExecutionPlan, ToolRequest},
    provider_gateway::{GenerationResponse, ProviderFactory},
    registry::CapabilityRegistries,
    retrieval::{AdapterCatalog, DataSourceAdapter, RetrievalContext},
    types::{BrainRequest, ChatMessage},
    workflow::{
        cache::ExecutionCache,
        error::{
            WorkflowError, WorkflowErrorKind, generation_failed, retrieval_failed, tool_failed,
            validation_internal,
        },
        guard::guarded,
        machine::{WorkflowNode, next_node},
        messages::{build_messages, fallback_messages},
        result::ExecutionResult,
        state::{
            DEFAULT_MAX_VALIDATION_RUNS, DataSourceResult, ERROR_MARKER, ToolResult, ToolStatus,
            WorkflowState, WorkflowStatus,
        },
        validator::{ACCEPTANCE_THRESHOLD, ResponseValidator},
    },
};

/// Substituted for responses that never reached the acceptance threshold.
pub const FALLBACK_MESSAGES: [&str; 4] = [
    "I'm not confident I can provide an accurate answer to that question right now.",
    "I don't have enough information to give you a reliable response at this time.",
    "I'm uncertain about the best way to answer that. Could you rephrase or provide more context?",
    "I don't know enough about this topic to provide a helpful response.",
];

const GENERATION_FAILED_FEEDBACK: &str = "Response generation failed or returned error";
const VALIDATOR_FAILURE_CONFIDENCE: f64 = 0.5;
const NOT_AVAILABLE: &str = "Not available";
const INITIALIZATION_FAILED: &str = "Initialization failed";
const DEFAULT_TOOL_QUERY_PARAM: &str = "query";

fn default_max_validation_runs() -> u32 {
    DEFAULT_MAX_VALIDATION_RUNS
}

fn default_execution_cache_capacity() -> usize {
    256
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_max_validation_runs")]
    pub max_validation_runs: u32,
    #[serde(default = "default_execution_cache_capacity")]
    pub execution_cache_capacity: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_validation_runs: default_max_validation_runs(),
            execution_cache_capacity: default_execution_cache_capacity(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum WorkflowTelemetryEvent {
    ExecutionStarted {
        execution_id: String,
    },
    NodeFailed {
        execution_id: String,
        node: &'static str,
        kind: WorkflowErrorKind,
    },
    AttemptScored {
        execution_id: String,
        attempt: u32,
        confidence: f64,
        accepted: bool,
    },
    ExecutionFinished {
        execution_id: String,
        status: WorkflowStatus,
        validation_attempts: u32,
    },
}

pub type WorkflowTelemetryHook = Arc<dyn Fn(WorkflowTelemetryEvent) + Send + Sync>;

pub struct WorkflowEngine {
    providers: Arc<dyn ProviderFactory>,
    adapters: AdapterCatalog,
    registries: Arc<CapabilityRegistries>,
    validator: Arc<dyn ResponseValidator>,
    config: WorkflowConfig,
    cache: ExecutionCache,
    telemetry_hook: Option<WorkflowTelemetryHook>,
}

impl WorkflowEngine {
    pub fn new(
        config: WorkflowConfig,
        providers: Arc<dyn ProviderFactory>,
        adapters: AdapterCatalog,
        registries: Arc<CapabilityRegistries>,
        validator: Arc<dyn ResponseValidator>,
        telemetry_hook: Option<WorkflowTelemetryHook>,
    ) -> Self {
        Self {
            cache: ExecutionCache::new(config.execution_cache_capacity),
            providers,
            adapters,
            registries,
            validator,
            config,
            telemetry_hook,
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Runs a validated plan to completion. Never fails: every node failure
    /// is recorded on the state and FINALIZE always runs.
    pub async fn execute_plan(
        &self,
        plan: &ExecutionPlan,
        request: &BrainRequest,
        history: Vec<ChatMessage>,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let mut state = WorkflowState::new(
            request.clone(),
            plan.execution_specs().clone(),
            history,
            self.config.max_validation_runs,
        );
        let span = tracing::info_span!(
            target: "workflow",
            "workflow_execution",
            execution_id = %state.execution_id,
            plan_id = %plan.plan_id,
            eval = state.specs.processing.eval,
        );

        async {
            self.emit(WorkflowTelemetryEvent::ExecutionStarted {
                execution_id: state.execution_id.clone(),
            });

            let cancelled = match self.drive(&mut state, cancel).await {
                Ok(()) => false,
                Err(err) => {
                    tracing::warn!(
                        target: "workflow",
                        execution_id = %state.execution_id,
                        error = %err,
                        "workflow_cancelled"
                    );
                    state.record_error(err.to_string());
                    true
                }
            };
            self.finalize(&mut state, cancelled);

            let result = ExecutionResult::from(&state);
            self.cache.insert(result.clone()).await;
            result
        }
        .instrument(span)
        .await
    }

    pub async fn cached_result(&self, execution_id: &str) -> Option<ExecutionResult> {
        self.cache.get(execution_id).await
    }

    /// Walks the graph up to FINALIZE. `Err` only for cancellation.
    async fn drive(
        &self,
        state: &mut WorkflowState,
        cancel: &CancellationToken,
    ) -> Result<(), WorkflowError> {
        let mut node = Some(WorkflowNode::Initialize);
        while let Some(current) = node {
            match current {
                WorkflowNode::Initialize => state.record_step(current.as_str()),
                WorkflowNode::QueryDataSources => self.query_data_sources(state, cancel).await?,
                WorkflowNode::ExecuteTools => self.execute_tools(state, cancel).await?,
                _ => break,
            }
            node = next_node(current, state);
        }

        for attempt in 0..state.max_validation_runs {
            self.build_messages(state);
            self.call_provider(state, cancel).await?;
            self.validate_response(state, cancel).await?;

            if next_node(WorkflowNode::ValidateResponse, state) == Some(WorkflowNode::Finalize) {
                break;
            }
            tracing::info!(
                target: "workflow",
                execution_id = %state.execution_id,
                next_attempt = attempt + 2,
                max_attempts = state.max_validation_runs,
                "retrying_generation"
            );
        }

        if !state.is_validated {
            tracing::warn!(
                target: "workflow",
                execution_id = %state.execution_id,
                attempts = state.validation_attempts,
                "validation_attempts_exhausted"
            );
            let attempts = state.validation_attempts;
            state.record_error(format!(
                "Response validation failed after {attempts} attempts"
            ));
        }
        Ok(())
    }

    async fn query_data_sources(
        &self,
        state: &mut WorkflowState,
        cancel: &CancellationToken,
    ) -> Result<(), WorkflowError> {
        state.record_step(WorkflowNode::QueryDataSources.as_str());
        let sources = state.specs.enabled_data_sources().cloned().collect::<Vec<_>>();

        for source in sources {
            let adapter = self
                .registries
                .check_data_source_available(&source.source_type)
                .then(|| self.adapters.open_data_source(&source.source_type))
                .flatten();
            let Some(adapter) = adapter else {
                state
                    .data_source_results
                    .push(DataSourceResult::failed(&source.source_type, NOT_AVAILABLE));
                continue;
            };

            match self.query_source(adapter, &source, state, cancel).await {
                Ok(record) => state.data_source_results.push(record),
                Err(err) if err.kind == WorkflowErrorKind::Cancelled => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        target: "workflow",
                        execution_id = %state.execution_id,
                        source_type = %source.source_type,
                        error = %err,
                        "data_source_query_failed"
                    );
                    self.node_failed(state, WorkflowNode::QueryDataSources, &err);
                    state.record_error(format!("DS Error: {err}"));
                }
            }
        }
        Ok(())
    }

    async fn query_source(
        &self,
        mut adapter: Box<dyn DataSourceAdapter>,
        source: &DataSourceRequest,
        state: &WorkflowState,
        cancel: &CancellationToken,
    ) -> Result<DataSourceResult, WorkflowError> {
        let deadline = state.specs.processing.timeout();
        let initialized = guarded(
            "data source initialize",
            deadline,
            cancel,
            adapter.initialize(&source.config),
        )
        .await;
        match initialized {
            Ok(true) => {}
            Ok(false) => {
                adapter.close().await;
                return Ok(DataSourceResult::failed(
                    &source.source_type,
                    INITIALIZATION_FAILED,
                ));
            }
            Err(err) => {
                adapter.close().await;
                return Err(err);
            }
        }

        let context = RetrievalContext {
            user_id: state.request.user_context.user_id.clone(),
            session_id: state.request.user_context.session_id.clone(),
            filters: source.filters.clone(),
        };
        let query = source
            .query
            .as_deref()
            .filter(|query| !query.trim().is_empty())
            .unwrap_or(&state.request.message);

        let outcome = guarded(
            "data source query",
            deadline,
            cancel,
            adapter.query(query, &context, source.limit),
        )
        .await;
        adapter.close().await;

        match outcome? {
            Ok(documents) => Ok(DataSourceResult::retrieved(&source.source_type, documents)),
            Err(err) => Err(retrieval_failed(format!(
                "{} query failed: {}",
                source.source_type, err
            ))),
        }
    }

    async fn execute_tools(
        &self,
        state: &mut WorkflowState,
        cancel: &CancellationToken,
    ) -> Result<(), WorkflowError> {
        state.record_step(WorkflowNode::ExecuteTools.as_str());
        let tools = state.specs.enabled_tools().cloned().collect::<Vec<_>>();

        for tool in tools {
            match self.execute_tool(&tool, state, cancel).await {
                Ok(record) => state.tool_results.push(record),
                Err(err) if err.kind == WorkflowErrorKind::Cancelled => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        target: "workflow",
                        execution_id = %state.execution_id,
                        tool = %tool.name,
                        error = %err,
                        "tool_execution_failed"
                    );
                    self.node_failed(state, WorkflowNode::ExecuteTools, &err);
                    state
                        .tool_results
                        .push(ToolResult::failed(&tool.name, ToolStatus::Failed, err.to_string()));
                    state.record_error(format!("Tool Error: {err}"));
                }
            }
        }
        Ok(())
    }

    async fn execute_tool(
        &self,
        tool: &ToolRequest,
        state: &WorkflowState,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, WorkflowError> {
        let adapter = self
            .registries
            .check_tool_available(&tool.name)
            .then(|| self.adapters.tool(&tool.name))
            .flatten()
            .filter(|adapter| adapter.available(&tool.name));
        let Some(adapter) = adapter else {
            return Ok(ToolResult::failed(
                &tool.name,
                ToolStatus::Unavailable,
                NOT_AVAILABLE,
            ));
        };

        let mut params = tool.config.clone();
        params
            .entry(DEFAULT_TOOL_QUERY_PARAM.to_string())
            .or_insert_with(|| state.request.message.clone().into());
        let missing = tool
            .required_params
            .iter()
            .filter(|param| !params.contains_key(param.as_str()))
            .cloned()
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(tool_failed(format!(
                "{} is missing required parameters: {}",
                tool.name,
                missing.join(", ")
            )));
        }

        let outcome = guarded(
            "tool execute",
            state.specs.processing.timeout(),
            cancel,
            adapter.execute(&params),
        )
        .await?
        .map_err(|err| tool_failed(format!("{} failed: {}", tool.name, err)))?;

        if outcome.success {
            Ok(ToolResult::executed(
                &tool.name,
                outcome.content.unwrap_or_default(),
            ))
        } else {
            Ok(ToolResult::failed(
                &tool.name,
                ToolStatus::Failed,
                outcome
                    .error
                    .unwrap_or_else(|| "tool reported failure".to_string()),
            ))
        }
    }

    fn build_messages(&self, state: &mut WorkflowState) {
        state.record_step(WorkflowNode::BuildMessages.as_str());
        match build_messages(state) {
            Ok(messages) => state.messages = messages,
            Err(err) => {
                tracing::warn!(
                    target: "workflow",
                    execution_id = %state.execution_id,
                    error = %err,
                    "message_assembly_failed"
                );
                self.node_failed(state, WorkflowNode::BuildMessages, &err);
                state.record_error(err.to_string());
                state.messages = fallback_messages(&state.request.message);
            }
        }
    }

    async fn call_provider(
        &self,
        state: &mut WorkflowState,
        cancel: &CancellationToken,
    ) -> Result<(), WorkflowError> {
        state.record_step(WorkflowNode::CallProvider.as_str());
        match self.generate(state, cancel).await {
            Ok(response) => {
                state.llm_succeeded = response.success;
                state.llm_response = serde_json::to_value(&response).ok();
                if response.success {
                    state.final_content = response.content;
                } else {
                    let reason = response.error_message().to_string();
                    let err = generation_failed(reason.clone());
                    self.node_failed(state, WorkflowNode::CallProvider, &err);
                    state.record_error(reason.clone());
                    state.final_content = format!("{ERROR_MARKER} {reason}");
                }
                Ok(())
            }
            Err(err) if err.kind == WorkflowErrorKind::Cancelled => Err(err),
            Err(err) => {
                tracing::warn!(
                    target: "workflow",
                    execution_id = %state.execution_id,
                    error = %err,
                    "provider_call_failed"
                );
                self.node_failed(state, WorkflowNode::CallProvider, &err);
                state.llm_succeeded = false;
                state.record_error(err.to_string());
                state.final_content = format!("{ERROR_MARKER} {err}");
                Ok(())
            }
        }
    }

    async fn generate(
        &self,
        state: &WorkflowState,
        cancel: &CancellationToken,
    ) -> Result<GenerationResponse, WorkflowError> {
        let provider = state
            .specs
            .provider
            .as_ref()
            .ok_or_else(|| generation_failed("No provider specified"))?;
        let model = provider
            .model
            .as_deref()
            .or_else(|| self.registries.providers.default_model(&provider.provider_type))
            .ok_or_else(|| {
                generation_failed(format!(
                    "no model resolved for provider '{}'",
                    provider.provider_type
                ))
            })?;

        let deadline = state.specs.processing.timeout();
        let mut handle = guarded(
            "provider acquire",
            deadline,
            cancel,
            self.providers
                .acquire(&provider.provider_type, model, Some(deadline)),
        )
        .await?
        .map_err(|err| generation_failed(err.to_string()))?;

        let call_deadline = handle
            .effective_timeout()
            .map_or(deadline, |effective| effective.min(deadline));
        let params = provider.sampling_params();
        let outcome = guarded(
            "provider generation",
            call_deadline,
            cancel,
            handle.generate(&state.messages, &params),
        )
        .await;
        handle.release().await;
        outcome
    }

    async fn validate_response(
        &self,
        state: &mut WorkflowState,
        cancel: &CancellationToken,
    ) -> Result<(), WorkflowError> {
        state.record_step(WorkflowNode::ValidateResponse.as_str());
        state.validation_attempts += 1;

        if !state.content_is_usable() {
            state.is_validated = false;
            state.confidence_score = 0.0;
            state.validation_feedback = Some(GENERATION_FAILED_FEEDBACK.to_string());
            self.attempt_scored(state);
            return Ok(());
        }

        match self
            .validator
            .validate(
                &state.final_content,
                &state.request.message,
                &state.specs,
                cancel,
            )
            .await
        {
            Ok(result) => {
                let confidence = result.confidence.clamp(0.0, 1.0);
                state.confidence_score = confidence;
                if confidence >= ACCEPTANCE_THRESHOLD {
                    state.is_validated = true;
                } else {
                    state.is_validated = false;
                    state.validation_feedback = Some(
                        result
                            .feedback
                            .unwrap_or_else(|| format!("Confidence too low: {confidence:.2}")),
                    );
                }
            }
            Err(err) if err.kind == WorkflowErrorKind::Cancelled => return Err(err),
            Err(err) => {
                let err = validation_internal(err.message);
                tracing::warn!(
                    target: "workflow",
                    execution_id = %state.execution_id,
                    error = %err,
                    "validator_failed_accepting_response"
                );
                self.node_failed(state, WorkflowNode::ValidateResponse, &err);
                state.record_error(format!("Validation error: {err}"));
                state.confidence_score = VALIDATOR_FAILURE_CONFIDENCE;
                state.is_validated = true;
            }
        }
        self.attempt_scored(state);
        Ok(())
    }

    fn finalize(&self, state: &mut WorkflowState, cancelled: bool) {
        state.record_step(WorkflowNode::Finalize.as_str());

        if !state.is_validated && state.confidence_score < ACCEPTANCE_THRESHOLD {
            tracing::warn!(
                target: "workflow",
                execution_id = %state.execution_id,
                confidence = state.confidence_score,
                cancelled,
                "low_confidence_fallback_applied"
            );
            let confidence = state.confidence_score;
            state.final_content = FALLBACK_MESSAGES[0].to_string();
            state.fallback_applied = true;
            state.record_error(format!(
                "Low confidence response ({confidence:.2}) replaced with fallback"
            ));
        }

        let status = if cancelled {
            WorkflowStatus::Cancelled
        } else if state.errors.is_empty() {
            WorkflowStatus::Completed
        } else {
            WorkflowStatus::CompletedWithErrors
        };
        state.mark_finished(status);

        if state.specs.processing.eval {
            tracing::info!(
                target: "workflow",
                execution_id = %state.execution_id,
                steps = %state.execution_steps.join(","),
                attempts = state.validation_attempts,
                confidence = state.confidence_score,
                error_count = state.errors.len(),
                duration_seconds = state.duration_seconds(),
                "evaluation_trace"
            );
        }
        self.emit(WorkflowTelemetryEvent::ExecutionFinished {
            execution_id: state.execution_id.clone(),
            status: state.status,
            validation_attempts: state.validation_attempts,
        });
    }

    fn node_failed(&self, state: &WorkflowState, node: WorkflowNode, err: &WorkflowError) {
        self.emit(WorkflowTelemetryEvent::NodeFailed {
            execution_id: state.execution_id.clone(),
            node: node.as_str(),
            kind: err.kind,
        });
    }

    fn attempt_scored(&self, state: &WorkflowState) {
        self.emit(WorkflowTelemetryEvent::AttemptScored {
            execution_id: state.execution_id.clone(),
            attempt: state.validation_attempts,
            confidence: state.confidence_score,
            accepted: state.is_validated,
        });
    }

    fn emit(&self, event: WorkflowTelemetryEvent) {
        match &event {
            WorkflowTelemetryEvent::ExecutionStarted { execution_id } => {
                tracing::debug!(
                    target: "workflow",
                    execution_id = %execution_id,
                    "execution_started"
                );
            }
            WorkflowTelemetryEvent::NodeFailed {
                execution_id,
                node,
                kind,
            } => {
                tracing::debug!(
                    target: "workflow",
                    execution_id = %execution_id,
                    node = *node,
                    kind = ?kind,
                    "node_failed"
                );
            }
            WorkflowTelemetryEvent::AttemptScored {
                execution_id,
                attempt,
                confidence,
                accepted,
            } => {
                tracing::debug!(
                    target: "workflow",
                    execution_id = %execution_id,
                    attempt = *attempt,
                    confidence = *confidence,
                    accepted = *accepted,
                    "attempt_scored"
                );
            }
            WorkflowTelemetryEvent::ExecutionFinished {
                execution_id,
                status,
                validation_attempts,
            } => {
                tracing::info!(
                    target: "workflow",
                    execution_id = %execution_id,
                    status = status.as_str(),
                    validation_attempts = *validation_attempts,
                    "execution_finished"
                );
            }
        }

        if let Some(hook) = &self.telemetry_hook {
            hook(event);
        }
    }
}
