use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Instant,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    config::Config,
    conversation::{ConversationMessage, ConversationStore},
    evaluation::{LatencyStats, LatencyTracker},
    guardrails::{GuardrailError, SecurityManager, content_flags_metadata, sanitize_input},
    planner::{
        ExecutionSpec, HeuristicReasoner, PlanError, PlanErrorKind, PlanSummary, Planner,
        ReasoningPort, validate_plan,
    },
    provider_gateway::{ProviderFactory, ProviderGateway, credentials::EnvCredentialProvider},
    registry::CapabilityRegistries,
    retrieval::{AdapterCatalog, build_default_adapters},
    types::{BrainRequest, ChatRole},
    workflow::{
        ExecutionResult, HeuristicResponseValidator, ResponseValidator, WorkflowConfig,
        WorkflowEngine, WorkflowStatus, WorkflowTelemetryHook,
    },
};

/// Request-level failures. Each one becomes an unsuccessful [`BrainResponse`].
#[derive(Debug, Error)]
pub enum BrainError {
    #[error("Authentication failed: {0}")]
    Authentication(GuardrailError),
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error("Provider validation failed: {}", .0.join(", "))]
    ProviderRejected(Vec<String>),
    #[error("Tool '{0}' not available")]
    ToolUnavailable(String),
    #[error("Data source '{0}' not available")]
    DataSourceUnavailable(String),
    #[error("{0}")]
    Plan(#[from] PlanError),
    #[error("Request cancelled: {0}")]
    Cancelled(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub execution_steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanSummary>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub security: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrainResponse {
    pub success: bool,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkflowStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub metadata: ResponseMetadata,
    pub processing_time_seconds: f64,
}

impl BrainResponse {
    pub fn from_error(err: &BrainError, processing_time_seconds: f64) -> Self {
        let message = err.to_string();
        let status = matches!(err, BrainError::Cancelled(_)).then_some(WorkflowStatus::Cancelled);
        Self {
            success: false,
            content: message.clone(),
            execution_id: None,
            status,
            confidence: None,
            metadata: ResponseMetadata {
                error: Some(message),
                ..Default::default()
            },
            processing_time_seconds,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrainAnalytics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_processing_time: f64,
    pub requests_by_application: HashMap<String, u64>,
}

impl BrainAnalytics {
    fn record(&mut self, application: &str, success: bool, seconds: f64) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
        let count = self.total_requests as f64;
        self.average_processing_time += (seconds - self.average_processing_time) / count;
        *self
            .requests_by_application
            .entry(application.to_string())
            .or_default() += 1;
    }
}

/// Collaborators a [`Brain`] runs on. Everything optional falls back to the
/// heuristic implementations.
pub struct BrainParts {
    pub security: SecurityManager,
    pub registries: Arc<CapabilityRegistries>,
    pub providers: Arc<dyn ProviderFactory>,
    pub adapters: AdapterCatalog,
    pub conversations: Arc<ConversationStore>,
    pub workflow: WorkflowConfig,
    pub reasoner: Option<Arc<dyn ReasoningPort>>,
    pub validator: Option<Arc<dyn ResponseValidator>>,
    pub latency: Option<Arc<LatencyTracker>>,
    pub telemetry_hook: Option<WorkflowTelemetryHook>,
}

/// Guardrails, capability checks, planning and workflow execution for one
/// request at a time per caller task. Shared state is limited to the rate
/// limiter, sessions, conversations and analytics.
pub struct Brain {
    security: SecurityManager,
    registries: Arc<CapabilityRegistries>,
    planner: Planner,
    engine: WorkflowEngine,
    conversations: Arc<ConversationStore>,
    latency: Arc<LatencyTracker>,
    analytics: Mutex<BrainAnalytics>,
}

impl Brain {
    pub fn new(parts: BrainParts) -> Self {
        let latency = parts.latency.unwrap_or_default();
        let reasoner = parts
            .reasoner
            .unwrap_or_else(|| Arc::new(HeuristicReasoner::default()));
        let validator = parts.validator.unwrap_or_else(|| {
            Arc::new(HeuristicResponseValidator::new(
                Arc::clone(&parts.providers),
                Arc::clone(&parts.registries),
            ))
        });

        Self {
            planner: Planner::new(reasoner, Arc::clone(&latency)),
            engine: WorkflowEngine::new(
                parts.workflow,
                parts.providers,
                parts.adapters,
                Arc::clone(&parts.registries),
                validator,
                parts.telemetry_hook,
            ),
            security: parts.security,
            registries: parts.registries,
            conversations: parts.conversations,
            latency,
            analytics: Mutex::new(BrainAnalytics::default()),
        }
    }

    /// Wires the HTTP provider gateway and the built-in retrieval adapters.
    pub fn from_config(config: &Config) -> Result<Self, BrainError> {
        let gateway =
            ProviderGateway::new(config.providers.clone(), Arc::new(EnvCredentialProvider))
                .map_err(|err| BrainError::Internal(err.to_string()))?;
        let providers: Arc<dyn ProviderFactory> = Arc::new(gateway);
        let conversations = Arc::new(ConversationStore::new(config.conversation.clone()));
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| BrainError::Internal(format!("failed to build http client: {err}")))?;
        let adapters = build_default_adapters(&config.retrieval, Arc::clone(&conversations), http);
        let registries = Arc::new(CapabilityRegistries::new(
            &config.registry,
            providers.installed(),
            adapters.installed_tools(),
            adapters.installed_data_sources(),
        ));

        Ok(Self::new(BrainParts {
            security: SecurityManager::new(config.security.clone()),
            registries,
            providers,
            adapters,
            conversations,
            workflow: config.workflow.clone(),
            reasoner: None,
            validator: None,
            latency: None,
            telemetry_hook: None,
        }))
    }

    pub async fn process_request(
        &self,
        spec: &ExecutionSpec,
        request: BrainRequest,
    ) -> BrainResponse {
        self.process_request_with_cancel(spec, request, &CancellationToken::new())
            .await
    }

    /// Never fails: request-level errors come back as an unsuccessful response.
    pub async fn process_request_with_cancel(
        &self,
        spec: &ExecutionSpec,
        request: BrainRequest,
        cancel: &CancellationToken,
    ) -> BrainResponse {
        let started = Instant::now();
        let application = request.application.clone();
        let request_id = request.id.clone();
        let span = tracing::info_span!(
            target: "brain",
            "process_request",
            request_id = %request_id,
            application = %application,
        );
        let outcome = self.run(spec, request, cancel).instrument(span).await;
        let elapsed = started.elapsed().as_secs_f64();

        let response = match outcome {
            Ok(mut response) => {
                response.processing_time_seconds = elapsed;
                self.latency.record(elapsed).await;
                response
            }
            Err(err) => {
                tracing::warn!(
                    target: "brain",
                    request_id = %request_id,
                    error = %err,
                    "request_refused"
                );
                BrainResponse::from_error(&err, elapsed)
            }
        };

        self.analytics
            .lock()
            .await
            .record(&application, response.success, elapsed);
        tracing::info!(
            target: "brain",
            request_id = %request_id,
            success = response.success,
            status = response.status.map(|status| status.as_str()).unwrap_or("refused"),
            processing_time_seconds = elapsed,
            "request_processed"
        );
        response
    }

    async fn run(
        &self,
        spec: &ExecutionSpec,
        mut request: BrainRequest,
        cancel: &CancellationToken,
    ) -> Result<BrainResponse, BrainError> {
        let safety = spec.processing.enable_safety_checks;
        if safety {
            request.message = sanitize_input(&request.message);
        }

        let token = request.auth_token().map(str::to_string);
        request.user_context = self
            .security
            .validate_user(&request.user_context, token.as_deref())
            .await
            .map_err(BrainError::Authentication)?;
        if !self
            .security
            .check_rate_limit(&request.user_context.user_id, &request.user_context)
            .await
        {
            return Err(BrainError::RateLimited);
        }

        let spec = self.check_capabilities(spec)?;

        let plan = self
            .planner
            .plan(&spec, &request, cancel)
            .await
            .map_err(|err| match err.kind {
                PlanErrorKind::Cancelled => BrainError::Cancelled(err.message),
                _ => BrainError::Plan(err),
            })?;
        validate_plan(&plan)?;

        let session_id = request.user_context.session_id.clone();
        let history = match session_id.as_deref() {
            Some(session_id) => {
                self.conversations
                    .recent(session_id, self.conversations.history_window())
                    .await
            }
            None => Vec::new(),
        };

        let result = self.engine.execute_plan(&plan, &request, history, cancel).await;

        let mut security = BTreeMap::new();
        let mut content = result.content.clone();
        if safety {
            let filtered = self.security.filter_content(&content);
            if !filtered.safe {
                self.security.log_security_event(
                    "content_flagged",
                    &request.user_context.user_id,
                    &filtered.flags.join(", "),
                );
            }
            security = content_flags_metadata(&filtered);
            content = filtered.content;
        }

        if let Some(session_id) = session_id.as_deref()
            && result.status.is_completed()
        {
            self.remember_turn(session_id, &request.message, &content, &result)
                .await;
        }

        Ok(BrainResponse {
            success: result.success,
            content,
            execution_id: Some(result.execution_id.clone()),
            status: Some(result.status),
            confidence: Some(result.confidence),
            metadata: ResponseMetadata {
                execution_steps: result.metadata.execution_steps,
                errors: result.metadata.errors,
                duration_seconds: Some(result.metadata.duration_seconds),
                validation_attempts: Some(result.metadata.validation_attempts),
                error: None,
                plan: Some(plan.summary()),
                security,
            },
            processing_time_seconds: 0.0,
        })
    }

    /// Resolves the provider's model against the registry so planning and
    /// execution see the same model.
    fn check_capabilities(&self, spec: &ExecutionSpec) -> Result<ExecutionSpec, BrainError> {
        let mut spec = spec.clone();
        if let Some(provider) = spec.provider.as_mut() {
            let check = self
                .registries
                .check_provider_and_model(&provider.provider_type, provider.model.as_deref());
            if !check.valid {
                return Err(BrainError::ProviderRejected(check.errors));
            }
            if let Some(info) = check.info {
                provider.model = Some(info.model);
            }
        }

        if let Some(tool) = spec
            .enabled_tools()
            .find(|tool| !self.registries.check_tool_available(&tool.name))
        {
            return Err(BrainError::ToolUnavailable(tool.name.clone()));
        }
        if let Some(source) = spec
            .enabled_data_sources()
            .find(|source| !self.registries.check_data_source_available(&source.source_type))
        {
            return Err(BrainError::DataSourceUnavailable(source.source_type.clone()));
        }
        Ok(spec)
    }

    async fn remember_turn(
        &self,
        session_id: &str,
        message: &str,
        content: &str,
        result: &ExecutionResult,
    ) {
        self.conversations
            .append(session_id, ChatRole::User, message, BTreeMap::new())
            .await;
        let mut metadata = BTreeMap::new();
        metadata.insert(
            "execution_id".to_string(),
            Value::String(result.execution_id.clone()),
        );
        metadata.insert("confidence".to_string(), Value::from(result.confidence));
        self.conversations
            .append(session_id, ChatRole::Assistant, content, metadata)
            .await;
    }

    pub fn security(&self) -> &SecurityManager {
        &self.security
    }

    pub fn registries(&self) -> &CapabilityRegistries {
        &self.registries
    }

    pub async fn cached_execution(&self, execution_id: &str) -> Option<ExecutionResult> {
        self.engine.cached_result(execution_id).await
    }

    pub async fn conversation(&self, session_id: &str) -> Vec<ConversationMessage> {
        self.conversations.history(session_id).await
    }

    pub async fn clear_conversation(&self, session_id: &str) -> bool {
        self.conversations.clear(session_id).await
    }

    pub async fn analytics(&self) -> BrainAnalytics {
        self.analytics.lock().await.clone()
    }

    pub async fn latency_statistics(&self) -> Option<LatencyStats> {
        self.latency.statistics().await
    }
}
