#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use brain::{
    brain::{Brain, BrainParts},
    conversation::{ConversationConfig, ConversationStore},
    guardrails::{SecurityConfig, SecurityManager, UserValidationConfig},
    planner::{ExecutionSpec, PlanError, ReasoningOutcome, ReasoningPort},
    provider_gateway::{
        GatewayError, GenerationResponse, ProviderClient, ProviderFactory, ProviderHandle,
        SamplingParams,
    },
    registry::{CapabilityRegistries, RegistryConfig, default_provider_catalog},
    retrieval::{
        AdapterCatalog, AdapterError, DataSourceAdapter, RetrievalContext, RetrievedDocument,
        ToolAdapter, ToolOutcome, error::upstream_failed,
    },
    types::{BrainRequest, ChatMessage},
    workflow::{
        ResponseValidator, ValidationResult, WorkflowConfig, WorkflowError, WorkflowErrorKind,
    },
};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

pub const GOOD_ANSWER: &str =
    "Grounding means noticing five things you can see and four you can touch right now.";

/// Shared counters and captured prompts for every handle a factory hands out.
#[derive(Clone, Default)]
pub struct ProviderCounters {
    pub acquisitions: Arc<AtomicUsize>,
    pub generations: Arc<AtomicUsize>,
    pub releases: Arc<AtomicUsize>,
    pub prompts: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl ProviderCounters {
    pub fn generations(&self) -> usize {
        self.generations.load(Ordering::SeqCst)
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn prompt(&self, index: usize) -> Vec<ChatMessage> {
        self.prompts
            .lock()
            .expect("prompt log should not be poisoned")
            .get(index)
            .cloned()
            .unwrap_or_default()
    }
}

enum Script {
    Replies(VecDeque<String>),
    Failure(String),
}

/// Replies from a fixed script, repeating the last reply once it runs out.
pub struct ScriptedProviders {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
    pub counters: ProviderCounters,
}

impl ScriptedProviders {
    pub fn replying(replies: &[&str]) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script::Replies(
                replies.iter().map(|reply| reply.to_string()).collect(),
            ))),
            delay: None,
            counters: ProviderCounters::default(),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script::Failure(reason.to_string()))),
            delay: None,
            counters: ProviderCounters::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl ProviderFactory for ScriptedProviders {
    fn installed(&self) -> Vec<String> {
        vec![
            "openai".to_string(),
            "anthropic".to_string(),
            "gemini".to_string(),
        ]
    }

    async fn acquire(
        &self,
        provider_type: &str,
        model: &str,
        _timeout: Option<Duration>,
    ) -> Result<ProviderHandle, GatewayError> {
        self.counters.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(ProviderHandle::new(
            Box::new(ScriptedClient {
                provider_type: provider_type.to_string(),
                model: model.to_string(),
                script: Arc::clone(&self.script),
                delay: self.delay,
                counters: self.counters.clone(),
            }),
            None,
        ))
    }
}

struct ScriptedClient {
    provider_type: String,
    model: String,
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
    counters: ProviderCounters,
}

#[async_trait]
impl ProviderClient for ScriptedClient {
    fn provider_type(&self) -> &str {
        &self.provider_type
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn initialize(&mut self) -> bool {
        true
    }

    async fn generate_response(
        &mut self,
        messages: &[ChatMessage],
        _params: &SamplingParams,
    ) -> GenerationResponse {
        self.counters.generations.fetch_add(1, Ordering::SeqCst);
        self.counters
            .prompts
            .lock()
            .expect("prompt log should not be poisoned")
            .push(messages.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut script = self.script.lock().expect("script should not be poisoned");
        match &mut *script {
            Script::Failure(reason) => {
                GenerationResponse::failure(&self.provider_type, &self.model, reason.clone())
            }
            Script::Replies(replies) => {
                let reply = if replies.len() > 1 {
                    replies.pop_front().unwrap_or_default()
                } else {
                    replies.front().cloned().unwrap_or_default()
                };
                GenerationResponse::completed(&self.provider_type, &self.model, reply)
            }
        }
    }

    async fn close(&mut self) {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Returns scripted confidences in order, repeating the last one.
pub struct ScriptedValidator {
    confidences: Mutex<VecDeque<f64>>,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedValidator {
    pub fn new(confidences: &[f64]) -> Self {
        Self {
            confidences: Mutex::new(confidences.iter().copied().collect()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl ResponseValidator for ScriptedValidator {
    async fn validate(
        &self,
        _response: &str,
        _user_message: &str,
        _spec: &ExecutionSpec,
        _cancel: &CancellationToken,
    ) -> Result<ValidationResult, WorkflowError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut confidences = self
            .confidences
            .lock()
            .expect("confidences should not be poisoned");
        let confidence = if confidences.len() > 1 {
            confidences.pop_front().unwrap_or(0.0)
        } else {
            confidences.front().copied().unwrap_or(0.0)
        };
        if confidence >= 0.75 {
            Ok(ValidationResult::accepted(confidence))
        } else {
            Ok(ValidationResult::rejected(
                confidence,
                format!("scripted rejection at {confidence:.2}"),
            ))
        }
    }
}

/// Validator whose backend is down.
pub struct BrokenValidator;

#[async_trait]
impl ResponseValidator for BrokenValidator {
    async fn validate(
        &self,
        _response: &str,
        _user_message: &str,
        _spec: &ExecutionSpec,
        _cancel: &CancellationToken,
    ) -> Result<ValidationResult, WorkflowError> {
        Err(WorkflowError::new(
            WorkflowErrorKind::Generation,
            "grader unreachable",
        ))
    }
}

/// Rejects the response and cancels the request while doing so, as a caller
/// hanging up mid-validation would.
pub struct CancellingValidator {
    pub token: CancellationToken,
    pub confidence: f64,
}

#[async_trait]
impl ResponseValidator for CancellingValidator {
    async fn validate(
        &self,
        _response: &str,
        _user_message: &str,
        _spec: &ExecutionSpec,
        _cancel: &CancellationToken,
    ) -> Result<ValidationResult, WorkflowError> {
        self.token.cancel();
        Ok(ValidationResult::rejected(
            self.confidence,
            "caller left before a better answer",
        ))
    }
}

/// Proposes an unchanged spec with a fixed confidence, or fails.
pub struct FixedReasoner {
    confidence: f64,
    fails: bool,
    delay: Option<Duration>,
    pub calls: Arc<AtomicUsize>,
}

impl FixedReasoner {
    pub fn confident(confidence: f64) -> Self {
        Self {
            confidence,
            fails: false,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn broken() -> Self {
        Self {
            confidence: 0.0,
            fails: true,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl ReasoningPort for FixedReasoner {
    async fn optimize(
        &self,
        spec: &ExecutionSpec,
        _request: &BrainRequest,
    ) -> Result<ReasoningOutcome, PlanError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fails {
            return Err(brain::planner::error::reasoning_failed("reasoner offline"));
        }
        let mut notes = Map::new();
        notes.insert("source".to_string(), Value::String("fixed".to_string()));
        Ok(ReasoningOutcome {
            optimized_specs: Some(spec.clone()),
            confidence: self.confidence,
            notes,
        })
    }
}

/// Data source that answers with fixed documents, or fails every query.
pub struct StaticSource {
    documents: Vec<String>,
    fails: bool,
    queries: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl DataSourceAdapter for StaticSource {
    async fn initialize(&mut self, _config: &Value) -> bool {
        true
    }

    async fn query(
        &mut self,
        _query: &str,
        _context: &RetrievalContext,
        k: usize,
    ) -> Result<Vec<RetrievedDocument>, AdapterError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fails {
            return Err(upstream_failed("index unreachable"));
        }
        Ok(self
            .documents
            .iter()
            .take(k)
            .map(|content| RetrievedDocument {
                content: content.clone(),
                metadata: Default::default(),
                score: 1.0,
            })
            .collect())
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
pub struct SourceCounters {
    pub queries: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
}

impl SourceCounters {
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

pub fn with_static_source(
    catalog: AdapterCatalog,
    source_type: &str,
    documents: &[&str],
    fails: bool,
    counters: &SourceCounters,
) -> AdapterCatalog {
    let documents: Vec<String> = documents.iter().map(|doc| doc.to_string()).collect();
    let counters = counters.clone();
    catalog.with_data_source(
        source_type,
        Arc::new(move || {
            Box::new(StaticSource {
                documents: documents.clone(),
                fails,
                queries: Arc::clone(&counters.queries),
                closes: Arc::clone(&counters.closes),
            }) as Box<dyn DataSourceAdapter>
        }),
    )
}

/// Tool that echoes its `query` parameter.
pub struct EchoTool {
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ToolAdapter for EchoTool {
    fn available(&self, _name: &str) -> bool {
        true
    }

    async fn execute(
        &self,
        params: &std::collections::BTreeMap<String, Value>,
    ) -> Result<ToolOutcome, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let query = params
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(ToolOutcome::succeeded(format!("echo: {query}")))
    }
}

pub fn registries_for(
    providers: &dyn ProviderFactory,
    adapters: &AdapterCatalog,
) -> Arc<CapabilityRegistries> {
    let config = RegistryConfig {
        providers: default_provider_catalog(),
        tools: adapters.installed_tools(),
        data_sources: adapters.installed_data_sources(),
    };
    Arc::new(CapabilityRegistries::new(
        &config,
        providers.installed(),
        adapters.installed_tools(),
        adapters.installed_data_sources(),
    ))
}

pub fn open_security() -> SecurityConfig {
    SecurityConfig {
        user_validation: UserValidationConfig {
            require_auth: false,
            allow_anonymous: true,
            trusted_tokens: Vec::new(),
        },
        ..Default::default()
    }
}

pub struct BrainFixture {
    pub providers: Arc<ScriptedProviders>,
    pub adapters: AdapterCatalog,
    pub security: SecurityConfig,
    pub validator: Option<Arc<dyn ResponseValidator>>,
    pub reasoner: Option<Arc<dyn ReasoningPort>>,
    pub workflow: WorkflowConfig,
}

impl BrainFixture {
    pub fn new(providers: ScriptedProviders) -> Self {
        Self {
            providers: Arc::new(providers),
            adapters: AdapterCatalog::new(),
            security: open_security(),
            validator: None,
            reasoner: None,
            workflow: WorkflowConfig::default(),
        }
    }

    pub fn build(self) -> Brain {
        let factory: Arc<dyn ProviderFactory> = self.providers.clone();
        let registries = registries_for(factory.as_ref(), &self.adapters);
        Brain::new(BrainParts {
            security: SecurityManager::new(self.security),
            registries,
            providers: factory,
            adapters: self.adapters,
            conversations: Arc::new(ConversationStore::new(ConversationConfig::default())),
            workflow: self.workflow,
            reasoner: self.reasoner,
            validator: self.validator,
            latency: None,
            telemetry_hook: None,
        })
    }
}
