use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use validator::Validate;

use crate::provider_gateway::SamplingParams;

fn default_enabled() -> bool {
    true
}

fn default_retrieval_limit() -> usize {
    5
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_max_iterations() -> u32 {
    3
}

fn default_timeout_seconds() -> f64 {
    30.0
}

fn default_reasoning_threshold() -> f64 {
    0.7
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct DataSourceRequest {
    #[validate(length(min = 1))]
    pub source_type: String,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub filters: BTreeMap<String, Value>,
    #[serde(default = "default_retrieval_limit")]
    #[validate(range(min = 1, max = 100))]
    pub limit: usize,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub config: Value,
}

impl DataSourceRequest {
    pub fn new(source_type: impl Into<String>) -> Self {
        Self {
            source_type: source_type.into(),
            query: None,
            filters: BTreeMap::new(),
            limit: default_retrieval_limit(),
            enabled: true,
            config: Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ProviderRequest {
    pub provider_type: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    #[validate(range(min = 1))]
    pub max_tokens: u32,
    #[serde(default)]
    pub custom_params: BTreeMap<String, Value>,
}

impl ProviderRequest {
    pub fn new(provider_type: impl Into<String>, model: Option<&str>) -> Self {
        Self {
            provider_type: provider_type.into(),
            model: model.map(str::to_string),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            custom_params: BTreeMap::new(),
        }
    }

    pub fn sampling_params(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            custom: self.custom_params.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ToolRequest {
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub config: BTreeMap<String, Value>,
    #[serde(default)]
    pub required_params: Vec<String>,
}

impl ToolRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            config: BTreeMap::new(),
            required_params: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStrategy {
    #[default]
    Direct,
    Reasoned,
    Adaptive,
}

impl ExecutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStrategy::Direct => "direct",
            ExecutionStrategy::Reasoned => "reasoned",
            ExecutionStrategy::Adaptive => "adaptive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ProcessingPolicy {
    #[serde(default = "default_max_iterations")]
    #[validate(range(min = 1))]
    pub max_iterations: u32,
    #[serde(default = "default_timeout_seconds")]
    #[validate(range(exclusive_min = 0.0))]
    pub timeout_seconds: f64,
    #[serde(default)]
    pub execution_strategy: ExecutionStrategy,
    #[serde(default = "default_reasoning_threshold")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub reasoning_threshold: f64,
    #[serde(default)]
    pub eval: bool,
    #[serde(default = "default_enabled")]
    pub enable_safety_checks: bool,
}

impl Default for ProcessingPolicy {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            timeout_seconds: default_timeout_seconds(),
            execution_strategy: ExecutionStrategy::Direct,
            reasoning_threshold: default_reasoning_threshold(),
            eval: false,
            enable_safety_checks: true,
        }
    }
}

impl ProcessingPolicy {
    /// Per-call deadline for every external call made on behalf of the request.
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_seconds)
            .ok()
            .filter(|timeout| !timeout.is_zero())
            .unwrap_or_else(|| Duration::from_secs_f64(default_timeout_seconds()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

/// Prompt material a calling persona supplies instead of the generic assembly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMessageContext {
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub conversation_history: Vec<HistoryEntry>,
    #[serde(default)]
    pub current_message: Option<String>,
}

/// How one request should be satisfied. Read-only once execution starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct ExecutionSpec {
    #[serde(default)]
    #[validate(nested)]
    pub data_sources: Vec<DataSourceRequest>,
    #[serde(default)]
    #[validate(nested)]
    pub provider: Option<ProviderRequest>,
    #[serde(default)]
    #[validate(nested)]
    pub tools: Vec<ToolRequest>,
    #[serde(default)]
    #[validate(nested)]
    pub processing: ProcessingPolicy,
    #[serde(default)]
    pub agent_context: Option<AgentMessageContext>,
}

impl ExecutionSpec {
    pub fn direct(provider: ProviderRequest) -> Self {
        Self {
            provider: Some(provider),
            ..Default::default()
        }
    }

    pub fn enabled_data_sources(&self) -> impl Iterator<Item = &DataSourceRequest> {
        self.data_sources.iter().filter(|source| source.enabled)
    }

    pub fn enabled_tools(&self) -> impl Iterator<Item = &ToolRequest> {
        self.tools.iter().filter(|tool| tool.enabled)
    }

    /// Stable digest of the spec, independent of map ordering.
    pub fn fingerprint(&self) -> String {
        let value = serde_json::to_value(self).unwrap_or(Value::Null);
        let mut hasher = Sha256::new();
        hasher.update(canonicalize_json(&value).to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

pub(crate) fn canonicalize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys = map.keys().cloned().collect::<Vec<_>>();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                if let Some(item) = map.get(&key) {
                    sorted.insert(key, canonicalize_json(item));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize_json).collect()),
        primitive => primitive.clone(),
    }
}
