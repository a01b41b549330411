use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type ProviderType = String;

/// Sampling parameters forwarded with one generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(default)]
    pub custom: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub provider_type: ProviderType,
    pub model: String,
    #[serde(default)]
    pub usage: Option<GenerationUsage>,
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub content: String,
    pub success: bool,
    pub metadata: GenerationMetadata,
}

impl GenerationResponse {
    pub fn completed(
        provider_type: impl Into<String>,
        model: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            success: true,
            metadata: GenerationMetadata {
                provider_type: provider_type.into(),
                model: model.into(),
                ..Default::default()
            },
        }
    }

    pub fn failure(
        provider_type: impl Into<String>,
        model: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            content: String::new(),
            success: false,
            metadata: GenerationMetadata {
                provider_type: provider_type.into(),
                model: model.into(),
                error: Some(error.into()),
                ..Default::default()
            },
        }
    }

    pub fn error_message(&self) -> &str {
        self.metadata
            .error
            .as_deref()
            .unwrap_or("provider reported failure without details")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialRef {
    Env { var: String },
    InlineToken { token: String },
    None,
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedCredential {
    pub auth_header: Option<String>,
    pub extra_headers: Vec<(String, String)>,
}

impl ResolvedCredential {
    pub fn none() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEndpointConfig {
    pub provider_type: ProviderType,
    pub endpoint: String,
    pub credential: CredentialRef,
}

fn default_max_request_time_ms() -> u64 {
    120_000
}

fn default_max_concurrency_per_provider() -> u32 {
    4
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_max_request_time_ms")]
    pub max_request_time_ms: u64,
    #[serde(default = "default_max_concurrency_per_provider")]
    pub max_concurrency_per_provider: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_request_time_ms: default_max_request_time_ms(),
            max_concurrency_per_provider: default_max_concurrency_per_provider(),
        }
    }
}

fn default_endpoints() -> Vec<ProviderEndpointConfig> {
    vec![
        ProviderEndpointConfig {
            provider_type: "openai".to_string(),
            endpoint: "https://api.openai.com/v1".to_string(),
            credential: CredentialRef::Env {
                var: "OPENAI_API_KEY".to_string(),
            },
        },
        ProviderEndpointConfig {
            provider_type: "anthropic".to_string(),
            endpoint: "https://api.anthropic.com/v1".to_string(),
            credential: CredentialRef::Env {
                var: "ANTHROPIC_API_KEY".to_string(),
            },
        },
        ProviderEndpointConfig {
            provider_type: "gemini".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            credential: CredentialRef::Env {
                var: "GEMINI_API_KEY".to_string(),
            },
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderGatewayConfig {
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<ProviderEndpointConfig>,
    #[serde(default)]
    pub budget: BudgetConfig,
}

impl Default for ProviderGatewayConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            budget: BudgetConfig::default(),
        }
    }
}

impl ProviderGatewayConfig {
    pub fn endpoint(&self, provider_type: &str) -> Option<&ProviderEndpointConfig> {
        self.endpoints
            .iter()
            .find(|endpoint| endpoint.provider_type == provider_type)
    }
}
