use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, header};
use serde_json::{Map, Value, json};

use crate::{
    provider_gateway::{
        client::ProviderClient,
        credentials::CredentialProvider,
        error::{GatewayError, GatewayErrorKind, map_http_error},
        types::{
            GenerationMetadata, GenerationResponse, GenerationUsage, ProviderEndpointConfig,
            ResolvedCredential, SamplingParams,
        },
    },
    types::ChatMessage,
};

/// Chat-completions client for any provider exposing the OpenAI wire format.
pub struct OpenAiCompatibleClient {
    http: Client,
    endpoint: ProviderEndpointConfig,
    model: String,
    credentials: Arc<dyn CredentialProvider>,
    timeout: Duration,
    credential: Option<ResolvedCredential>,
}

impl OpenAiCompatibleClient {
    pub fn new(
        http: Client,
        endpoint: ProviderEndpointConfig,
        model: impl Into<String>,
        credentials: Arc<dyn CredentialProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            endpoint,
            model: model.into(),
            credentials,
            timeout,
            credential: None,
        }
    }

    fn request_body(&self, messages: &[ChatMessage], params: &SamplingParams) -> Value {
        let wire_messages = messages
            .iter()
            .map(|message| json!({"role": message.role.as_str(), "content": message.content}))
            .collect::<Vec<_>>();

        let mut body = Map::new();
        body.insert("model".to_string(), Value::String(self.model.clone()));
        body.insert("messages".to_string(), Value::Array(wire_messages));
        body.insert("temperature".to_string(), json!(params.temperature));
        body.insert("max_tokens".to_string(), json!(params.max_tokens));
        for (key, value) in &params.custom {
            body.entry(key.clone()).or_insert_with(|| value.clone());
        }
        Value::Object(body)
    }

    async fn send(
        &self,
        credential: &ResolvedCredential,
        body: Value,
    ) -> Result<GenerationResponse, GatewayError> {
        let provider_type = self.endpoint.provider_type.as_str();
        let url = format!(
            "{}/chat/completions",
            self.endpoint.endpoint.trim_end_matches('/')
        );

        let mut request = self
            .http
            .post(url)
            .timeout(self.timeout)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body);
        if let Some(auth_header) = &credential.auth_header {
            request = request.header(header::AUTHORIZATION, auth_header);
        }
        for (name, value) in &credential.extra_headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|err| {
            let kind = if err.is_timeout() {
                GatewayErrorKind::Timeout
            } else {
                GatewayErrorKind::BackendTransient
            };
            GatewayError::new(kind, format!("request failed: {}", err)).with_provider(provider_type)
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, provider_type, &text));
        }

        let payload: Value = response.json().await.map_err(|err| {
            GatewayError::new(
                GatewayErrorKind::ProtocolViolation,
                format!("failed to decode completion payload: {}", err),
            )
            .with_provider(provider_type)
        })?;

        parse_completion(provider_type, &self.model, &payload)
    }
}

#[async_trait]
impl ProviderClient for OpenAiCompatibleClient {
    fn provider_type(&self) -> &str {
        &self.endpoint.provider_type
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn initialize(&mut self) -> bool {
        match self
            .credentials
            .resolve(&self.endpoint.credential, &self.endpoint.provider_type)
            .await
        {
            Ok(credential) => {
                self.credential = Some(credential);
                true
            }
            Err(err) => {
                tracing::warn!(
                    target: "provider_gateway",
                    provider_type = %self.endpoint.provider_type,
                    error = %err,
                    "provider_initialize_failed"
                );
                false
            }
        }
    }

    async fn generate_response(
        &mut self,
        messages: &[ChatMessage],
        params: &SamplingParams,
    ) -> GenerationResponse {
        let Some(credential) = self.credential.clone() else {
            return GenerationResponse::failure(
                &self.endpoint.provider_type,
                &self.model,
                "provider client is not initialized",
            );
        };

        let body = self.request_body(messages, params);
        match self.send(&credential, body).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(
                    target: "provider_gateway",
                    provider_type = %self.endpoint.provider_type,
                    model = %self.model,
                    kind = ?err.kind,
                    error = %err,
                    "generation_failed"
                );
                GenerationResponse::failure(
                    &self.endpoint.provider_type,
                    &self.model,
                    err.to_string(),
                )
            }
        }
    }

    async fn close(&mut self) {
        self.credential = None;
    }
}

pub fn parse_completion(
    provider_type: &str,
    model: &str,
    payload: &Value,
) -> Result<GenerationResponse, GatewayError> {
    let choice = payload
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .ok_or_else(|| {
            GatewayError::new(
                GatewayErrorKind::ProtocolViolation,
                "completion payload has no choices",
            )
            .with_provider(provider_type)
        })?;

    let content = choice
        .pointer("/message/content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let finish_reason = choice
        .get("finish_reason")
        .and_then(Value::as_str)
        .map(str::to_string);
    let usage = payload.get("usage").map(|usage| GenerationUsage {
        prompt_tokens: usage.get("prompt_tokens").and_then(Value::as_u64),
        completion_tokens: usage.get("completion_tokens").and_then(Value::as_u64),
        total_tokens: usage.get("total_tokens").and_then(Value::as_u64),
    });
    let reported_model = payload
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or(model)
        .to_string();

    Ok(GenerationResponse {
        content,
        success: true,
        metadata: GenerationMetadata {
            provider_type: provider_type.to_string(),
            model: reported_model,
            usage,
            finish_reason,
            error: None,
        },
    })
}
