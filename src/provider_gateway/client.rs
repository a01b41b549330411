use std::time::Duration;

use async_trait::async_trait;

use crate::{
    provider_gateway::{
        budget::BudgetLease,
        error::GatewayError,
        types::{GenerationResponse, SamplingParams},
    },
    types::ChatMessage,
};

/// One provider connection, acquired per call and closed afterwards.
///
/// Implementations never fail past this boundary: an unconfigured or broken
/// client reports `success = false` with the reason in the metadata.
#[async_trait]
pub trait ProviderClient: Send {
    fn provider_type(&self) -> &str;
    fn model(&self) -> &str;

    async fn initialize(&mut self) -> bool;

    async fn generate_response(
        &mut self,
        messages: &[ChatMessage],
        params: &SamplingParams,
    ) -> GenerationResponse;

    async fn close(&mut self);
}

#[async_trait]
pub trait ProviderFactory: Send + Sync {
    /// Provider types this factory can build clients for.
    fn installed(&self) -> Vec<String>;

    async fn acquire(
        &self,
        provider_type: &str,
        model: &str,
        timeout: Option<Duration>,
    ) -> Result<ProviderHandle, GatewayError>;
}

pub struct ProviderHandle {
    client: Box<dyn ProviderClient>,
    lease: Option<BudgetLease>,
    closed: bool,
}

impl ProviderHandle {
    pub fn new(client: Box<dyn ProviderClient>, lease: Option<BudgetLease>) -> Self {
        Self {
            client,
            lease,
            closed: false,
        }
    }

    pub fn provider_type(&self) -> &str {
        self.client.provider_type()
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    pub fn effective_timeout(&self) -> Option<Duration> {
        self.lease.as_ref().map(|lease| lease.effective_timeout)
    }

    pub async fn generate(
        &mut self,
        messages: &[ChatMessage],
        params: &SamplingParams,
    ) -> GenerationResponse {
        self.client.generate_response(messages, params).await
    }

    pub async fn release(mut self) {
        self.client.close().await;
        self.closed = true;
        if let Some(lease) = self.lease.take() {
            lease.release();
        }
        tracing::debug!(
            target: "provider_gateway",
            provider_type = %self.client.provider_type(),
            model = %self.client.model(),
            "provider_handle_released"
        );
    }
}

impl Drop for ProviderHandle {
    fn drop(&mut self) {
        if !self.closed {
            tracing::warn!(
                target: "provider_gateway",
                provider_type = %self.client.provider_type(),
                model = %self.client.model(),
                "provider_handle_dropped_without_close"
            );
        }
    }
}
