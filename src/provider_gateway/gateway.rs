use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Client;

use crate::provider_gateway::{
    budget::BudgetEnforcer,
    client::{ProviderClient, ProviderFactory, ProviderHandle},
    credentials::CredentialProvider,
    error::{GatewayError, GatewayErrorKind, internal_error, not_configured},
    openai_compatible::OpenAiCompatibleClient,
    types::ProviderGatewayConfig,
};

/// Builds per-call provider clients from the configured endpoints.
pub struct ProviderGateway {
    config: ProviderGatewayConfig,
    credentials: Arc<dyn CredentialProvider>,
    budget: BudgetEnforcer,
    http: Client,
}

impl ProviderGateway {
    pub fn new(
        config: ProviderGatewayConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| internal_error(format!("failed to build http client: {}", err)))?;

        Ok(Self {
            budget: BudgetEnforcer::new(config.budget.clone()),
            config,
            credentials,
            http,
        })
    }
}

#[async_trait]
impl ProviderFactory for ProviderGateway {
    fn installed(&self) -> Vec<String> {
        self.config
            .endpoints
            .iter()
            .map(|endpoint| endpoint.provider_type.clone())
            .collect()
    }

    async fn acquire(
        &self,
        provider_type: &str,
        model: &str,
        timeout: Option<Duration>,
    ) -> Result<ProviderHandle, GatewayError> {
        let endpoint = self.config.endpoint(provider_type).ok_or_else(|| {
            not_configured(format!("provider '{}' has no configured endpoint", provider_type))
                .with_provider(provider_type)
        })?;

        let lease = self.budget.pre_dispatch(provider_type, timeout).await?;
        let mut client = OpenAiCompatibleClient::new(
            self.http.clone(),
            endpoint.clone(),
            model,
            Arc::clone(&self.credentials),
            lease.effective_timeout,
        );

        if !client.initialize().await {
            client.close().await;
            lease.release();
            return Err(GatewayError::new(
                GatewayErrorKind::Authentication,
                format!("provider '{}' failed to initialize", provider_type),
            )
            .with_retryable(false)
            .with_provider(provider_type));
        }

        tracing::debug!(
            target: "provider_gateway",
            provider_type = provider_type,
            model = model,
            timeout_ms = lease.effective_timeout.as_millis() as u64,
            "provider_handle_acquired"
        );
        Ok(ProviderHandle::new(Box::new(client), Some(lease)))
    }
}
