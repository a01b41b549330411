use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

use crate::provider_gateway::{
    error::{GatewayError, GatewayErrorKind},
    types::BudgetConfig,
};

/// Caps concurrent generation calls per provider and bounds their duration.
#[derive(Clone)]
pub struct BudgetEnforcer {
    config: BudgetConfig,
    permits: Arc<Mutex<HashMap<String, Arc<Semaphore>>>>,
}

#[derive(Debug)]
pub struct BudgetLease {
    pub provider_type: String,
    pub effective_timeout: Duration,
    permit: Option<OwnedSemaphorePermit>,
}

impl BudgetLease {
    pub fn release(mut self) {
        let _ = self.permit.take();
    }
}

impl BudgetEnforcer {
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            config,
            permits: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn pre_dispatch(
        &self,
        provider_type: &str,
        requested_timeout: Option<Duration>,
    ) -> Result<BudgetLease, GatewayError> {
        let semaphore = {
            let mut guard = self.permits.lock().await;
            guard
                .entry(provider_type.to_string())
                .or_insert_with(|| {
                    Arc::new(Semaphore::new(
                        self.config.max_concurrency_per_provider.max(1) as usize,
                    ))
                })
                .clone()
        };

        let permit = semaphore.acquire_owned().await.map_err(|_| {
            GatewayError::new(
                GatewayErrorKind::Internal,
                "failed to acquire provider concurrency permit",
            )
            .with_retryable(false)
            .with_provider(provider_type)
        })?;

        let ceiling = Duration::from_millis(self.config.max_request_time_ms.max(1));
        let effective_timeout = requested_timeout
            .map(|requested| requested.min(ceiling))
            .unwrap_or(ceiling);

        Ok(BudgetLease {
            provider_type: provider_type.to_string(),
            effective_timeout,
            permit: Some(permit),
        })
    }

    pub async fn available_permits(&self, provider_type: &str) -> usize {
        self.permits
            .lock()
            .await
            .get(provider_type)
            .map(|semaphore| semaphore.available_permits())
            .unwrap_or(self.config.max_concurrency_per_provider.max(1) as usize)
    }
}
