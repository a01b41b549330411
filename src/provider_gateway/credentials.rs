use std::env;

use async_trait::async_trait;

use crate::provider_gateway::{
    error::{GatewayError, GatewayErrorKind, invalid_request},
    types::{CredentialRef, ResolvedCredential},
};

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn resolve(
        &self,
        reference: &CredentialRef,
        provider_type: &str,
    ) -> Result<ResolvedCredential, GatewayError>;
}

#[derive(Default)]
pub struct EnvCredentialProvider;

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn resolve(
        &self,
        reference: &CredentialRef,
        provider_type: &str,
    ) -> Result<ResolvedCredential, GatewayError> {
        match reference {
            CredentialRef::Env { var } => {
                let token = env::var(var)
                    .ok()
                    .filter(|value| !value.trim().is_empty())
                    .ok_or_else(|| {
                        GatewayError::new(
                            GatewayErrorKind::Authentication,
                            format!(
                                "missing credential environment variable {} for provider {}",
                                var, provider_type
                            ),
                        )
                        .with_retryable(false)
                        .with_provider(provider_type)
                    })?;

                Ok(ResolvedCredential {
                    auth_header: Some(format!("Bearer {}", token)),
                    extra_headers: Vec::new(),
                })
            }
            CredentialRef::InlineToken { token } => {
                if token.trim().is_empty() {
                    return Err(invalid_request("inline credential token cannot be empty"));
                }
                Ok(ResolvedCredential {
                    auth_header: Some(format!("Bearer {}", token)),
                    extra_headers: Vec::new(),
                })
            }
            CredentialRef::None => Ok(ResolvedCredential::none()),
        }
    }
}
