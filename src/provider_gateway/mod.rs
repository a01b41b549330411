pub mod budget;
pub mod client;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod openai_compatible;
pub mod types;

pub use client::{ProviderClient, ProviderFactory, ProviderHandle};
pub use error::{GatewayError, GatewayErrorKind};
pub use gateway::ProviderGateway;
pub use types::{GenerationResponse, ProviderGatewayConfig, SamplingParams};
