pub mod capabilities;
pub mod providers;

use serde::{Deserialize, Serialize};

pub use capabilities::CapabilitySet;
pub use providers::{
    ProviderCatalogEntry, ProviderCheck, ProviderInfo, ProviderRegistry, default_provider_catalog,
};

fn default_tools() -> Vec<String> {
    vec!["tavily_search".to_string()]
}

fn default_data_sources() -> Vec<String> {
    vec![
        "knowledge_base".to_string(),
        "conversation_history".to_string(),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_provider_catalog")]
    pub providers: Vec<ProviderCatalogEntry>,
    #[serde(default = "default_tools")]
    pub tools: Vec<String>,
    #[serde(default = "default_data_sources")]
    pub data_sources: Vec<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            providers: default_provider_catalog(),
            tools: default_tools(),
            data_sources: default_data_sources(),
        }
    }
}

/// Every availability check the orchestrator runs before execution.
#[derive(Debug, Clone)]
pub struct CapabilityRegistries {
    pub providers: ProviderRegistry,
    pub tools: CapabilitySet,
    pub data_sources: CapabilitySet,
}

impl CapabilityRegistries {
    pub fn new(
        config: &RegistryConfig,
        installed_providers: Vec<String>,
        installed_tools: Vec<String>,
        installed_data_sources: Vec<String>,
    ) -> Self {
        Self {
            providers: ProviderRegistry::new(config.providers.clone(), installed_providers),
            tools: CapabilitySet::new(config.tools.clone(), installed_tools),
            data_sources: CapabilitySet::new(config.data_sources.clone(), installed_data_sources),
        }
    }

    pub fn check_provider_and_model(
        &self,
        provider_type: &str,
        model: Option<&str>,
    ) -> ProviderCheck {
        self.providers.check_provider_and_model(provider_type, model)
    }

    pub fn check_tool_available(&self, name: &str) -> bool {
        self.tools.contains(name)
    }

    pub fn check_data_source_available(&self, name: &str) -> bool {
        self.data_sources.contains(name)
    }
}
