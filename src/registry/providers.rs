use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCatalogEntry {
    pub provider_type: String,
    pub models: Vec<String>,
    #[serde(default)]
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub provider_type: String,
    pub model: String,
    pub available: bool,
}

/// Outcome of `check_provider_and_model`: `(valid, errors, info)` as a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCheck {
    pub valid: bool,
    pub errors: Vec<String>,
    pub info: Option<ProviderInfo>,
}

impl ProviderCheck {
    fn rejected(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            errors,
            info: None,
        }
    }
}

pub fn default_provider_catalog() -> Vec<ProviderCatalogEntry> {
    fn entry(provider_type: &str, models: &[&str], default_model: &str) -> ProviderCatalogEntry {
        ProviderCatalogEntry {
            provider_type: provider_type.to_string(),
            models: models.iter().map(|model| model.to_string()).collect(),
            default_model: Some(default_model.to_string()),
        }
    }

    vec![
        entry(
            "openai",
            &[
                "gpt-4o",
                "gpt-4o-mini",
                "gpt-4-turbo",
                "gpt-4",
                "gpt-3.5-turbo",
            ],
            "gpt-4o-mini",
        ),
        entry(
            "anthropic",
            &[
                "claude-3-5-sonnet-20241022",
                "claude-3-5-haiku-20241022",
                "claude-3-opus-20240229",
                "claude-3-sonnet-20240229",
                "claude-3-haiku-20240307",
            ],
            "claude-3-5-sonnet-20241022",
        ),
        entry(
            "gemini",
            &[
                "gemini-1.5-flash",
                "gemini-1.5-pro",
                "gemini-1.0-pro",
                "gemini-1.5-flash-8b",
                "gemini-1.5-pro-002",
            ],
            "gemini-1.5-flash",
        ),
    ]
}

/// Known providers and their models, restricted to providers with an installed client.
///
/// Read-only after construction; every check is a pure lookup.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    catalog: BTreeMap<String, ProviderCatalogEntry>,
    installed: BTreeSet<String>,
}

impl ProviderRegistry {
    pub fn new(
        catalog: impl IntoIterator<Item = ProviderCatalogEntry>,
        installed: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            catalog: catalog
                .into_iter()
                .map(|entry| (entry.provider_type.clone(), entry))
                .collect(),
            installed: installed.into_iter().collect(),
        }
    }

    pub fn provider_types(&self) -> Vec<String> {
        self.catalog.keys().cloned().collect()
    }

    pub fn models(&self, provider_type: &str) -> Option<&[String]> {
        self.catalog
            .get(provider_type)
            .map(|entry| entry.models.as_slice())
    }

    pub fn default_model(&self, provider_type: &str) -> Option<&str> {
        self.catalog
            .get(provider_type)
            .and_then(|entry| entry.default_model.as_deref())
    }

    pub fn check_provider_and_model(
        &self,
        provider_type: &str,
        model: Option<&str>,
    ) -> ProviderCheck {
        let Some(entry) = self.catalog.get(provider_type) else {
            return ProviderCheck::rejected(vec![format!(
                "Provider '{}' not found. Available: {:?}",
                provider_type,
                self.provider_types()
            )]);
        };

        if !self.installed.contains(provider_type) {
            return ProviderCheck::rejected(vec![format!(
                "Provider '{}' has no installed client",
                provider_type
            )]);
        }

        let resolved_model = match model.filter(|model| !model.trim().is_empty()) {
            Some(model) if entry.models.iter().any(|known| known == model) => model.to_string(),
            Some(model) => {
                let owner = self
                    .catalog
                    .values()
                    .find(|other| other.models.iter().any(|known| known == model));
                let error = match owner {
                    Some(owner) => format!(
                        "Model '{}' belongs to provider '{}', not '{}'. \
                         Use provider '{}' or choose a model from {:?}",
                        model, owner.provider_type, provider_type, owner.provider_type, entry.models
                    ),
                    None => format!(
                        "Model '{}' not found in any provider. Available models for '{}': {:?}",
                        model, provider_type, entry.models
                    ),
                };
                return ProviderCheck::rejected(vec![error]);
            }
            None => match &entry.default_model {
                Some(default_model) => default_model.clone(),
                None => {
                    return ProviderCheck::rejected(vec![format!(
                        "No model specified and no default_model for provider '{}'",
                        provider_type
                    )]);
                }
            },
        };

        ProviderCheck {
            valid: true,
            errors: Vec::new(),
            info: Some(ProviderInfo {
                provider_type: provider_type.to_string(),
                model: resolved_model,
                available: true,
            }),
        }
    }
}
