use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    conversation::ConversationConfig, guardrails::SecurityConfig,
    provider_gateway::ProviderGatewayConfig, registry::RegistryConfig,
    retrieval::RetrievalConfig, workflow::WorkflowConfig,
};

const SCHEMA_FILE_NAME: &str = "brain.schema.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub providers: ProviderGatewayConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogRotation {
    Daily,
    Hourly,
}

/// Where and how the JSON log files are written. Missing keys keep their
/// defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    pub filter: String,
    pub rotation: LogRotation,
    pub retention_days: usize,
    pub stderr_warn_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./logs/brain"),
            filter: "info".to_string(),
            rotation: LogRotation::Daily,
            retention_days: 14,
            stderr_warn_enabled: true,
        }
    }
}

impl Config {
    /// Reads a JSON5 file, checks it against its JSON Schema and fills the
    /// section defaults. A relative log directory is anchored at the
    /// config file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("cannot read brain config {}", path.display()))?;
        let document: Value = json5::from_str(&raw)
            .with_context(|| format!("brain config {} is not valid JSON5", path.display()))?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let schema_path = schema_location(base_dir, &document)?;
        check_schema(&document, &schema_path)?;

        let mut config: Config = serde_json::from_value(document)
            .context("brain config sections do not deserialize")?;
        config.logging.dir = anchored(base_dir, &config.logging.dir);
        Ok(config)
    }
}

fn anchored(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn schema_location(base_dir: &Path, document: &Value) -> Result<PathBuf> {
    if let Some(declared) = document.get("$schema").and_then(Value::as_str) {
        return Ok(anchored(base_dir, Path::new(declared)));
    }
    let sibling = base_dir.join(SCHEMA_FILE_NAME);
    if !sibling.exists() {
        bail!("config declares no $schema and {SCHEMA_FILE_NAME} is missing beside it");
    }
    Ok(sibling)
}

fn check_schema(document: &Value, schema_path: &Path) -> Result<()> {
    let schema_text = fs::read_to_string(schema_path)
        .with_context(|| format!("cannot read schema {}", schema_path.display()))?;
    let schema: Value = serde_json::from_str(&schema_text)
        .with_context(|| format!("schema {} is not valid JSON", schema_path.display()))?;
    let compiled = JSONSchema::compile(&schema)
        .map_err(|err| anyhow!("schema {} does not compile: {err}", schema_path.display()))?;

    if let Err(violations) = compiled.validate(document) {
        let details: Vec<String> = violations
            .map(|violation| format!("{}: {violation}", violation.instance_path))
            .collect();
        bail!("config validation failed: {}", details.join("; "));
    }
    Ok(())
}
