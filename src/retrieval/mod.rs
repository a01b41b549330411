pub mod conversation_history;
pub mod error;
pub mod knowledge_base;
pub mod tavily;

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use error::{AdapterError, AdapterErrorKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub content: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalContext {
    pub user_id: String,
    pub session_id: Option<String>,
    pub filters: BTreeMap<String, Value>,
}

/// A data source opened for one query and closed right after.
#[async_trait]
pub trait DataSourceAdapter: Send {
    async fn initialize(&mut self, config: &Value) -> bool;

    async fn query(
        &mut self,
        query: &str,
        context: &RetrievalContext,
        k: usize,
    ) -> Result<Vec<RetrievedDocument>, AdapterError>;

    async fn close(&mut self);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn succeeded(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: Some(content.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: None,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait ToolAdapter: Send + Sync {
    fn available(&self, name: &str) -> bool;

    async fn execute(&self, params: &BTreeMap<String, Value>) -> Result<ToolOutcome, AdapterError>;
}

pub type DataSourceFactory = Arc<dyn Fn() -> Box<dyn DataSourceAdapter> + Send + Sync>;

/// Installed retrieval adapters, keyed by data source type and tool name.
#[derive(Default, Clone)]
pub struct AdapterCatalog {
    data_sources: BTreeMap<String, DataSourceFactory>,
    tools: BTreeMap<String, Arc<dyn ToolAdapter>>,
}

impl AdapterCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_source(
        mut self,
        source_type: impl Into<String>,
        factory: DataSourceFactory,
    ) -> Self {
        self.data_sources.insert(source_type.into(), factory);
        self
    }

    pub fn with_tool(mut self, name: impl Into<String>, tool: Arc<dyn ToolAdapter>) -> Self {
        self.tools.insert(name.into(), tool);
        self
    }

    pub fn open_data_source(&self, source_type: &str) -> Option<Box<dyn DataSourceAdapter>> {
        self.data_sources.get(source_type).map(|factory| factory())
    }

    pub fn tool(&self, name: &str) -> Option<Arc<dyn ToolAdapter>> {
        self.tools.get(name).cloned()
    }

    pub fn installed_data_sources(&self) -> Vec<String> {
        self.data_sources.keys().cloned().collect()
    }

    pub fn installed_tools(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub knowledge_base: Vec<knowledge_base::KnowledgeDocument>,
    #[serde(default)]
    pub tavily: tavily::TavilyConfig,
}

pub fn build_default_adapters(
    config: &RetrievalConfig,
    conversations: Arc<crate::conversation::ConversationStore>,
    http: reqwest::Client,
) -> AdapterCatalog {
    let documents = Arc::new(config.knowledge_base.clone());
    AdapterCatalog::new()
        .with_data_source(
            "knowledge_base",
            Arc::new(move || {
                Box::new(knowledge_base::KnowledgeBaseSource::new(Arc::clone(&documents)))
                    as Box<dyn DataSourceAdapter>
            }),
        )
        .with_data_source(
            "conversation_history",
            Arc::new(move || {
                Box::new(conversation_history::ConversationHistorySource::new(
                    Arc::clone(&conversations),
                )) as Box<dyn DataSourceAdapter>
            }),
        )
        .with_tool(
            tavily::TOOL_NAME,
            Arc::new(tavily::TavilySearchTool::new(http, config.tavily.clone())),
        )
}
