use std::{collections::BTreeMap, env, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::retrieval::{
    ToolAdapter, ToolOutcome,
    error::{AdapterError, invalid_input, unavailable, upstream_failed},
};

pub const TOOL_NAME: &str = "tavily_search";

fn default_endpoint() -> String {
    "https://api.tavily.com/search".to_string()
}

fn default_api_key_env() -> String {
    "TAVILY_API_KEY".to_string()
}

fn default_max_results() -> u64 {
    5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TavilyConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_results")]
    pub max_results: u64,
}

impl Default for TavilyConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            max_results: default_max_results(),
        }
    }
}

/// Web search through the Tavily HTTP API.
pub struct TavilySearchTool {
    http: Client,
    config: TavilyConfig,
}

impl TavilySearchTool {
    pub fn new(http: Client, config: TavilyConfig) -> Self {
        Self { http, config }
    }

    fn api_key(&self) -> Option<String> {
        env::var(&self.config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

pub fn summarize_results(payload: &Value) -> String {
    let mut lines = Vec::new();
    if let Some(answer) = payload
        .get("answer")
        .and_then(Value::as_str)
        .filter(|answer| !answer.is_empty())
    {
        lines.push(format!("Answer: {}", answer));
    }
    for result in payload
        .get("results")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let title = result.get("title").and_then(Value::as_str).unwrap_or("untitled");
        let url = result.get("url").and_then(Value::as_str).unwrap_or_default();
        let content = result.get("content").and_then(Value::as_str).unwrap_or_default();
        lines.push(format!("- {} ({}): {}", title, url, content));
    }
    lines.join("\n")
}

#[async_trait]
impl ToolAdapter for TavilySearchTool {
    fn available(&self, name: &str) -> bool {
        name == TOOL_NAME && self.api_key().is_some()
    }

    async fn execute(&self, params: &BTreeMap<String, Value>) -> Result<ToolOutcome, AdapterError> {
        let query = params
            .get("query")
            .and_then(Value::as_str)
            .filter(|query| !query.trim().is_empty())
            .ok_or_else(|| invalid_input("tavily_search requires a non-empty 'query'"))?;
        let api_key = self
            .api_key()
            .ok_or_else(|| unavailable(format!("{} is not set", self.config.api_key_env)))?;
        let max_results = params
            .get("max_results")
            .and_then(Value::as_u64)
            .unwrap_or(self.config.max_results);
        let search_depth = params
            .get("search_depth")
            .and_then(Value::as_str)
            .unwrap_or("basic");

        let response = self
            .http
            .post(&self.config.endpoint)
            .timeout(Duration::from_secs(30))
            .json(&json!({
                "api_key": api_key,
                "query": query,
                "max_results": max_results,
                "search_depth": search_depth,
                "include_answer": true,
            }))
            .send()
            .await
            .map_err(|err| upstream_failed(format!("tavily request failed: {}", err)))?;

        if !response.status().is_success() {
            return Ok(ToolOutcome::failed(format!(
                "tavily returned status {}",
                response.status().as_u16()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|err| upstream_failed(format!("failed to decode tavily payload: {}", err)))?;
        Ok(ToolOutcome::succeeded(summarize_results(&payload)))
    }
}
