use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::retrieval::{
    DataSourceAdapter, RetrievalContext, RetrievedDocument,
    error::{AdapterError, unavailable},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// In-process document store scored by query term overlap.
pub struct KnowledgeBaseSource {
    documents: Arc<Vec<KnowledgeDocument>>,
    min_score: f64,
    open: bool,
}

impl KnowledgeBaseSource {
    pub fn new(documents: Arc<Vec<KnowledgeDocument>>) -> Self {
        Self {
            documents,
            min_score: 0.0,
            open: false,
        }
    }
}

fn terms(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|term| term.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

fn matches_filters(document: &KnowledgeDocument, filters: &BTreeMap<String, Value>) -> bool {
    filters
        .iter()
        .filter(|(_, expected)| !expected.is_null())
        .all(|(key, expected)| document.metadata.get(key) == Some(expected))
}

#[async_trait]
impl DataSourceAdapter for KnowledgeBaseSource {
    async fn initialize(&mut self, config: &Value) -> bool {
        let min_score = config.get("min_score").and_then(Value::as_f64).unwrap_or(0.0);
        if !(0.0..=1.0).contains(&min_score) {
            return false;
        }
        self.min_score = min_score;
        self.open = true;
        true
    }

    async fn query(
        &mut self,
        query: &str,
        context: &RetrievalContext,
        k: usize,
    ) -> Result<Vec<RetrievedDocument>, AdapterError> {
        if !self.open {
            return Err(unavailable("knowledge base is not initialized"));
        }

        let query_terms = terms(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored = self
            .documents
            .iter()
            .filter(|document| matches_filters(document, &context.filters))
            .filter_map(|document| {
                let overlap = terms(&document.content)
                    .intersection(&query_terms)
                    .count();
                let score = overlap as f64 / query_terms.len() as f64;
                (overlap > 0 && score >= self.min_score).then_some((score, document))
            })
            .collect::<Vec<_>>();
        scored.sort_by(|lhs, rhs| rhs.0.total_cmp(&lhs.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, document)| {
                let mut metadata = document.metadata.clone();
                metadata.insert("id".to_string(), Value::String(document.id.clone()));
                RetrievedDocument {
                    content: document.content.clone(),
                    metadata,
                    score,
                }
            })
            .collect())
    }

    async fn close(&mut self) {
        self.open = false;
    }
}
