use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    conversation::ConversationStore,
    retrieval::{
        DataSourceAdapter, RetrievalContext, RetrievedDocument,
        error::{AdapterError, invalid_input},
    },
};

/// Exposes the caller's recent session messages as retrievable context.
pub struct ConversationHistorySource {
    store: Arc<ConversationStore>,
}

impl ConversationHistorySource {
    pub fn new(store: Arc<ConversationStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DataSourceAdapter for ConversationHistorySource {
    async fn initialize(&mut self, _config: &Value) -> bool {
        true
    }

    async fn query(
        &mut self,
        _query: &str,
        context: &RetrievalContext,
        k: usize,
    ) -> Result<Vec<RetrievedDocument>, AdapterError> {
        let session_id = context
            .session_id
            .as_deref()
            .ok_or_else(|| invalid_input("conversation history requires a session id"))?;

        let history = self.store.history(session_id).await;
        let skip = history.len().saturating_sub(k);
        Ok(history
            .into_iter()
            .skip(skip)
            .map(|message| RetrievedDocument {
                content: format!("{}: {}", message.role.as_str(), message.content),
                metadata: BTreeMap::from([
                    ("id".to_string(), Value::String(message.id)),
                    ("timestamp".to_string(), Value::String(message.timestamp)),
                ]),
                score: 1.0,
            })
            .collect())
    }

    async fn close(&mut self) {}
}
