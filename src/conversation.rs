use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::types::{ChatMessage, ChatRole, now_rfc3339};

fn default_max_message_history() -> usize {
    50
}

fn default_history_window() -> usize {
    10
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationConfig {
    #[serde(default = "default_max_message_history")]
    pub max_message_history: usize,
    /// Number of most recent messages replayed into a new prompt.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_message_history: default_max_message_history(),
            history_window: default_history_window(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Process-lifetime message log keyed by session id.
pub struct ConversationStore {
    config: ConversationConfig,
    sessions: RwLock<HashMap<String, VecDeque<ConversationMessage>>>,
}

impl ConversationStore {
    pub fn new(config: ConversationConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn history_window(&self) -> usize {
        self.config.history_window
    }

    pub async fn append(
        &self,
        session_id: &str,
        role: ChatRole,
        content: impl Into<String>,
        metadata: BTreeMap<String, Value>,
    ) -> ConversationMessage {
        let message = ConversationMessage {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: now_rfc3339(),
            metadata,
        };

        let cap = self.config.max_message_history.max(1);
        let mut guard = self.sessions.write().await;
        let log = guard.entry(session_id.to_string()).or_default();
        log.push_back(message.clone());
        while log.len() > cap {
            log.pop_front();
        }
        message
    }

    pub async fn history(&self, session_id: &str) -> Vec<ConversationMessage> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Last `limit` messages of a session, oldest first.
    pub async fn recent(&self, session_id: &str, limit: usize) -> Vec<ChatMessage> {
        let guard = self.sessions.read().await;
        let Some(log) = guard.get(session_id) else {
            return Vec::new();
        };
        let skip = log.len().saturating_sub(limit);
        log.iter()
            .skip(skip)
            .map(|message| ChatMessage::new(message.role, message.content.clone()))
            .collect()
    }

    pub async fn clear(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
