use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "system" => Some(ChatRole::System),
            "user" => Some(ChatRole::User),
            "assistant" => Some(ChatRole::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub ace_score: Option<f64>,
}

/// Identity of the caller as established by the front-end middleware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub is_authenticated: bool,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub user_profile: Option<UserProfile>,
}

impl UserContext {
    pub fn anonymous(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: None,
            is_authenticated: false,
            token: None,
            roles: Vec::new(),
            permissions: Vec::new(),
            user_profile: None,
        }
    }

    pub fn authenticated(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            is_authenticated: true,
            ..Self::anonymous(user_id)
        }
    }
}

/// Current UTC time as an RFC 3339 string.
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

fn new_request_id() -> String {
    Uuid::now_v7().to_string()
}

fn default_application() -> String {
    "general".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrainRequest {
    #[serde(default = "new_request_id")]
    pub id: String,
    #[serde(default = "default_application")]
    pub application: String,
    pub message: String,
    pub user_context: UserContext,
    #[serde(default)]
    pub context: BTreeMap<String, Value>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl BrainRequest {
    pub fn new(message: impl Into<String>, user_context: UserContext) -> Self {
        Self {
            id: new_request_id(),
            application: default_application(),
            message: message.into(),
            user_context,
            context: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Token presented with the request, from the user context or request metadata.
    pub fn auth_token(&self) -> Option<&str> {
        self.user_context
            .token
            .as_deref()
            .or_else(|| self.metadata.get("token").and_then(Value::as_str))
            .filter(|token| !token.trim().is_empty())
    }
}
