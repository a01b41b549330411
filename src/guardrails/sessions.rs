use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    guardrails::error::{GuardrailError, authentication_failed, invalid_credentials},
    types::{UserContext, UserProfile, now_rfc3339},
};

/// Identity claims carried by a verified bearer token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedToken {
    pub user_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Identity-provider session the token belongs to.
    #[serde(default)]
    pub session_state: Option<String>,
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedToken, GuardrailError>;
}

/// Refuses every token. Used when no identity provider is configured.
#[derive(Debug, Default, Clone)]
pub struct DenyAllVerifier;

#[async_trait]
impl TokenVerifier for DenyAllVerifier {
    async fn verify(&self, _token: &str) -> Result<VerifiedToken, GuardrailError> {
        Err(invalid_credentials("token verification is not configured"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustedToken {
    pub token: String,
    pub user_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Accepts a fixed set of configured tokens.
pub struct StaticTokenVerifier {
    tokens: HashMap<String, TrustedToken>,
}

impl StaticTokenVerifier {
    pub fn new(tokens: Vec<TrustedToken>) -> Self {
        Self {
            tokens: tokens
                .into_iter()
                .map(|trusted| (trusted.token.clone(), trusted))
                .collect(),
        }
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedToken, GuardrailError> {
        let trusted = self
            .tokens
            .get(token)
            .ok_or_else(|| invalid_credentials("Invalid token"))?;

        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        let digest = format!("{:x}", hasher.finalize());

        Ok(VerifiedToken {
            user_id: trusted.user_id.clone(),
            name: trusted.name.clone(),
            email: trusted.email.clone(),
            roles: trusted.roles.clone(),
            session_state: Some(format!("tok:{}", &digest[..24])),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSession {
    pub session_id: String,
    pub user_id: String,
    pub login_time: String,
    pub last_activity: String,
    pub logout_time: Option<String>,
    pub status: SessionStatus,
    pub token_state: Option<String>,
    pub user: VerifiedToken,
}

impl UserSession {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active && self.logout_time.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total: usize,
    pub active: usize,
    pub ended: usize,
}

#[derive(Default)]
struct SessionBook {
    sessions: HashMap<String, UserSession>,
    by_user: HashMap<String, Vec<String>>,
    by_token_state: HashMap<String, String>,
}

impl SessionBook {
    fn active_for_state(&self, token_state: &str) -> Option<&str> {
        self.by_token_state
            .get(token_state)
            .filter(|session_id| {
                self.sessions
                    .get(session_id.as_str())
                    .is_some_and(UserSession::is_active)
            })
            .map(String::as_str)
    }

    fn end(&mut self, session_id: &str) -> bool {
        let Some(session) = self.sessions.get_mut(session_id) else {
            return false;
        };
        if !session.is_active() {
            return false;
        }
        session.status = SessionStatus::Ended;
        session.logout_time = Some(now_rfc3339());
        if let Some(state) = session.token_state.clone() {
            self.by_token_state.remove(&state);
        }
        tracing::info!(
            target: "guardrails",
            session_id = %session_id,
            "session_ended"
        );
        true
    }
}

/// Tracks sessions from first verified token to logout.
pub struct SessionManager {
    verifier: Arc<dyn TokenVerifier>,
    book: Mutex<SessionBook>,
}

impl SessionManager {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            verifier,
            book: Mutex::new(SessionBook::default()),
        }
    }

    pub async fn validate_token(&self, token: &str) -> Result<VerifiedToken, GuardrailError> {
        if token.trim().is_empty() {
            return Err(authentication_failed("No token"));
        }
        self.verifier.verify(token).await
    }

    /// Opens a session for the token, or reuses the active one for the same
    /// identity-provider session.
    pub async fn create_session(
        &self,
        token: &str,
        verified: Option<VerifiedToken>,
    ) -> Result<UserContext, GuardrailError> {
        let verified = match verified {
            Some(verified) => verified,
            None => self.validate_token(token).await?,
        };
        if verified.user_id.trim().is_empty() {
            return Err(authentication_failed("No user ID"));
        }

        let mut book = self.book.lock().await;
        if let Some(state) = verified.session_state.as_deref()
            && let Some(session_id) = book.active_for_state(state).map(str::to_string)
        {
            if let Some(session) = book.sessions.get_mut(&session_id) {
                session.last_activity = now_rfc3339();
            }
            return Ok(user_context_for(&verified, &session_id));
        }

        let session_id = Uuid::new_v4().to_string();
        let now = now_rfc3339();
        book.sessions.insert(
            session_id.clone(),
            UserSession {
                session_id: session_id.clone(),
                user_id: verified.user_id.clone(),
                login_time: now.clone(),
                last_activity: now,
                logout_time: None,
                status: SessionStatus::Active,
                token_state: verified.session_state.clone(),
                user: verified.clone(),
            },
        );
        book.by_user
            .entry(verified.user_id.clone())
            .or_default()
            .push(session_id.clone());
        if let Some(state) = &verified.session_state {
            book.by_token_state.insert(state.clone(), session_id.clone());
        }

        tracing::info!(
            target: "guardrails",
            session_id = %session_id,
            user_id = %verified.user_id,
            "session_created"
        );
        Ok(user_context_for(&verified, &session_id))
    }

    /// Without a token the context's own session must be active.
    pub async fn validate_session(
        &self,
        token: Option<&str>,
        context: &UserContext,
    ) -> Result<UserContext, GuardrailError> {
        let Some(token) = token else {
            let mut book = self.book.lock().await;
            let session = match context.session_id.as_deref() {
                Some(session_id) => book.sessions.get_mut(session_id),
                None => None,
            };
            let session = session
                .filter(|session| session.is_active())
                .ok_or_else(|| authentication_failed("No valid session"))?;
            session.last_activity = now_rfc3339();
            return Ok(context.clone());
        };

        let verified = self.validate_token(token).await?;
        self.create_session(token, Some(verified)).await
    }

    pub async fn end_session(&self, session_id: &str) -> bool {
        self.book.lock().await.end(session_id)
    }

    pub async fn end_user_sessions(&self, user_id: &str) -> usize {
        let mut book = self.book.lock().await;
        let session_ids = book.by_user.get(user_id).cloned().unwrap_or_default();
        session_ids
            .iter()
            .filter(|session_id| book.end(session_id))
            .count()
    }

    pub async fn session(&self, session_id: &str) -> Option<UserSession> {
        self.book.lock().await.sessions.get(session_id).cloned()
    }

    pub async fn user_sessions(&self, user_id: &str, include_ended: bool) -> Vec<UserSession> {
        let book = self.book.lock().await;
        book.by_user
            .get(user_id)
            .into_iter()
            .flatten()
            .filter_map(|session_id| book.sessions.get(session_id))
            .filter(|session| include_ended || session.is_active())
            .cloned()
            .collect()
    }

    pub async fn stats(&self) -> SessionStats {
        let book = self.book.lock().await;
        let active = book
            .sessions
            .values()
            .filter(|session| session.is_active())
            .count();
        SessionStats {
            total: book.sessions.len(),
            active,
            ended: book.sessions.len() - active,
        }
    }
}

fn user_context_for(verified: &VerifiedToken, session_id: &str) -> UserContext {
    let profile = (verified.name.is_some() || verified.email.is_some()).then(|| UserProfile {
        name: verified.name.clone(),
        email: verified.email.clone(),
        ace_score: None,
    });
    UserContext {
        roles: verified.roles.clone(),
        user_profile: profile,
        ..UserContext::authenticated(verified.user_id.clone(), session_id)
    }
}
