use std::{
    collections::BTreeMap,
    sync::{Arc, LazyLock},
};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    guardrails::{
        error::{GuardrailError, authentication_failed},
        rate_limit::{RateLimitConfig, SlidingWindowRateLimiter},
        sessions::{
            DenyAllVerifier, SessionManager, StaticTokenVerifier, TokenVerifier, TrustedToken,
        },
    },
    types::UserContext,
};

const MAX_SANITIZED_CHARS: usize = 10_000;

const TRAUMA_INDICATORS: [&str; 8] = [
    "suicide",
    "self-harm",
    "abuse",
    "violence",
    "trauma",
    "ptsd",
    "depression",
    "anxiety",
];

static SCRIPT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("script pattern should compile")
});
static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag pattern should compile"));

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentFilterConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub blocked_words: Vec<String>,
    #[serde(default = "default_enabled")]
    pub trauma_safe_mode: bool,
}

impl Default for ContentFilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            blocked_words: Vec::new(),
            trauma_safe_mode: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserValidationConfig {
    #[serde(default = "default_enabled")]
    pub require_auth: bool,
    #[serde(default)]
    pub allow_anonymous: bool,
    /// Tokens accepted without an external identity provider.
    #[serde(default)]
    pub trusted_tokens: Vec<TrustedToken>,
}

impl Default for UserValidationConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allow_anonymous: false,
            trusted_tokens: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub rate_limiting: RateLimitConfig,
    #[serde(default)]
    pub content_filtering: ContentFilterConfig,
    #[serde(default)]
    pub user_validation: UserValidationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredContent {
    pub safe: bool,
    /// Text with blocked words masked. Equal to the input when nothing matched.
    pub content: String,
    pub flags: Vec<String>,
    pub original_content: String,
}

/// Authentication, rate limiting and content checks run around each request.
pub struct SecurityManager {
    config: SecurityConfig,
    limiter: SlidingWindowRateLimiter,
    sessions: SessionManager,
    blocked_patterns: Vec<(String, Regex)>,
}

impl SecurityManager {
    pub fn new(config: SecurityConfig) -> Self {
        let verifier: Arc<dyn TokenVerifier> = if config.user_validation.trusted_tokens.is_empty()
        {
            Arc::new(DenyAllVerifier)
        } else {
            Arc::new(StaticTokenVerifier::new(
                config.user_validation.trusted_tokens.clone(),
            ))
        };
        Self::with_verifier(config, verifier)
    }

    pub fn with_verifier(config: SecurityConfig, verifier: Arc<dyn TokenVerifier>) -> Self {
        let blocked_patterns = config
            .content_filtering
            .blocked_words
            .iter()
            .filter(|word| !word.trim().is_empty())
            .filter_map(|word| {
                RegexBuilder::new(&regex::escape(word))
                    .case_insensitive(true)
                    .build()
                    .ok()
                    .map(|pattern| (word.clone(), pattern))
            })
            .collect();

        Self {
            limiter: SlidingWindowRateLimiter::new(config.rate_limiting.clone()),
            sessions: SessionManager::new(verifier),
            blocked_patterns,
            config,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Returns the context to proceed with, authenticated when the token or
    /// the upstream middleware vouched for the caller.
    pub async fn validate_user(
        &self,
        context: &UserContext,
        token: Option<&str>,
    ) -> Result<UserContext, GuardrailError> {
        let policy = &self.config.user_validation;
        let anonymous_refused = policy.require_auth && !policy.allow_anonymous;
        let mut validated = context.clone();
        let mut authenticated = context.is_authenticated;

        if let Some(token) = token {
            match self.sessions.validate_session(Some(token), context).await {
                Ok(verified) => {
                    validated = merge_verified(context, verified);
                    authenticated = true;
                }
                Err(err) if authenticated => {
                    tracing::debug!(
                        target: "guardrails",
                        user_id = %context.user_id,
                        error = %err,
                        "token_invalid_context_already_authenticated"
                    );
                }
                Err(err) if anonymous_refused => {
                    self.log_security_event(
                        "authentication_failed",
                        &context.user_id,
                        &err.message,
                    );
                    return Err(err);
                }
                Err(_) => {}
            }
        }

        if anonymous_refused && !authenticated {
            self.log_security_event(
                "authentication_required",
                &context.user_id,
                "no credentials",
            );
            return Err(authentication_failed("Authentication required"));
        }

        validated.is_authenticated = authenticated;
        Ok(validated)
    }

    pub async fn check_rate_limit(&self, user_id: &str, _context: &UserContext) -> bool {
        self.limiter.check(user_id).await
    }

    pub fn filter_content(&self, text: &str) -> FilteredContent {
        let filtering = &self.config.content_filtering;
        if !filtering.enabled {
            return FilteredContent {
                safe: true,
                content: text.to_string(),
                flags: Vec::new(),
                original_content: text.to_string(),
            };
        }

        let mut flags = Vec::new();
        let mut masked = text.to_string();
        for (word, pattern) in &self.blocked_patterns {
            if pattern.is_match(&masked) {
                flags.push(format!("blocked: {word}"));
                let stars = "*".repeat(word.chars().count());
                masked = pattern.replace_all(&masked, stars.as_str()).into_owned();
            }
        }

        if filtering.trauma_safe_mode {
            let lowered = text.to_lowercase();
            flags.extend(
                TRAUMA_INDICATORS
                    .iter()
                    .filter(|indicator| lowered.contains(*indicator))
                    .map(|indicator| format!("trauma: {indicator}")),
            );
        }

        FilteredContent {
            safe: flags.is_empty(),
            content: masked,
            flags,
            original_content: text.to_string(),
        }
    }

    pub fn log_security_event(&self, event_type: &str, user_id: &str, details: &str) {
        tracing::warn!(
            target: "guardrails",
            event_type = %event_type,
            user_id = %user_id,
            details = %details,
            "security_event"
        );
    }
}

/// Strips script blocks and markup, then caps the length.
pub fn sanitize_input(text: &str) -> String {
    let without_scripts = SCRIPT_BLOCK.replace_all(text, "");
    HTML_TAG
        .replace_all(&without_scripts, "")
        .chars()
        .take(MAX_SANITIZED_CHARS)
        .collect::<String>()
        .trim()
        .to_string()
}

fn merge_verified(original: &UserContext, verified: UserContext) -> UserContext {
    let mut profile = verified.user_profile.unwrap_or_default();
    if let Some(existing) = &original.user_profile {
        profile.name = profile.name.or_else(|| existing.name.clone());
        profile.email = profile.email.or_else(|| existing.email.clone());
        profile.ace_score = existing.ace_score;
    }
    let has_profile =
        profile.name.is_some() || profile.email.is_some() || profile.ace_score.is_some();

    UserContext {
        token: original.token.clone(),
        permissions: original.permissions.clone(),
        user_profile: has_profile.then_some(profile),
        ..verified
    }
}

/// Security metadata attached to responses for traceability.
pub fn content_flags_metadata(filtered: &FilteredContent) -> BTreeMap<String, Value> {
    let mut metadata = BTreeMap::new();
    metadata.insert("content_safe".to_string(), Value::Bool(filtered.safe));
    metadata.insert(
        "content_flags".to_string(),
        Value::Array(filtered.flags.iter().cloned().map(Value::String).collect()),
    );
    metadata
}
