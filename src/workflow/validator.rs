use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::{
    planner::ExecutionSpec,
    provider_gateway::{ProviderFactory, SamplingParams},
    registry::CapabilityRegistries,
    types::ChatMessage,
    workflow::{
        error::{WorkflowError, WorkflowErrorKind},
        guard::guarded,
    },
};

/// Confidence at or above which a response is accepted. The workflow loop
/// exits on the same value.
pub const ACCEPTANCE_THRESHOLD: f64 = 0.75;

const MIN_RESPONSE_CHARS: usize = 10;
const MIN_WORD_SEPARATORS: usize = 3;
const REFUSAL_LENGTH_LIMIT: usize = 100;
const BASE_CONFIDENCE: f64 = 0.5;
const BASE_WEIGHT: f64 = 0.3;
const GRADE_WEIGHT: f64 = 0.7;
const KEYWORD_CONFIDENCE: f64 = 0.75;
const GRADING_MAX_TOKENS: u32 = 200;
const GRADING_TEMPERATURE: f32 = 0.3;

const REFUSAL_PATTERNS: [&str; 7] = [
    "i cannot",
    "i can't",
    "i don't have",
    "i'm unable",
    "as an ai",
    "i apologize, but",
    "i'm sorry, but",
];

static SCORE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"SCORE:\s*(\d+)").expect("score pattern should compile"));
static REASONING_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)REASONING:\s*(.+)").expect("reasoning pattern should compile")
});

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub confidence: f64,
    pub feedback: Option<String>,
    pub reasoning: Option<String>,
}

impl ValidationResult {
    pub fn accepted(confidence: f64) -> Self {
        Self {
            is_valid: true,
            confidence,
            feedback: None,
            reasoning: None,
        }
    }

    pub fn rejected(confidence: f64, feedback: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            confidence,
            feedback: Some(feedback.into()),
            reasoning: None,
        }
    }
}

/// Scores a generated response.
///
/// Implementations honor `cancel` and the spec's per-call timeout for any
/// external call they make, and release provider handles on every path.
#[async_trait]
pub trait ResponseValidator: Send + Sync {
    async fn validate(
        &self,
        response: &str,
        user_message: &str,
        spec: &ExecutionSpec,
        cancel: &CancellationToken,
    ) -> Result<ValidationResult, WorkflowError>;
}

/// Cheap rule checks, then a model-graded score from the request's own provider.
pub struct HeuristicResponseValidator {
    providers: Arc<dyn ProviderFactory>,
    registries: Arc<CapabilityRegistries>,
}

impl HeuristicResponseValidator {
    pub fn new(providers: Arc<dyn ProviderFactory>, registries: Arc<CapabilityRegistries>) -> Self {
        Self {
            providers,
            registries,
        }
    }

    async fn grade(
        &self,
        response: &str,
        user_message: &str,
        spec: &ExecutionSpec,
        cancel: &CancellationToken,
    ) -> Result<ValidationResult, WorkflowError> {
        let Some(provider) = &spec.provider else {
            return Ok(ValidationResult::accepted(BASE_CONFIDENCE));
        };
        let Some(model) = provider
            .model
            .as_deref()
            .or_else(|| self.registries.providers.default_model(&provider.provider_type))
        else {
            return Ok(ValidationResult::accepted(BASE_CONFIDENCE));
        };

        let deadline = spec.processing.timeout();
        let mut handle = match guarded(
            "grading provider acquire",
            deadline,
            cancel,
            self.providers
                .acquire(&provider.provider_type, model, Some(deadline)),
        )
        .await?
        {
            Ok(handle) => handle,
            Err(err) => {
                tracing::warn!(
                    target: "validator",
                    provider_type = %provider.provider_type,
                    error = %err,
                    "grading_provider_unavailable"
                );
                return Ok(ValidationResult::accepted(BASE_CONFIDENCE));
            }
        };

        let prompt = [ChatMessage::user(grading_prompt(user_message, response))];
        let params = SamplingParams {
            temperature: GRADING_TEMPERATURE,
            max_tokens: GRADING_MAX_TOKENS,
            custom: Default::default(),
        };
        let outcome = guarded("grading", deadline, cancel, handle.generate(&prompt, &params)).await;
        handle.release().await;

        let generation = outcome?;
        if !generation.success {
            tracing::warn!(
                target: "validator",
                error = %generation.error_message(),
                "grading_call_failed"
            );
            return Ok(ValidationResult::accepted(BASE_CONFIDENCE));
        }
        Ok(interpret_grade(BASE_CONFIDENCE, generation.content.trim()))
    }
}

#[async_trait]
impl ResponseValidator for HeuristicResponseValidator {
    async fn validate(
        &self,
        response: &str,
        user_message: &str,
        spec: &ExecutionSpec,
        cancel: &CancellationToken,
    ) -> Result<ValidationResult, WorkflowError> {
        if let Some(rejection) = rule_check(response) {
            return Ok(rejection);
        }

        match self.grade(response, user_message, spec, cancel).await {
            Ok(result) => Ok(result),
            Err(err) if err.kind == WorkflowErrorKind::Cancelled => Err(err),
            Err(err) => {
                tracing::warn!(
                    target: "validator",
                    error = %err,
                    "grading_failed_accepting_base_confidence"
                );
                Ok(ValidationResult::accepted(BASE_CONFIDENCE))
            }
        }
    }
}

/// Stages 1 to 3. `None` means the response passed the basic checks.
pub fn rule_check(response: &str) -> Option<ValidationResult> {
    if response.trim().chars().count() < MIN_RESPONSE_CHARS {
        return Some(ValidationResult::rejected(0.1, "Response is too short"));
    }
    if response.matches(' ').count() < MIN_WORD_SEPARATORS {
        return Some(ValidationResult::rejected(0.2, "Response lacks substance"));
    }
    let lowered = response.to_lowercase();
    if response.chars().count() < REFUSAL_LENGTH_LIMIT
        && REFUSAL_PATTERNS
            .iter()
            .any(|pattern| lowered.contains(pattern))
    {
        return Some(ValidationResult::rejected(
            0.3,
            "Response appears to be a refusal or error message",
        ));
    }
    None
}

pub fn grading_prompt(user_message: &str, response: &str) -> String {
    format!(
        "Evaluate this AI response and provide a confidence score.\n\n\
         User Message: {user_message}\n\n\
         AI Response: {response}\n\n\
         Evaluate:\n\
         1. Relevance to the user's question (0-25 points)\n\
         2. Helpfulness and informativeness (0-25 points)\n\
         3. Accuracy and correctness (0-25 points)\n\
         4. Completeness (not cut off, addresses the question) (0-25 points)\n\n\
         Respond in this EXACT format:\n\
         SCORE: <number 0-100>\n\
         REASONING: <brief explanation>\n\n\
         If score >= 75, the response is acceptable. Below 75, it needs improvement."
    )
}

/// Combines the rule-based base confidence with the grader's output.
pub fn interpret_grade(base: f64, grading_text: &str) -> ValidationResult {
    // The capture is all digits, so a parse failure can only be overflow.
    let score = SCORE_PATTERN
        .captures(grading_text)
        .and_then(|captures| captures.get(1))
        .map(|score| score.as_str().parse::<u64>().unwrap_or(u64::MAX));

    let Some(score) = score else {
        tracing::warn!(target: "validator", "grading_score_unparseable");
        let lowered = grading_text.to_lowercase();
        if lowered.contains("acceptable") || lowered.contains("good") {
            return ValidationResult::accepted(KEYWORD_CONFIDENCE);
        }
        return ValidationResult::rejected(base, grading_text);
    };

    let graded = (score as f64 / 100.0).min(1.0);
    let confidence = BASE_WEIGHT * base + GRADE_WEIGHT * graded;
    let reasoning = REASONING_PATTERN
        .captures(grading_text)
        .and_then(|captures| captures.get(1))
        .map(|reasoning| reasoning.as_str().trim().to_string())
        .unwrap_or_else(|| "No reasoning provided".to_string());

    if confidence >= ACCEPTANCE_THRESHOLD {
        ValidationResult {
            is_valid: true,
            confidence,
            feedback: None,
            reasoning: Some(reasoning),
        }
    } else {
        ValidationResult {
            is_valid: false,
            confidence,
            feedback: Some(format!("Confidence too low ({confidence:.2}): {reasoning}")),
            reasoning: Some(reasoning),
        }
    }
}
