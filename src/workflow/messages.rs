use crate::{
    planner::AgentMessageContext,
    types::{ChatMessage, ChatRole, UserContext},
    workflow::{
        error::{WorkflowError, message_assembly_failed},
        state::{DataSourceResult, ToolResult, WorkflowState},
    },
};

const PREVIOUS_RESPONSE_PREVIEW_CHARS: usize = 500;
const EMPTY_MESSAGE_FALLBACK: &str = "Hello";

const USER_CONTEXT_MARKERS: [&str; 5] = [
    "user_id",
    "session_id",
    "user context",
    "user information",
    "authenticated user",
];

/// Assembles the prompt for the next generation attempt.
pub fn build_messages(state: &WorkflowState) -> Result<Vec<ChatMessage>, WorkflowError> {
    match &state.specs.agent_context {
        Some(agent) => build_agent_messages(state, agent),
        None => build_generic_messages(state),
    }
}

/// Minimal prompt used when assembly fails.
pub fn fallback_messages(raw_message: &str) -> Vec<ChatMessage> {
    let content = if raw_message.trim().is_empty() {
        EMPTY_MESSAGE_FALLBACK
    } else {
        raw_message
    };
    vec![ChatMessage::user(content)]
}

fn build_generic_messages(state: &WorkflowState) -> Result<Vec<ChatMessage>, WorkflowError> {
    let current = current_message(&state.request.message)?;

    let mut system_parts = Vec::new();
    if let Some(block) = user_context_prompt(&state.request.user_context) {
        system_parts.push(block);
    }
    if let Some(context) = format_data_source_context(&state.data_source_results) {
        system_parts.push(format!("Context from data sources:\n{context}"));
    }
    if let Some(context) = format_tool_context(&state.tool_results) {
        system_parts.push(format!("Tool results:\n{context}"));
    }
    if let Some(guidance) = retry_guidance_for(state) {
        system_parts.push(guidance);
    }

    let mut messages = Vec::with_capacity(state.history.len() + 2);
    if !system_parts.is_empty() {
        messages.push(ChatMessage::system(system_parts.join("\n\n")));
    }
    messages.extend(state.history.iter().cloned());
    messages.push(ChatMessage::user(current));
    Ok(messages)
}

fn build_agent_messages(
    state: &WorkflowState,
    agent: &AgentMessageContext,
) -> Result<Vec<ChatMessage>, WorkflowError> {
    let current = current_message(
        agent
            .current_message
            .as_deref()
            .unwrap_or(&state.request.message),
    )?;

    let mut messages = Vec::with_capacity(agent.conversation_history.len() + 5);

    let mut system_prompt = agent.system_prompt.clone().unwrap_or_default();
    if let Some(block) = user_context_prompt(&state.request.user_context)
        && !mentions_user_context(&system_prompt)
    {
        system_prompt = if system_prompt.trim().is_empty() {
            block
        } else {
            format!("{block}\n\n{system_prompt}")
        };
    }
    if !system_prompt.trim().is_empty() {
        messages.push(ChatMessage::system(system_prompt));
    }

    for entry in &agent.conversation_history {
        let role = ChatRole::parse(&entry.role).ok_or_else(|| {
            message_assembly_failed(format!(
                "unknown role '{}' in conversation history",
                entry.role
            ))
        })?;
        messages.push(ChatMessage::new(role, entry.content.clone()));
    }

    if let Some(context) = format_data_source_context(&state.data_source_results) {
        messages.push(ChatMessage::system(format!("Context:\n{context}")));
    }
    if let Some(context) = format_tool_context(&state.tool_results) {
        messages.push(ChatMessage::system(format!("Tool Results:\n{context}")));
    }
    if let Some(guidance) = retry_guidance_for(state) {
        messages.push(ChatMessage::system(guidance));
    }

    messages.push(ChatMessage::user(current));
    Ok(messages)
}

fn current_message(raw: &str) -> Result<&str, WorkflowError> {
    if raw.trim().is_empty() {
        return Err(message_assembly_failed("current message is blank"));
    }
    Ok(raw)
}

fn retry_guidance_for(state: &WorkflowState) -> Option<String> {
    if !state.is_retry() {
        return None;
    }
    let feedback = state.validation_feedback.as_deref().unwrap_or_default();
    Some(retry_guidance(&state.final_content, feedback))
}

pub fn retry_guidance(previous_response: &str, feedback: &str) -> String {
    let preview = previous_response
        .chars()
        .take(PREVIOUS_RESPONSE_PREVIEW_CHARS)
        .collect::<String>();
    let ellipsis = if previous_response.chars().count() > PREVIOUS_RESPONSE_PREVIEW_CHARS {
        "..."
    } else {
        ""
    };

    format!(
        "IMPORTANT - Response Improvement Required:\n\
         Your previous response was not satisfactory.\n\n\
         Previous response: {preview}{ellipsis}\n\n\
         Feedback: {feedback}\n\n\
         Please generate a better, more helpful, and complete response \
         that addresses the user's question properly."
    )
}

/// Profile block for authenticated callers; `None` when there is nothing to say.
pub fn user_context_prompt(context: &UserContext) -> Option<String> {
    if !context.is_authenticated {
        return None;
    }

    let mut lines = Vec::new();
    if let Some(profile) = &context.user_profile {
        if let Some(name) = profile.name.as_deref().filter(|name| !name.is_empty()) {
            lines.push(format!("User name: {name}"));
        }
        if let Some(email) = profile.email.as_deref().filter(|email| !email.is_empty()) {
            lines.push(format!("User email: {email}"));
        }
    }
    if !context.roles.is_empty() {
        lines.push(format!("User roles: {}", context.roles.join(", ")));
    }
    if let Some(score) = context
        .user_profile
        .as_ref()
        .and_then(|profile| profile.ace_score)
    {
        lines.push(format!("User ACE score: {score}"));
    }

    if lines.is_empty() {
        return None;
    }
    let body = lines
        .iter()
        .map(|line| format!("- {line}"))
        .collect::<Vec<_>>()
        .join("\n");
    Some(format!("User Context:\n{body}"))
}

fn mentions_user_context(prompt: &str) -> bool {
    let lowered = prompt.to_lowercase();
    USER_CONTEXT_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Successful retrievals only; failed sources contribute nothing to the prompt.
pub fn format_data_source_context(results: &[DataSourceResult]) -> Option<String> {
    let lines = results
        .iter()
        .filter(|result| result.error.is_none() && !result.results.is_empty())
        .map(|result| {
            let documents = result
                .results
                .iter()
                .map(|document| document.content.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            format!("Data from {}: {}", result.source, documents)
        })
        .collect::<Vec<_>>();
    (!lines.is_empty()).then(|| lines.join("\n"))
}

pub fn format_tool_context(results: &[ToolResult]) -> Option<String> {
    let lines = results
        .iter()
        .map(|result| {
            let body = result
                .result
                .as_deref()
                .or(result.error.as_deref())
                .unwrap_or_default();
            format!("Tool {}: {}", result.tool, body)
        })
        .collect::<Vec<_>>();
    (!lines.is_empty()).then(|| lines.join("\n"))
}
