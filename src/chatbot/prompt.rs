//! Completion request assembly.

use crate::completion::{ChatMessage, CompletionRequest};
use crate::config::OpenAiConfig;
use crate::types::MessageRole;

use super::cache::ConversationHistory;

/// Fills the `{assistant}` and `{user}` placeholders of a prompt template.
///
/// `{{` and `}}` produce literal braces. Unknown placeholders are kept as written.
#[must_use]
pub fn render_prompt(template: &str, assistant: &str, user: &str) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(idx) = rest.find(['{', '}']) {
        rendered.push_str(&rest[..idx]);
        rest = &rest[idx..];

        if let Some(after) = rest.strip_prefix("{{") {
            rendered.push('{');
            rest = after;
        } else if let Some(after) = rest.strip_prefix("}}") {
            rendered.push('}');
            rest = after;
        } else if let Some(after) = rest.strip_prefix("{assistant}") {
            rendered.push_str(assistant);
            rest = after;
        } else if let Some(after) = rest.strip_prefix("{user}") {
            rendered.push_str(user);
            rest = after;
        } else {
            rendered.push_str(&rest[..1]);
            rest = &rest[1..];
        }
    }

    rendered.push_str(rest);
    rendered
}

/// Builds a streamed request: the system prompt followed by the whole history.
#[must_use]
pub fn build_request(
    config: &OpenAiConfig,
    system_prompt: String,
    history: &ConversationHistory,
) -> CompletionRequest {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage::new(MessageRole::System, system_prompt));
    messages.extend(
        history
            .turns()
            .map(|(role, text)| ChatMessage::new(role, text)),
    );

    CompletionRequest {
        model: config.model.clone(),
        temperature: config.temperature,
        stream: true,
        messages,
    }
}
