//! Translate a validated [`ChatRequest`] into each provider's streaming request.
//!
//! Both functions are pure: the request plus the provider config in, the
//! upstream body out. Optional tuning parameters take their defaults here.

use crate::config::{AnthropicConfig, OpenAiConfig};
use crate::error::{ProxyError, Result};

use super::anthropic_types::{self, Message, MessagesRequest};
use super::chat_types::{ChatRequest, Role};
use super::openai_types::{ChatCompletionRequest, ChatMessage};

/// Build the Anthropic messages request. System messages, when the route lets
/// them through, are lifted into the top-level `system` prompt. At least one
/// message must remain after lifting.
pub fn chat_to_anthropic(req: &ChatRequest, config: &AnthropicConfig) -> Result<MessagesRequest> {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut messages = Vec::with_capacity(req.messages.len());

    for msg in &req.messages {
        let role = match msg.role {
            Role::User => anthropic_types::Role::User,
            Role::Assistant => anthropic_types::Role::Assistant,
            Role::System => {
                system_parts.push(&msg.content);
                continue;
            }
        };
        messages.push(Message {
            role,
            content: msg.content.clone(),
        });
    }

    if messages.is_empty() {
        return Err(ProxyError::validation(
            "messages",
            "must contain at least 1 non-system message",
        ));
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };

    Ok(MessagesRequest {
        model: config.model.clone(),
        max_tokens: req.max_tokens.unwrap_or(config.default_max_tokens),
        messages,
        system,
        temperature: Some(req.temperature.unwrap_or(config.default_temperature)),
        stream: true,
    })
}

/// Build the OpenAI chat-completions request. The token budget and penalties
/// are fixed by config; only temperature follows the client.
pub fn chat_to_openai(req: &ChatRequest, config: &OpenAiConfig) -> ChatCompletionRequest {
    let messages = req
        .messages
        .iter()
        .map(|m| ChatMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        })
        .collect();

    ChatCompletionRequest {
        model: config.model.clone(),
        messages,
        temperature: req.temperature.unwrap_or(config.default_temperature),
        max_tokens: config.max_tokens,
        top_p: config.top_p,
        frequency_penalty: config.frequency_penalty,
        presence_penalty: config.presence_penalty,
        stream: true,
    }
}
