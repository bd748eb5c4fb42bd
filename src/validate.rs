//! Boundary validation for inbound chat requests.
//!
//! Both routes run the same checks; only the set of accepted roles differs.
//! Errors name the offending field, e.g. `messages[2].content`.

use serde_json::{Map, Value};

use crate::error::{ProxyError, Result};
use crate::translate::chat_types::{ChatMessage, ChatRequest, Role};

/// Roles the OpenAI route forwards.
pub const OPENAI_ROLES: &[Role] = &[Role::System, Role::User, Role::Assistant];

/// Roles the Anthropic route forwards by default.
pub const ANTHROPIC_ROLES: &[Role] = &[Role::User, Role::Assistant];

/// Parse and validate a raw JSON body.
pub fn validate_chat_request(body: &[u8], accepted_roles: &[Role]) -> Result<ChatRequest> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ProxyError::validation("body", format!("invalid JSON: {}", e)))?;

    let obj = value
        .as_object()
        .ok_or_else(|| ProxyError::validation("body", "expected a JSON object"))?;

    let messages = validate_messages(obj, accepted_roles)?;
    let temperature = validate_temperature(obj)?;
    let max_tokens = validate_max_tokens(obj)?;

    Ok(ChatRequest {
        messages,
        temperature,
        max_tokens,
    })
}

fn validate_messages(obj: &Map<String, Value>, accepted_roles: &[Role]) -> Result<Vec<ChatMessage>> {
    let items = match obj.get("messages") {
        Some(Value::Array(items)) => items,
        Some(_) => return Err(ProxyError::validation("messages", "expected an array")),
        None => return Err(ProxyError::validation("messages", "required")),
    };

    if items.is_empty() {
        return Err(ProxyError::validation(
            "messages",
            "must contain at least 1 message",
        ));
    }

    items
        .iter()
        .enumerate()
        .map(|(i, item)| validate_message(i, item, accepted_roles))
        .collect()
}

fn validate_message(index: usize, item: &Value, accepted_roles: &[Role]) -> Result<ChatMessage> {
    let field = |name: &str| format!("messages[{}].{}", index, name);

    let msg = item
        .as_object()
        .ok_or_else(|| ProxyError::validation(format!("messages[{}]", index), "expected an object"))?;

    let role = msg
        .get("role")
        .and_then(Value::as_str)
        .and_then(Role::parse)
        .filter(|r| accepted_roles.contains(r))
        .ok_or_else(|| {
            let expected = accepted_roles
                .iter()
                .map(|r| r.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            ProxyError::validation(field("role"), format!("expected one of: {}", expected))
        })?;

    let content = match msg.get("content") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::String(_)) => {
            return Err(ProxyError::validation(field("content"), "must not be empty"))
        }
        Some(_) => return Err(ProxyError::validation(field("content"), "expected a string")),
        None => return Err(ProxyError::validation(field("content"), "required")),
    };

    Ok(ChatMessage { role, content })
}

fn validate_temperature(obj: &Map<String, Value>) -> Result<Option<f64>> {
    match obj.get("temperature") {
        None | Some(Value::Null) => Ok(None),
        Some(v) => {
            let t = v
                .as_f64()
                .ok_or_else(|| ProxyError::validation("temperature", "expected a number"))?;
            if (0.0..=1.0).contains(&t) {
                Ok(Some(t))
            } else {
                Err(ProxyError::validation(
                    "temperature",
                    "must be between 0 and 1",
                ))
            }
        }
    }
}

fn validate_max_tokens(obj: &Map<String, Value>) -> Result<Option<u64>> {
    match obj.get("maxTokens") {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match v.as_u64() {
            Some(n) if n > 0 => Ok(Some(n)),
            _ => Err(ProxyError::validation(
                "maxTokens",
                "must be a positive integer",
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(body: Value, roles: &[Role]) -> Result<ChatRequest> {
        validate_chat_request(&serde_json::to_vec(&body).unwrap(), roles)
    }

    fn field_of(err: ProxyError) -> String {
        match err {
            ProxyError::Validation { field, .. } => field,
            other => panic!("Expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_request() {
        let req = check(
            json!({
                "messages": [
                    {"role": "user", "content": "Hello"},
                    {"role": "assistant", "content": "Hi there"}
                ],
                "temperature": 0.3,
                "maxTokens": 256
            }),
            ANTHROPIC_ROLES,
        )
        .unwrap();

        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[1].role, Role::Assistant);
        assert_eq!(req.temperature, Some(0.3));
        assert_eq!(req.max_tokens, Some(256));
    }

    #[test]
    fn test_empty_messages_rejected() {
        let err = check(json!({"messages": []}), OPENAI_ROLES).unwrap_err();
        assert_eq!(err.to_string(), "messages: must contain at least 1 message");
    }

    #[test]
    fn test_missing_or_wrong_messages() {
        assert_eq!(field_of(check(json!({}), OPENAI_ROLES).unwrap_err()), "messages");
        assert_eq!(
            field_of(check(json!({"messages": "hi"}), OPENAI_ROLES).unwrap_err()),
            "messages"
        );
        assert_eq!(
            field_of(check(json!({"messages": ["hi"]}), OPENAI_ROLES).unwrap_err()),
            "messages[0]"
        );
    }

    #[test]
    fn test_role_sets_differ_per_route() {
        let body = json!({"messages": [{"role": "system", "content": "Be brief"}]});
        assert!(check(body.clone(), OPENAI_ROLES).is_ok());

        let err = check(body, ANTHROPIC_ROLES).unwrap_err();
        assert_eq!(
            err.to_string(),
            "messages[0].role: expected one of: user, assistant"
        );
    }

    #[test]
    fn test_unknown_role_rejected() {
        let body = json!({"messages": [
            {"role": "user", "content": "ok"},
            {"role": "tool", "content": "nope"}
        ]});
        assert_eq!(
            field_of(check(body, OPENAI_ROLES).unwrap_err()),
            "messages[1].role"
        );
    }

    #[test]
    fn test_content_must_be_non_empty_text() {
        let empty = json!({"messages": [{"role": "user", "content": ""}]});
        assert_eq!(
            check(empty, OPENAI_ROLES).unwrap_err().to_string(),
            "messages[0].content: must not be empty"
        );

        let parts = json!({"messages": [{"role": "user", "content": [{"type": "text"}]}]});
        assert_eq!(
            field_of(check(parts, OPENAI_ROLES).unwrap_err()),
            "messages[0].content"
        );

        let missing = json!({"messages": [{"role": "user"}]});
        assert_eq!(
            field_of(check(missing, OPENAI_ROLES).unwrap_err()),
            "messages[0].content"
        );
    }

    #[test]
    fn test_temperature_bounds() {
        let with_temp = |t: Value| json!({"messages": [{"role": "user", "content": "x"}], "temperature": t});

        assert_eq!(check(with_temp(json!(0)), OPENAI_ROLES).unwrap().temperature, Some(0.0));
        assert_eq!(check(with_temp(json!(1)), OPENAI_ROLES).unwrap().temperature, Some(1.0));
        assert_eq!(check(with_temp(Value::Null), OPENAI_ROLES).unwrap().temperature, None);

        for bad in [json!(1.5), json!(-0.1), json!("0.5")] {
            assert_eq!(
                field_of(check(with_temp(bad), OPENAI_ROLES).unwrap_err()),
                "temperature"
            );
        }
    }

    #[test]
    fn test_max_tokens_must_be_positive() {
        let with_max = |m: Value| json!({"messages": [{"role": "user", "content": "x"}], "maxTokens": m});

        assert_eq!(check(with_max(json!(1)), OPENAI_ROLES).unwrap().max_tokens, Some(1));
        for bad in [json!(0), json!(-5), json!(1.5), json!("10")] {
            assert_eq!(
                field_of(check(with_max(bad), OPENAI_ROLES).unwrap_err()),
                "maxTokens"
            );
        }
    }

    #[test]
    fn test_malformed_json() {
        let err = validate_chat_request(b"{not json", OPENAI_ROLES).unwrap_err();
        assert_eq!(field_of(err), "body");

        let err = validate_chat_request(b"[1,2]", OPENAI_ROLES).unwrap_err();
        assert_eq!(field_of(err), "body");
    }
}
