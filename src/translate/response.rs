use super::anthropic_types::ErrorResponse;
use super::openai_types::ChatErrorResponse;

/// Pull the human-readable message out of an Anthropic error body, falling back
/// to the status and a prefix of the raw body.
pub fn anthropic_error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) => err.error.describe(),
        Err(_) => fallback_message(status, body),
    }
}

/// Same as [`anthropic_error_message`] for OpenAI error bodies.
pub fn openai_error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<ChatErrorResponse>(body) {
        Ok(err) => err.error.message,
        Err(_) => fallback_message(status, body),
    }
}

fn fallback_message(status: u16, body: &str) -> String {
    let body = truncate(body.trim(), 300);
    if body.is_empty() {
        format!("Provider returned status {}", status)
    } else {
        format!("Provider returned status {}: {}", status, body)
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anthropic_error_body() {
        let body = r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#;
        assert_eq!(
            anthropic_error_message(401, body),
            "invalid x-api-key (authentication_error)"
        );
    }

    #[test]
    fn test_openai_error_body() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error","code":"invalid_api_key"}}"#;
        assert_eq!(openai_error_message(401, body), "Incorrect API key provided");
    }

    #[test]
    fn test_unparseable_body_falls_back_to_status() {
        assert_eq!(
            anthropic_error_message(502, "<html>Bad Gateway</html>"),
            "Provider returned status 502: <html>Bad Gateway</html>"
        );
        assert_eq!(openai_error_message(503, ""), "Provider returned status 503");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "h");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
