use serde::Deserialize;

/// Error payload returned by the sync server on non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

pub fn parse_error_message(status: u16, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return message.trim().to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_message_over_error() {
        let body = r#"{"error":"bad_request","message":"unknown field dueDate"}"#;
        assert_eq!(parse_error_message(400, body), "unknown field dueDate");
    }

    #[test]
    fn falls_back_to_error_then_raw_body_then_status() {
        assert_eq!(parse_error_message(409, r#"{"error":"schema"}"#), "schema");
        assert_eq!(parse_error_message(502, "upstream down\n"), "upstream down");
        assert_eq!(parse_error_message(503, "  "), "HTTP 503");
    }
}
