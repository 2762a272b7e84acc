//! Mapping HTTP failures onto [`LlmError`] so the retry policy can tell
//! transient failures from permanent ones.

use askdb_tool_runtime::LlmError;
use serde_json::Value;

/// Longest raw body echoed into an error message.
const MAX_BODY_IN_ERROR: usize = 500;

/// Classify a non-success response.
pub fn classify_status(status: u16, retry_after: Option<&str>, body: &str) -> LlmError {
    let message = error_message(body);
    match status {
        401 | 403 => LlmError::AuthError(message),
        402 => LlmError::QuotaExceeded(message),
        429 if is_quota_error(body) => LlmError::QuotaExceeded(message),
        429 => LlmError::RateLimited {
            retry_after_secs: retry_after
                .and_then(|h| h.trim().parse().ok())
                .unwrap_or(1),
        },
        _ if is_quota_error(body) => LlmError::QuotaExceeded(message),
        _ => LlmError::ApiError { status, message },
    }
}

/// Transport failures are always worth another attempt.
pub fn network_error(err: reqwest::Error) -> LlmError {
    LlmError::NetworkError(err.to_string())
}

fn is_quota_error(body: &str) -> bool {
    body.contains("insufficient_quota") || body.contains("credit balance is too low")
}

/// `error.message` from a JSON error body, else the (truncated) raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.chars().take(MAX_BODY_IN_ERROR).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_errors_are_permanent() {
        let err = classify_status(401, None, r#"{"error":{"message":"Incorrect API key"}}"#);
        assert!(matches!(&err, LlmError::AuthError(m) if m == "Incorrect API key"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_quota_vs_rate_limit() {
        let quota = classify_status(
            429,
            None,
            r#"{"error":{"message":"You exceeded your current quota","code":"insufficient_quota"}}"#,
        );
        assert!(matches!(quota, LlmError::QuotaExceeded(_)));
        assert!(!quota.is_transient());

        let limited = classify_status(429, Some("7"), r#"{"error":{"message":"slow down"}}"#);
        assert!(matches!(limited, LlmError::RateLimited { retry_after_secs: 7 }));
        assert!(limited.is_transient());
    }

    #[test]
    fn test_server_errors_are_transient() {
        let err = classify_status(503, None, "upstream unavailable");
        assert!(matches!(&err, LlmError::ApiError { status: 503, message } if message == "upstream unavailable"));
        assert!(err.is_transient());

        let credit = classify_status(400, None, r#"{"error":{"message":"Your credit balance is too low"}}"#);
        assert!(matches!(credit, LlmError::QuotaExceeded(_)));
    }
}
