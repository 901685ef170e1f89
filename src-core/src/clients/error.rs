use serde::Serialize;
use serde_json::Value;

/// Longest raw (non-JSON) body quoted back in an error message
const MAX_RAW_MESSAGE_LEN: usize = 200;

/// Error taxonomy shared by every component.
///
/// `ApiError` covers failed remote calls; `TimeoutError` and `CancelledError`
/// only ever describe job outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
pub enum ErrorCategory {
    AuthenticationError,
    RateLimited,
    ServerError,
    ValidationError,
    NetworkError,
    TimeoutError,
    CancelledError,
    UnexpectedResponse,
}

/// A classified remote call failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication failed: {message}")]
    Authentication { status: Option<u16>, message: String },
    #[error("Rate limited: {message}")]
    RateLimited { message: String },
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("Request rejected: {message}")]
    Validation { status: Option<u16>, message: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl ApiError {
    pub fn authentication(message: impl Into<String>) -> Self {
        ApiError::Authentication {
            status: None,
            message: message.into(),
        }
    }

    /// A 2xx response whose payload matches none of the expected shapes.
    pub fn unexpected(detail: impl Into<String>) -> Self {
        ApiError::UnexpectedResponse(detail.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ApiError::Authentication { .. } => ErrorCategory::AuthenticationError,
            ApiError::RateLimited { .. } => ErrorCategory::RateLimited,
            ApiError::Server { .. } => ErrorCategory::ServerError,
            ApiError::Validation { .. } => ErrorCategory::ValidationError,
            ApiError::Network(_) => ErrorCategory::NetworkError,
            ApiError::UnexpectedResponse(_) => ErrorCategory::UnexpectedResponse,
        }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, ApiError::Authentication { .. })
    }

    /// Only transport failures are retried below the caller.
    pub fn is_transport_retryable(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }

    /// Failures a caller may sensibly retry after backing off.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::RateLimited { .. } | ApiError::Server { .. } | ApiError::Network(_)
        )
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Authentication { status, .. } => *status,
            ApiError::RateLimited { .. } => Some(429),
            ApiError::Server { status, .. } => Some(*status),
            ApiError::Validation { status, .. } => *status,
            ApiError::Network(_) | ApiError::UnexpectedResponse(_) => None,
        }
    }

    /// Returns a user-friendly error message suitable for display in the UI
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Authentication { .. } => {
                "Authentication failed. Check your account credentials.".to_string()
            }
            ApiError::RateLimited { .. } => "Rate limit reached. Please wait and retry.".to_string(),
            ApiError::Server { status, .. } => format!(
                "The service is having trouble (HTTP {}). Please try again later.",
                status
            ),
            ApiError::Validation { message, .. } => format!("Request rejected: {}", message),
            ApiError::Network(_) => {
                "Could not reach the service. Check your internet connection.".to_string()
            }
            ApiError::UnexpectedResponse(_) => {
                "The service returned an unexpected response.".to_string()
            }
        }
    }
}

/// Classifies a failed call.
///
/// `status` is `None` when no response was received at all. Any status outside
/// 4xx/5xx reaching this function (including 2xx with an unusable body) is an
/// unexpected response, never a success.
pub fn classify(status: Option<u16>, body: &str) -> ApiError {
    let Some(status) = status else {
        let detail = body.trim();
        return ApiError::Network(if detail.is_empty() {
            "No response from server".to_string()
        } else {
            detail.to_string()
        });
    };

    let message = error_message(body).unwrap_or_else(|| format!("HTTP {}", status));

    match status {
        401 | 403 => ApiError::Authentication {
            status: Some(status),
            message,
        },
        429 => ApiError::RateLimited { message },
        500..=599 => ApiError::Server { status, message },
        400..=499 => ApiError::Validation {
            status: Some(status),
            message,
        },
        _ => ApiError::UnexpectedResponse(format!("HTTP {}: {}", status, message)),
    }
}

/// Best human-readable message from an error body, JSON or plain text.
pub fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => {
            let messages = error_messages(&value);
            if messages.is_empty() {
                None
            } else {
                Some(messages.join("; "))
            }
        }
        Err(_) => Some(truncate(trimmed, MAX_RAW_MESSAGE_LEN)),
    }
}

/// Collects messages from the error shapes the service uses:
/// `{"errors": [...]}`, `{"error": ...}`, `{"message": ...}` and `{"detail": ...}`.
pub fn error_messages(value: &Value) -> Vec<String> {
    let mut messages = Vec::new();
    collect_messages(value, &mut messages);
    messages
}

fn collect_messages(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) if !s.trim().is_empty() => out.push(s.trim().to_string()),
        Value::Array(items) => items.iter().for_each(|item| collect_messages(item, out)),
        Value::Object(map) => {
            for key in ["errors", "error", "message", "detail", "msg", "description"] {
                if let Some(inner) = map.get(key) {
                    let before = out.len();
                    collect_messages(inner, out);
                    if out.len() > before {
                        return;
                    }
                }
            }
        }
        _ => {}
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push('…');
    truncated
}
