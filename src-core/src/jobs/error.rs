use std::time::Duration;

use serde_json::Value;

use crate::clients::{ApiError, ErrorCategory, JobKind};

use super::state::JobId;

/// Ways a job can end without a result
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The provider reported the job as failed
    #[error("{kind} failed: {message}")]
    Remote { kind: JobKind, message: String },

    #[error("{kind} timed out after {}s", elapsed.as_secs())]
    Timeout { kind: JobKind, elapsed: Duration },

    #[error("Cancelled by user")]
    Cancelled,

    /// The media tool could not prepare the input file
    #[error("Could not prepare media: {0}")]
    Media(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The job task ended without reporting (panicked)
    #[error("Job task failed: {0}")]
    Internal(String),
}

impl JobError {
    /// Failure reported by the provider, falling back to the generic per-kind text
    pub fn remote(kind: JobKind, errors: &[String]) -> Self {
        let message = if errors.is_empty() {
            kind.generic_failure_message().to_string()
        } else {
            errors.join("; ")
        };
        JobError::Remote { kind, message }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            JobError::Api(e) => e.category(),
            JobError::Remote { .. } => ErrorCategory::ServerError,
            JobError::Timeout { .. } => ErrorCategory::TimeoutError,
            JobError::Cancelled => ErrorCategory::CancelledError,
            JobError::Media(_) | JobError::InvalidRequest(_) => ErrorCategory::ValidationError,
            JobError::Internal(_) => ErrorCategory::UnexpectedResponse,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, JobError::Cancelled)
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            JobError::Api(e) => e.user_message(),
            JobError::Remote { message, .. } => message.clone(),
            JobError::Timeout { kind, elapsed } => format!(
                "{} did not finish within {} minutes. Please try again later.",
                capitalized(*kind),
                elapsed.as_secs() / 60
            ),
            JobError::Cancelled => "Cancelled.".to_string(),
            JobError::Media(message) => format!("Could not read the media file: {}", message),
            JobError::InvalidRequest(message) => message.clone(),
            JobError::Internal(_) => "Something went wrong. Please try again.".to_string(),
        }
    }
}

fn capitalized(kind: JobKind) -> String {
    let name = kind.to_string().replace('_', " ");
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => name,
    }
}

/// Final payload of a completed job
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub job_id: JobId,
    pub kind: JobKind,
    /// Absent when the submission completed inline
    pub correlation_id: Option<String>,
    pub data: Value,
}

impl JobResult {
    /// Download location of the result document, if the service returned one
    pub fn url(&self) -> Option<&str> {
        self.data.get("url").and_then(Value::as_str)
    }

    /// Language code reported by a language-detection job
    pub fn detected_language(&self) -> Option<&str> {
        ["language", "detected_language", "detectedLanguage", "language_code"]
            .iter()
            .find_map(|key| self.data.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .filter(|code| !code.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_remote_error_message() {
        let cases = vec![
            (vec![], "Transcription failed. Please try again."),
            (vec!["unsupported codec".to_string()], "unsupported codec"),
            (
                vec!["too long".to_string(), "no credits".to_string()],
                "too long; no credits",
            ),
        ];

        for (errors, expected) in cases {
            let error = JobError::remote(JobKind::Transcription, &errors);
            assert_eq!(error.user_message(), expected);
            assert_eq!(error.category(), ErrorCategory::ServerError);
        }
    }

    #[test]
    fn test_categories() {
        let cases = vec![
            (
                JobError::Api(ApiError::RateLimited {
                    message: "slow".to_string(),
                }),
                ErrorCategory::RateLimited,
            ),
            (
                JobError::Timeout {
                    kind: JobKind::Translation,
                    elapsed: Duration::from_secs(7200),
                },
                ErrorCategory::TimeoutError,
            ),
            (JobError::Cancelled, ErrorCategory::CancelledError),
            (
                JobError::Media("missing".to_string()),
                ErrorCategory::ValidationError,
            ),
        ];

        for (error, category) in cases {
            assert_eq!(error.category(), category, "{}", error);
        }
    }

    #[test]
    fn test_timeout_message() {
        let error = JobError::Timeout {
            kind: JobKind::LanguageDetection,
            elapsed: Duration::from_secs(7200),
        };
        assert_eq!(
            error.user_message(),
            "Language detection did not finish within 120 minutes. Please try again later."
        );
        assert_eq!(error.to_string(), "language_detection timed out after 7200s");
    }

    #[test]
    fn test_result_accessors() {
        let result = JobResult {
            job_id: JobId::new(),
            kind: JobKind::LanguageDetection,
            correlation_id: Some("c-1".to_string()),
            data: json!({"url": "https://files.example/out.srt", "detected_language": " de "}),
        };
        assert_eq!(result.url(), Some("https://files.example/out.srt"));
        assert_eq!(result.detected_language(), Some("de"));

        let empty = JobResult {
            data: json!({"language": ""}),
            ..result
        };
        assert_eq!(empty.url(), None);
        assert_eq!(empty.detected_language(), None);
    }
}
