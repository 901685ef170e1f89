use std::fmt;
use std::path::PathBuf;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Kinds of asynchronous job the service runs
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobKind {
    Transcription,
    Translation,
    LanguageDetection,
}

impl JobKind {
    /// URL path segment for this kind
    pub fn path_segment(self) -> &'static str {
        match self {
            JobKind::Transcription => "transcribe",
            JobKind::Translation => "translate",
            JobKind::LanguageDetection => "detect_language",
        }
    }

    /// Shown when a job fails without any provider error text
    pub fn generic_failure_message(self) -> &'static str {
        match self {
            JobKind::Transcription => "Transcription failed. Please try again.",
            JobKind::Translation => "Translation failed. Please try again.",
            JobKind::LanguageDetection => "Language detection failed. Please try again.",
        }
    }
}

/// Result document formats the service can produce
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Srt,
    Vtt,
    Txt,
    Json,
}

/// Everything needed to submit one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub kind: JobKind,
    pub file: PathBuf,
    /// Canonical id, provider code, or `auto-detect`
    pub language: String,
    /// Translation target (translation jobs only)
    pub target_language: Option<String>,
    pub provider: String,
    pub model: Option<String>,
    pub output_format: Option<OutputFormat>,
}

impl JobRequest {
    pub fn transcription(
        file: impl Into<PathBuf>,
        language: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self::new(JobKind::Transcription, file, language, provider)
    }

    pub fn translation(
        file: impl Into<PathBuf>,
        source_language: impl Into<String>,
        target_language: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        let mut request = Self::new(JobKind::Translation, file, source_language, provider);
        request.target_language = Some(target_language.into());
        request
    }

    pub fn language_detection(file: impl Into<PathBuf>, provider: impl Into<String>) -> Self {
        Self::new(
            JobKind::LanguageDetection,
            file,
            scribeline_languages::AUTO_DETECT,
            provider,
        )
    }

    fn new(
        kind: JobKind,
        file: impl Into<PathBuf>,
        language: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            file: file.into(),
            language: language.into(),
            target_language: None,
            provider: provider.into(),
            model: None,
            output_format: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }
}

/// Account credentials used for (re)authentication
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Remaining quota as reported by the liveness/credits call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credits {
    #[serde(alias = "balance", alias = "remaining")]
    pub credits: f64,
    #[serde(default)]
    pub unit: Option<String>,
}
