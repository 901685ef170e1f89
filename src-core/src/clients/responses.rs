//! Wire shapes returned by the service and their one-time normalization.
//!
//! Nothing outside this module branches on response shape: submissions become a
//! [`SubmitOutcome`], status checks a [`JobStatus`], and catalogs a list of
//! [`ProviderCatalog`] whatever form the service chose.

use std::collections::BTreeMap;

use scribeline_languages::ProviderCatalog;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{error_messages, ApiError};

/// Provider id used when a flat catalog names no provider
pub const DEFAULT_PROVIDER_ID: &str = "default";

/// Job status as reported by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum RemoteStatus {
    #[serde(alias = "created")]
    Created,
    #[serde(alias = "pending", alias = "PROCESSING", alias = "processing")]
    Pending,
    #[serde(alias = "completed", alias = "SUCCESS", alias = "success")]
    Completed,
    #[serde(alias = "error", alias = "FAILED", alias = "failed")]
    Error,
    #[serde(alias = "timeout")]
    Timeout,
}

impl RemoteStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RemoteStatus::Completed | RemoteStatus::Error | RemoteStatus::Timeout
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(alias = "access_token", alias = "accessToken")]
    pub token: String,
}

/// Raw submission response: `{status: COMPLETED, data}`, `{correlation_id}` or `{status: ERROR, errors}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub status: Option<RemoteStatus>,
    #[serde(default, alias = "correlationId")]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Option<Value>,
}

/// What a submission resolved to
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Finished synchronously, no polling needed
    Completed(Value),
    /// Accepted for asynchronous processing
    Accepted { correlation_id: String },
    /// Rejected by the provider
    Failed(Vec<String>),
}

impl SubmitResponse {
    pub fn into_outcome(self) -> Result<SubmitOutcome, ApiError> {
        match self.status {
            Some(RemoteStatus::Error) => {
                return Ok(SubmitOutcome::Failed(
                    self.errors.as_ref().map(error_messages).unwrap_or_default(),
                ))
            }
            Some(RemoteStatus::Completed) => {
                return self.data.map(SubmitOutcome::Completed).ok_or_else(|| {
                    ApiError::unexpected("submission completed without a data payload")
                })
            }
            _ => {}
        }

        match self.correlation_id {
            Some(id) if !id.trim().is_empty() => Ok(SubmitOutcome::Accepted {
                correlation_id: id.trim().to_string(),
            }),
            _ => Err(ApiError::unexpected(format!(
                "submission response has neither a result nor a correlation id (status: {})",
                self.status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "none".to_string())
            ))),
        }
    }
}

/// Raw status check response
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub status: RemoteStatus,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Option<Value>,
}

/// Normalized status of a remote job
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    pub status: RemoteStatus,
    pub data: Option<Value>,
    pub errors: Vec<String>,
}

impl JobStatus {
    pub fn pending() -> Self {
        Self {
            status: RemoteStatus::Pending,
            data: None,
            errors: Vec::new(),
        }
    }

    pub fn completed(data: Value) -> Self {
        Self {
            status: RemoteStatus::Completed,
            data: Some(data),
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            status: RemoteStatus::Error,
            data: None,
            errors,
        }
    }
}

impl From<StatusResponse> for JobStatus {
    fn from(response: StatusResponse) -> Self {
        Self {
            status: response.status,
            errors: response
                .errors
                .as_ref()
                .map(error_messages)
                .unwrap_or_default(),
            data: response.data,
        }
    }
}

/// One catalog row; some providers send bare codes
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawLanguage {
    Code(String),
    Detailed {
        #[serde(alias = "language", alias = "id")]
        code: String,
        #[serde(default, alias = "display_name", alias = "displayName", alias = "label")]
        name: Option<String>,
        #[serde(default, alias = "provider_id", alias = "providerId")]
        provider: Option<String>,
    },
}

impl RawLanguage {
    fn into_parts(self) -> (String, String, Option<String>) {
        match self {
            RawLanguage::Code(code) => (code.clone(), code, None),
            RawLanguage::Detailed {
                code,
                name,
                provider,
            } => {
                let name = name
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| code.clone());
                (code, name, provider)
            }
        }
    }
}

/// A catalog is either a flat list or a map keyed by provider id
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CatalogResponse {
    Flat(Vec<RawLanguage>),
    ByProvider(BTreeMap<String, Vec<RawLanguage>>),
}

impl CatalogResponse {
    /// Normalizes into one catalog per provider.
    ///
    /// Flat rows belong to the provider they name, else to `requested_provider`,
    /// else to [`DEFAULT_PROVIDER_ID`].
    pub fn into_provider_catalogs(self, requested_provider: Option<&str>) -> Vec<ProviderCatalog> {
        match self {
            CatalogResponse::ByProvider(map) => map
                .into_iter()
                .map(|(provider_id, rows)| {
                    rows.into_iter()
                        .fold(ProviderCatalog::new(provider_id), |catalog, row| {
                            let (code, name, _) = row.into_parts();
                            catalog.with_language(code, name)
                        })
                })
                .collect(),
            CatalogResponse::Flat(rows) => {
                let fallback = requested_provider.unwrap_or(DEFAULT_PROVIDER_ID);
                let mut catalogs: Vec<ProviderCatalog> = Vec::new();
                for row in rows {
                    let (code, name, provider) = row.into_parts();
                    let provider_id = provider.unwrap_or_else(|| fallback.to_string());
                    match catalogs.iter_mut().find(|c| c.provider_id == provider_id) {
                        Some(catalog) => catalog.push(code, name),
                        None => {
                            catalogs.push(ProviderCatalog::new(provider_id).with_language(code, name))
                        }
                    }
                }
                catalogs
            }
        }
    }
}
