use async_trait::async_trait;
use scribeline_languages::ProviderCatalog;
use secrecy::SecretString;

use super::error::ApiError;
use super::request::{Credentials, Credits, JobKind, JobRequest};
use super::responses::{JobStatus, SubmitOutcome};

/// Trait for the remote transcription service
///
/// Each implementation knows how to:
/// - Authenticate and check the account balance
/// - Submit jobs and query their status by correlation id
/// - Fetch language catalogs
///
/// Every failure is already classified (see [`super::error::classify`]) and every
/// response already normalized, so callers never inspect status codes or payload shapes.
#[async_trait]
pub trait ServiceApi: Send + Sync {
    /// Exchange credentials for a session token
    async fn login(&self, credentials: &Credentials) -> Result<SecretString, ApiError>;

    /// Cheap authenticated call, doubles as token liveness check
    async fn credits(&self, token: &SecretString) -> Result<Credits, ApiError>;

    async fn submit(
        &self,
        token: &SecretString,
        request: &JobRequest,
    ) -> Result<SubmitOutcome, ApiError>;

    async fn status(&self, token: &SecretString, correlation_id: &str)
        -> Result<JobStatus, ApiError>;

    /// Language catalogs for a job kind, optionally restricted to one provider
    async fn catalog(
        &self,
        token: &SecretString,
        kind: JobKind,
        provider: Option<&str>,
    ) -> Result<Vec<ProviderCatalog>, ApiError>;
}
