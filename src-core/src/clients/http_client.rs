use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use reqwest::multipart::{Form, Part};
use scribeline_languages::ProviderCatalog;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio_util::io::ReaderStream;

use crate::config::CoreConfig;

use super::client::ServiceApi;
use super::error::{classify, ApiError};
use super::request::{Credentials, Credits, JobKind, JobRequest};
use super::responses::{
    CatalogResponse, JobStatus, LoginResponse, StatusResponse, SubmitOutcome, SubmitResponse,
};

/// Base delay between transport-level retries, multiplied by the attempt number
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// `reqwest`-backed client for the transcription service
pub struct HttpServiceClient {
    http: reqwest::Client,
    base_url: String,
    /// Extra attempts for idempotent GETs that got no response
    network_retries: u32,
}

impl HttpServiceClient {
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
        network_retries: u32,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            network_retries,
        })
    }

    pub fn from_config(config: &CoreConfig) -> Result<Self, reqwest::Error> {
        Self::new(
            config.base_url.clone(),
            Duration::from_secs(config.request_timeout_seconds),
            config.network_retries,
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send request and return the body of a successful response
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, ApiError> {
        let response = request.send().await.map_err(|e| {
            error!("API request error: {}", e);
            classify(None, &format!("Request failed: {}", e))
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            error!("Failed to read response body: {}", e);
            classify(None, &format!("Failed to read response: {}", e))
        })?;

        if !status.is_success() {
            error!("API error response ({}): {}", status, body);
            return Err(classify(Some(status.as_u16()), &body));
        }

        Ok(body)
    }

    /// Authenticated GET, retried on transport failures only
    async fn get(
        &self,
        path: &str,
        token: &SecretString,
        query: &[(&str, &str)],
    ) -> Result<String, ApiError> {
        let url = self.url(path);
        let mut attempt = 0;
        loop {
            let request = self
                .http
                .get(&url)
                .bearer_auth(token.expose_secret())
                .query(query);

            match self.send(request).await {
                Err(e) if e.is_transport_retryable() && attempt < self.network_retries => {
                    attempt += 1;
                    warn!(
                        "GET {} failed ({}), retrying ({}/{})",
                        url, e, attempt, self.network_retries
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                result => return result,
            }
        }
    }

    async fn build_form(&self, request: &JobRequest) -> Result<Form, ApiError> {
        let part = file_part(&request.file).await?;

        let mut form = Form::new()
            .part("file", part)
            .text("language", request.language.clone())
            .text("provider", request.provider.clone());
        if let Some(target) = &request.target_language {
            form = form.text("target_language", target.clone());
        }
        if let Some(model) = &request.model {
            form = form.text("model", model.clone());
        }
        if let Some(format) = request.output_format {
            form = form.text("output_format", format.to_string());
        }
        Ok(form)
    }
}

/// Streams the file instead of buffering it; media can be hours long
async fn file_part(path: &Path) -> Result<Part, ApiError> {
    let read_error = |e: std::io::Error| ApiError::Validation {
        status: None,
        message: format!("Cannot read {}: {}", path.display(), e),
    };

    let file = tokio::fs::File::open(path).await.map_err(read_error)?;
    let length = file.metadata().await.map_err(read_error)?.len();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload".to_string());

    let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
    Ok(Part::stream_with_length(body, length).file_name(file_name))
}

fn parse<T: DeserializeOwned>(body: &str, what: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| {
        error!("Failed to parse {} response: {}", what, e);
        ApiError::unexpected(format!("Failed to parse {} response: {}", what, e))
    })
}

#[async_trait]
impl ServiceApi for HttpServiceClient {
    async fn login(&self, credentials: &Credentials) -> Result<SecretString, ApiError> {
        debug!("Logging in as '{}'", credentials.username);
        let request = self.http.post(self.url("auth/login")).json(&json!({
            "username": credentials.username,
            "password": credentials.password.expose_secret(),
        }));

        let body = self.send(request).await?;
        let response: LoginResponse = parse(&body, "login")?;
        if response.token.trim().is_empty() {
            return Err(ApiError::unexpected("login returned an empty token"));
        }
        info!("Login successful for '{}'", credentials.username);
        Ok(SecretString::from(response.token))
    }

    async fn credits(&self, token: &SecretString) -> Result<Credits, ApiError> {
        let body = self.get("account/credits", token, &[]).await?;
        parse(&body, "credits")
    }

    async fn submit(
        &self,
        token: &SecretString,
        request: &JobRequest,
    ) -> Result<SubmitOutcome, ApiError> {
        let form = self.build_form(request).await?;
        info!(
            "Submitting {} job for {:?} (provider: {}, language: {})",
            request.kind, request.file, request.provider, request.language
        );

        let http_request = self
            .http
            .post(self.url(&format!("jobs/{}", request.kind.path_segment())))
            .bearer_auth(token.expose_secret())
            .multipart(form);

        let body = self.send(http_request).await?;
        parse::<SubmitResponse>(&body, "submission")?.into_outcome()
    }

    async fn status(
        &self,
        token: &SecretString,
        correlation_id: &str,
    ) -> Result<JobStatus, ApiError> {
        let body = self
            .get(&format!("jobs/status/{}", correlation_id), token, &[])
            .await?;
        let response: StatusResponse = parse(&body, "status")?;
        Ok(response.into())
    }

    async fn catalog(
        &self,
        token: &SecretString,
        kind: JobKind,
        provider: Option<&str>,
    ) -> Result<Vec<ProviderCatalog>, ApiError> {
        let path = format!("languages/{}", kind.path_segment());
        let body = match provider {
            Some(provider) => self.get(&path, token, &[("provider", provider)]).await?,
            None => self.get(&path, token, &[]).await?,
        };
        let response: CatalogResponse = parse(&body, "catalog")?;
        Ok(response.into_provider_catalogs(provider))
    }
}
