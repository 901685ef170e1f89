//! Scriptable in-process service used by the unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scribeline_languages::ProviderCatalog;
use secrecy::{ExposeSecret, SecretString};
use tokio::time::Instant;

use crate::clients::{
    ApiError, Credentials, Credits, JobKind, JobRequest, JobStatus, ServiceApi, SubmitOutcome,
};
use crate::sync::lock;

#[derive(Default)]
pub struct FakeApi {
    pub login_calls: AtomicUsize,
    pub credits_calls: AtomicUsize,
    pub submit_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub catalog_calls: AtomicUsize,
    login_delay: Mutex<Duration>,
    status_delay: Mutex<Duration>,
    login_error: Mutex<Option<ApiError>>,
    credits_error: Mutex<Option<ApiError>>,
    valid_tokens: Mutex<HashSet<String>>,
    submits: Mutex<VecDeque<Result<SubmitOutcome, ApiError>>>,
    statuses: Mutex<VecDeque<Result<JobStatus, ApiError>>>,
    status_log: Mutex<Vec<(Instant, String)>>,
    submitted: Mutex<Vec<JobRequest>>,
    catalogs: Mutex<HashMap<JobKind, Vec<ProviderCatalog>>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_login_delay(&self, delay: Duration) {
        *lock(&self.login_delay) = delay;
    }

    pub fn set_status_delay(&self, delay: Duration) {
        *lock(&self.status_delay) = delay;
    }

    pub fn set_login_error(&self, error: Option<ApiError>) {
        *lock(&self.login_error) = error;
    }

    pub fn set_credits_error(&self, error: Option<ApiError>) {
        *lock(&self.credits_error) = error;
    }

    pub fn add_valid_token(&self, token: &str) {
        lock(&self.valid_tokens).insert(token.to_string());
    }

    pub fn push_submit(&self, outcome: Result<SubmitOutcome, ApiError>) {
        lock(&self.submits).push_back(outcome);
    }

    /// Queue a status answer; once the queue is empty every check reports PENDING
    pub fn push_status(&self, status: Result<JobStatus, ApiError>) {
        lock(&self.statuses).push_back(status);
    }

    pub fn set_catalogs(&self, kind: JobKind, catalogs: Vec<ProviderCatalog>) {
        lock(&self.catalogs).insert(kind, catalogs);
    }

    /// When each status check was issued
    pub fn status_times(&self) -> Vec<Instant> {
        lock(&self.status_log).iter().map(|(at, _)| *at).collect()
    }

    /// Token each status check carried
    pub fn status_tokens(&self) -> Vec<String> {
        lock(&self.status_log)
            .iter()
            .map(|(_, token)| token.clone())
            .collect()
    }

    pub fn submitted(&self) -> Vec<JobRequest> {
        lock(&self.submitted).clone()
    }
}

#[async_trait]
impl ServiceApi for FakeApi {
    async fn login(&self, _credentials: &Credentials) -> Result<SecretString, ApiError> {
        let n = self.login_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *lock(&self.login_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = lock(&self.login_error).clone() {
            return Err(error);
        }
        let token = format!("token-{}", n);
        self.add_valid_token(&token);
        Ok(SecretString::from(token))
    }

    async fn credits(&self, token: &SecretString) -> Result<Credits, ApiError> {
        self.credits_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = lock(&self.credits_error).clone() {
            return Err(error);
        }
        if !lock(&self.valid_tokens).contains(token.expose_secret()) {
            return Err(ApiError::Authentication {
                status: Some(401),
                message: "invalid token".to_string(),
            });
        }
        Ok(Credits {
            credits: 42.0,
            unit: Some("minutes".to_string()),
        })
    }

    async fn submit(
        &self,
        _token: &SecretString,
        request: &JobRequest,
    ) -> Result<SubmitOutcome, ApiError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.submitted).push(request.clone());
        lock(&self.submits).pop_front().unwrap_or_else(|| {
            Ok(SubmitOutcome::Accepted {
                correlation_id: "job-1".to_string(),
            })
        })
    }

    async fn status(
        &self,
        token: &SecretString,
        _correlation_id: &str,
    ) -> Result<JobStatus, ApiError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.status_log).push((Instant::now(), token.expose_secret().to_string()));
        let delay = *lock(&self.status_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        lock(&self.statuses)
            .pop_front()
            .unwrap_or_else(|| Ok(JobStatus::pending()))
    }

    async fn catalog(
        &self,
        _token: &SecretString,
        kind: JobKind,
        provider: Option<&str>,
    ) -> Result<Vec<ProviderCatalog>, ApiError> {
        self.catalog_calls.fetch_add(1, Ordering::SeqCst);
        let catalogs = lock(&self.catalogs).get(&kind).cloned().unwrap_or_default();
        Ok(catalogs
            .into_iter()
            .filter(|c| provider.is_none_or(|p| c.provider_id == p))
            .collect())
    }
}
