//! Session Manager - sole owner of the authentication token.
//!
//! ```text
//! ensure_authenticated ──token cached?──yes──> credits (liveness) ──ok──> Reused
//!        │                                        │
//!        no                              401/403: clear token
//!        │                              other failure: keep token
//!        └──────────────> login(credentials) <────┘
//! ```
//!
//! Logins are single-flight: while an attempt is outstanding every caller awaits that
//! same attempt, and the attempt is dropped from the slot as soon as it resolves.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use log::{debug, info, warn};
use secrecy::{ExposeSecret, SecretString};

use crate::clients::{ApiError, Credentials, Credits, ServiceApi};
use crate::sync::lock;

use super::cache::{CachedToken, TokenCache};

/// Authentication state. The token is either wholly valid (as far as we know) or absent.
#[derive(Clone, Default)]
pub struct Session {
    token: Option<SecretString>,
    issued_at: Option<SystemTime>,
    cached_on_disk: bool,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn issued_at(&self) -> Option<SystemTime> {
        self.issued_at
    }

    pub fn cached_on_disk(&self) -> bool {
        self.cached_on_disk
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("issued_at", &self.issued_at)
            .field("cached_on_disk", &self.cached_on_disk)
            .finish()
    }
}

/// How a successful authentication was reached
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    /// The existing token passed the liveness check
    Reused { credits: Credits },
    /// A fresh login produced a new token
    LoggedIn,
}

type AuthAttempt = Shared<BoxFuture<'static, Result<AuthOutcome, ApiError>>>;

struct Inner {
    api: Arc<dyn ServiceApi>,
    cache: Arc<dyn TokenCache>,
    session: Mutex<Session>,
    credentials: Mutex<Option<Credentials>>,
    /// Outstanding attempt, tagged with its id
    attempt: Mutex<Option<(u64, AuthAttempt)>>,
    next_attempt_id: AtomicU64,
    /// Bumped by logout so in-flight attempts cannot resurrect the session
    epoch: AtomicU64,
}

/// Owns the token lifecycle; cheap to clone, clones share state
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Create a manager, restoring any token left in `cache` by a previous run.
    pub fn new(api: Arc<dyn ServiceApi>, cache: Arc<dyn TokenCache>) -> Self {
        let session = match cache.load() {
            Ok(Some(cached)) => {
                info!("Restored cached session token");
                Session {
                    token: Some(cached.token),
                    issued_at: Some(cached.issued_at),
                    cached_on_disk: cache.persistent(),
                }
            }
            Ok(None) => Session::default(),
            Err(e) => {
                warn!("Failed to read cached session token: {}", e);
                Session::default()
            }
        };

        Self {
            inner: Arc::new(Inner {
                api,
                cache,
                session: Mutex::new(session),
                credentials: Mutex::new(None),
                attempt: Mutex::new(None),
                next_attempt_id: AtomicU64::new(0),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    pub fn api(&self) -> Arc<dyn ServiceApi> {
        self.inner.api.clone()
    }

    /// Snapshot of the current session
    pub fn session(&self) -> Session {
        lock(&self.inner.session).clone()
    }

    pub fn is_authenticated(&self) -> bool {
        lock(&self.inner.session).is_authenticated()
    }

    /// Remember credentials for later (re)authentication without logging in now.
    pub fn set_credentials(&self, credentials: Credentials) {
        *lock(&self.inner.credentials) = Some(credentials);
    }

    pub fn has_credentials(&self) -> bool {
        lock(&self.inner.credentials).is_some()
    }

    /// Make sure the session is live: verify the cached token, else log in.
    pub async fn ensure_authenticated(&self) -> Result<AuthOutcome, ApiError> {
        self.join_or_start(false).await
    }

    /// Log in with `credentials`, skipping the cached-token check.
    ///
    /// Joins an attempt that is already outstanding instead of starting a second one.
    pub async fn login(&self, credentials: Credentials) -> Result<AuthOutcome, ApiError> {
        self.set_credentials(credentials);
        self.join_or_start(true).await
    }

    /// Clear the in-memory and persisted token and forget credentials. Idempotent.
    pub fn logout(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        *lock(&self.inner.attempt) = None;
        *lock(&self.inner.credentials) = None;
        *lock(&self.inner.session) = Session::default();
        if let Err(e) = self.inner.cache.clear() {
            warn!("Failed to clear cached session token: {}", e);
        }
        info!("Logged out");
    }

    /// Drop the token (memory and cache) but keep credentials for the next login.
    pub fn clear_token(&self) {
        *lock(&self.inner.session) = Session::default();
        if let Err(e) = self.inner.cache.clear() {
            warn!("Failed to clear cached session token: {}", e);
        }
    }

    /// Run an authenticated call, re-authenticating and retrying exactly once if the
    /// call is rejected as unauthenticated. A second rejection is returned as is.
    pub async fn call<T, F, Fut>(&self, mut op: F) -> Result<T, ApiError>
    where
        F: FnMut(Arc<dyn ServiceApi>, SecretString) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let token = match self.inner.current_token() {
            Some(token) => token,
            None => {
                self.ensure_authenticated().await?;
                self.inner.require_token()?
            }
        };

        match op(self.api(), token.clone()).await {
            Err(e) if e.is_authentication() => {
                info!("Call rejected as unauthenticated ({}), re-authenticating", e);
                self.inner.invalidate(&token);
                self.ensure_authenticated().await?;
                let token = self.inner.require_token()?;

                op(self.api(), token).await.map_err(|e| match e {
                    ApiError::Authentication { status, .. } => {
                        warn!("Call rejected again after re-authentication");
                        ApiError::Authentication {
                            status,
                            message: "authentication failed".to_string(),
                        }
                    }
                    other => other,
                })
            }
            other => other,
        }
    }

    fn join_or_start(&self, fresh_login: bool) -> AuthAttempt {
        let mut slot = lock(&self.inner.attempt);
        if let Some((_, attempt)) = slot.as_ref() {
            debug!("Joining outstanding authentication attempt");
            return attempt.clone();
        }

        let id = self.inner.next_attempt_id.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.clone();
        let attempt = async move {
            let result = inner.authenticate(fresh_login).await;
            let mut slot = lock(&inner.attempt);
            if matches!(slot.as_ref(), Some((current, _)) if *current == id) {
                *slot = None;
            }
            result
        }
        .boxed()
        .shared();

        *slot = Some((id, attempt.clone()));
        attempt
    }
}

impl Inner {
    fn current_token(&self) -> Option<SecretString> {
        lock(&self.session).token.clone()
    }

    fn require_token(&self) -> Result<SecretString, ApiError> {
        self.current_token()
            .ok_or_else(|| ApiError::authentication("Not logged in"))
    }

    /// Forget `token` if it is still the current one
    fn invalidate(&self, token: &SecretString) {
        let mut session = lock(&self.session);
        let is_current = session
            .token
            .as_ref()
            .is_some_and(|t| t.expose_secret() == token.expose_secret());
        if is_current {
            *session = Session::default();
            drop(session);
            if let Err(e) = self.cache.clear() {
                warn!("Failed to clear cached session token: {}", e);
            }
        }
    }

    fn install(&self, token: SecretString) {
        let cached = CachedToken::new(token);
        let cached_on_disk = match self.cache.store(&cached) {
            Ok(()) if self.cache.persistent() => true,
            Ok(()) => {
                warn!("Token store does not persist, session ends with this process");
                false
            }
            Err(e) => {
                warn!("Failed to cache session token: {}", e);
                false
            }
        };
        *lock(&self.session) = Session {
            token: Some(cached.token),
            issued_at: Some(cached.issued_at),
            cached_on_disk,
        };
    }

    async fn authenticate(&self, fresh_login: bool) -> Result<AuthOutcome, ApiError> {
        let epoch = self.epoch.load(Ordering::SeqCst);

        if !fresh_login {
            if let Some(token) = self.current_token() {
                match self.api.credits(&token).await {
                    Ok(credits) => {
                        self.check_epoch(epoch)?;
                        debug!("Session token is live");
                        return Ok(AuthOutcome::Reused { credits });
                    }
                    Err(e) if e.is_authentication() => {
                        info!("Session token rejected, logging in again");
                        self.invalidate(&token);
                    }
                    Err(e) => {
                        warn!("Could not verify session token ({}), logging in again", e);
                    }
                }
            }
        }

        let credentials = lock(&self.credentials)
            .clone()
            .ok_or_else(|| ApiError::authentication("No credentials available"))?;

        let token = self.api.login(&credentials).await?;
        self.check_epoch(epoch)?;
        self.install(token);
        info!("Logged in as '{}'", credentials.username);
        Ok(AuthOutcome::LoggedIn)
    }

    fn check_epoch(&self, started_at: u64) -> Result<(), ApiError> {
        if self.epoch.load(Ordering::SeqCst) != started_at {
            warn!("Discarding authentication that completed after logout");
            return Err(ApiError::authentication("Logged out during authentication"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{JobStatus, RemoteStatus};
    use crate::session::{KeychainTokenCache, MemoryTokenCache};
    use crate::testing::FakeApi;
    use futures_util::future::join_all;
    use std::sync::atomic::Ordering::SeqCst;
    use std::time::Duration;

    fn manager(api: &Arc<FakeApi>, cache: &Arc<MemoryTokenCache>) -> SessionManager {
        SessionManager::new(api.clone(), cache.clone())
    }

    fn credentials() -> Credentials {
        Credentials::new("ada", "correct horse")
    }

    async fn status_via(session: &SessionManager) -> Result<JobStatus, ApiError> {
        session
            .call(|api, token| async move { api.status(&token, "job-1").await })
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_cached_token_is_reused() {
        let api = FakeApi::new();
        api.add_valid_token("cached");
        let cache = Arc::new(MemoryTokenCache::with_token("cached"));
        let session = manager(&api, &cache);
        assert!(session.session().cached_on_disk());

        let outcome = session.ensure_authenticated().await.unwrap();

        assert!(matches!(outcome, AuthOutcome::Reused { .. }));
        assert_eq!(api.login_calls.load(SeqCst), 0);
        assert_eq!(api.credits_calls.load(SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_cached_token_is_replaced_before_call() {
        let api = FakeApi::new();
        let cache = Arc::new(MemoryTokenCache::with_token("stale"));
        let session = manager(&api, &cache);
        session.set_credentials(credentials());

        let outcome = session.ensure_authenticated().await.unwrap();
        assert_eq!(outcome, AuthOutcome::LoggedIn);
        assert_eq!(cache.token().as_deref(), Some("token-1"));

        status_via(&session).await.unwrap();
        assert_eq!(api.status_tokens(), vec!["token-1".to_string()]);
        assert_eq!(api.login_calls.load(SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_into_transient_store_is_not_cached_on_disk() {
        let api = FakeApi::new();
        let cache = KeychainTokenCache::with_store(keyring::mock::default_credential_builder().as_ref())
            .unwrap();
        let session = SessionManager::new(api.clone(), Arc::new(cache));

        session.login(credentials()).await.unwrap();

        assert!(session.is_authenticated());
        assert!(!session.session().cached_on_disk());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_login() {
        let api = FakeApi::new();
        api.set_login_delay(Duration::from_secs(2));
        let cache = Arc::new(MemoryTokenCache::new());
        let session = manager(&api, &cache);
        session.set_credentials(credentials());

        let results = join_all((0..8).map(|_| session.ensure_authenticated())).await;

        assert_eq!(api.login_calls.load(SeqCst), 1);
        assert!(results.iter().all(|r| r == &Ok(AuthOutcome::LoggedIn)));

        // The resolved attempt is discarded: the next login starts fresh
        session.login(credentials()).await.unwrap();
        assert_eq!(api.login_calls.load(SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_joins_outstanding_attempt() {
        let api = FakeApi::new();
        api.set_login_delay(Duration::from_secs(1));
        let session = manager(&api, &Arc::new(MemoryTokenCache::new()));
        session.set_credentials(credentials());

        let (a, b) = tokio::join!(session.ensure_authenticated(), session.login(credentials()));

        assert_eq!(a, b);
        assert_eq!(api.login_calls.load(SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_triggers_single_reauth_and_retry() {
        let api = FakeApi::new();
        let session = manager(&api, &Arc::new(MemoryTokenCache::new()));
        session.login(credentials()).await.unwrap();

        api.push_status(Err(ApiError::authentication("token expired")));
        api.push_status(Ok(JobStatus::pending()));

        let status = status_via(&session).await.unwrap();

        assert_eq!(status.status, RemoteStatus::Pending);
        assert_eq!(api.login_calls.load(SeqCst), 2);
        assert_eq!(
            api.status_tokens(),
            vec!["token-1".to_string(), "token-2".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_auth_failure_is_surfaced() {
        let api = FakeApi::new();
        let session = manager(&api, &Arc::new(MemoryTokenCache::new()));
        session.login(credentials()).await.unwrap();

        api.push_status(Err(ApiError::authentication("token expired")));
        api.push_status(Err(ApiError::authentication("still expired")));
        api.push_status(Ok(JobStatus::pending()));

        let error = status_via(&session).await.unwrap_err();

        assert_eq!(error, ApiError::authentication("authentication failed"));
        assert_eq!(api.status_calls.load(SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failure_during_verification_falls_through_to_login() {
        let api = FakeApi::new();
        api.add_valid_token("cached");
        api.set_credits_error(Some(ApiError::Network("connection reset".to_string())));
        let cache = Arc::new(MemoryTokenCache::with_token("cached"));
        let session = manager(&api, &cache);
        session.set_credentials(credentials());

        let outcome = session.ensure_authenticated().await.unwrap();

        assert_eq!(outcome, AuthOutcome::LoggedIn);
        assert_eq!(api.login_calls.load(SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failure_everywhere_keeps_cached_token() {
        let api = FakeApi::new();
        api.set_credits_error(Some(ApiError::Network("offline".to_string())));
        api.set_login_error(Some(ApiError::Network("offline".to_string())));
        let cache = Arc::new(MemoryTokenCache::with_token("cached"));
        let session = manager(&api, &cache);
        session.set_credentials(credentials());

        let error = session.ensure_authenticated().await.unwrap_err();

        assert_eq!(error.category(), crate::clients::ErrorCategory::NetworkError);
        assert!(session.is_authenticated());
        assert_eq!(cache.token().as_deref(), Some("cached"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_is_not_retried() {
        let api = FakeApi::new();
        let session = manager(&api, &Arc::new(MemoryTokenCache::new()));
        session.login(credentials()).await.unwrap();

        let limited = ApiError::RateLimited {
            message: "slow down".to_string(),
        };
        api.push_status(Err(limited.clone()));

        assert_eq!(status_via(&session).await.unwrap_err(), limited);
        assert_eq!(api.status_calls.load(SeqCst), 1);
        assert_eq!(api.login_calls.load(SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_login_leaves_idle_state() {
        let api = FakeApi::new();
        api.set_login_error(Some(ApiError::Authentication {
            status: Some(401),
            message: "bad password".to_string(),
        }));
        let session = manager(&api, &Arc::new(MemoryTokenCache::new()));

        assert!(session.login(credentials()).await.is_err());
        assert!(!session.is_authenticated());

        api.set_login_error(None);
        assert_eq!(session.login(credentials()).await, Ok(AuthOutcome::LoggedIn));
        assert_eq!(api.login_calls.load(SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_without_credentials_fails_authentication() {
        let api = FakeApi::new();
        let session = manager(&api, &Arc::new(MemoryTokenCache::new()));

        let error = status_via(&session).await.unwrap_err();

        assert!(error.is_authentication());
        assert_eq!(api.status_calls.load(SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_is_idempotent_and_clears_cache() {
        let api = FakeApi::new();
        let cache = Arc::new(MemoryTokenCache::new());
        let session = manager(&api, &cache);
        session.login(credentials()).await.unwrap();
        assert!(cache.token().is_some());

        session.logout();
        session.logout();

        assert!(!session.is_authenticated());
        assert!(!session.has_credentials());
        assert!(cache.token().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_during_login_discards_token() {
        let api = FakeApi::new();
        api.set_login_delay(Duration::from_secs(5));
        let cache = Arc::new(MemoryTokenCache::new());
        let session = manager(&api, &cache);

        let pending = tokio::spawn({
            let session = session.clone();
            async move { session.login(credentials()).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        session.logout();

        let result = pending.await.unwrap();
        assert!(result.unwrap_err().is_authentication());
        assert!(!session.is_authenticated());
        assert!(cache.token().is_none());
    }
}
