//! Orchestration Facade - the one surface a front end talks to.
//!
//! Holds the session, the poller and the per-kind language catalogs, and publishes a
//! single [`ClientState`] that front ends render. Jobs run as independent tasks; each
//! has a cancellation token kept here until the job ends.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use scribeline_languages::{consolidate, is_auto_detect, LanguageCatalog, AUTO_DETECT};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clients::{ApiError, Credentials, Credits, JobKind, JobRequest, ServiceApi};
use crate::config::CoreConfig;
use crate::jobs::{Job, JobError, JobId, JobPoller, JobResult, JobState, PollingSettings};
use crate::session::{AuthOutcome, SessionManager, TokenCache};
use crate::sync::lock;

use super::media::{MediaTool, TempArtifact};
use super::state::{ActiveJob, ClientState, SessionStatus};

/// A running job
pub struct JobHandle {
    id: JobId,
    cancel: CancellationToken,
    state: watch::Receiver<JobState>,
    task: JoinHandle<Result<JobResult, JobError>>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.state.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the job to end
    pub async fn outcome(self) -> Result<JobResult, JobError> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => Err(JobError::Cancelled),
            Err(e) => Err(JobError::Internal(e.to_string())),
        }
    }
}

struct Inner {
    session: SessionManager,
    poller: JobPoller,
    polling: watch::Sender<PollingSettings>,
    media: Arc<dyn MediaTool>,
    providers: BTreeMap<JobKind, Vec<String>>,
    catalogs: Mutex<HashMap<JobKind, Arc<LanguageCatalog>>>,
    cancel_tokens: Mutex<HashMap<JobId, CancellationToken>>,
    state: watch::Sender<ClientState>,
}

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        config: &CoreConfig,
        api: Arc<dyn ServiceApi>,
        cache: Arc<dyn TokenCache>,
        media: Arc<dyn MediaTool>,
    ) -> Self {
        let session = SessionManager::new(api, cache);
        let (polling, settings) = watch::channel(config.polling_settings());
        let poller = JobPoller::new(session.clone(), settings);

        Self {
            inner: Arc::new(Inner {
                session,
                poller,
                polling,
                media,
                providers: config.providers.clone(),
                catalogs: Mutex::new(HashMap::new()),
                cancel_tokens: Mutex::new(HashMap::new()),
                state: watch::Sender::new(ClientState::default()),
            }),
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.inner.session
    }

    pub fn state(&self) -> ClientState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.inner.state.subscribe()
    }

    /// Takes effect at the next scheduled check of every running job
    pub fn set_polling_settings(&self, settings: PollingSettings) {
        info!(
            "Polling every {}s, giving up after {}s",
            settings.interval().as_secs(),
            settings.timeout().as_secs()
        );
        self.inner.polling.send_replace(settings);
    }

    pub async fn login(&self, credentials: Credentials) -> Result<(), ApiError> {
        let username = credentials.username.clone();
        self.inner.publish(|s| s.session = SessionStatus::Authenticating);

        match self.inner.session.login(credentials).await {
            Ok(_) => {
                self.inner.publish(|s| {
                    s.session = SessionStatus::LoggedIn;
                    s.username = Some(username);
                });
                self.inner.refresh_credits_quietly().await;
                Ok(())
            }
            Err(e) => {
                warn!("Login failed: {}", e);
                self.inner.publish_session();
                Err(e)
            }
        }
    }

    /// Startup: reuse the cached token if it is still live, else log in with
    /// `credentials`. Returns false when there is nothing to restore from.
    pub async fn restore_session(&self, credentials: Option<Credentials>) -> Result<bool, ApiError> {
        let username = credentials.as_ref().map(|c| c.username.clone());
        if let Some(credentials) = credentials {
            self.inner.session.set_credentials(credentials);
        }
        if !self.inner.session.is_authenticated() && !self.inner.session.has_credentials() {
            debug!("No cached token or stored credentials, staying logged out");
            return Ok(false);
        }

        self.inner.publish(|s| s.session = SessionStatus::Authenticating);
        match self.inner.session.ensure_authenticated().await {
            Ok(AuthOutcome::Reused { credits }) => {
                info!("Restored previous session");
                self.inner.publish(|s| {
                    s.session = SessionStatus::LoggedIn;
                    s.username = username;
                    s.credits = Some(credits);
                });
            }
            Ok(AuthOutcome::LoggedIn) => {
                self.inner.publish(|s| {
                    s.session = SessionStatus::LoggedIn;
                    s.username = username;
                });
                self.inner.refresh_credits_quietly().await;
            }
            Err(e) => {
                warn!("Could not restore session: {}", e);
                self.inner.publish_session();
                return Err(e);
            }
        }
        Ok(true)
    }

    /// Cancel every running job and forget the session. Idempotent.
    pub fn logout(&self) {
        for (id, token) in lock(&self.inner.cancel_tokens).iter() {
            debug!("Cancelling job {} on logout", id);
            token.cancel();
        }
        self.inner.session.logout();
        lock(&self.inner.catalogs).clear();
        self.inner.publish(|s| {
            s.session = SessionStatus::LoggedOut;
            s.username = None;
            s.credits = None;
        });
    }

    pub async fn refresh_credits(&self) -> Result<Credits, ApiError> {
        self.inner.refresh_credits().await
    }

    /// Consolidated catalog for `kind`, fetched on first use
    pub async fn languages(&self, kind: JobKind) -> Result<Arc<LanguageCatalog>, ApiError> {
        self.inner.languages(kind).await
    }

    /// Fetch the catalog for `kind` again, replacing the cached one
    pub async fn reload_languages(&self, kind: JobKind) -> Result<Arc<LanguageCatalog>, ApiError> {
        self.inner.reload_languages(kind).await
    }

    /// Providers able to handle `language` (any code of the group) for `kind`
    pub async fn compatible_providers(
        &self,
        kind: JobKind,
        language: &str,
    ) -> Result<Vec<String>, ApiError> {
        let catalog = self.inner.languages(kind).await?;
        Ok(catalog
            .canonical_id(language)
            .and_then(|id| catalog.providers_for(id))
            .map(|providers| providers.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// The code `provider` expects for `language`
    pub async fn resolve_language(
        &self,
        kind: JobKind,
        language: &str,
        provider: &str,
    ) -> Result<String, JobError> {
        self.inner.resolve_language(kind, language, provider).await
    }

    /// Start a job. It runs in the background; the handle reports its outcome.
    pub fn submit(&self, request: JobRequest) -> Result<JobHandle, JobError> {
        if request.provider.trim().is_empty() {
            return Err(JobError::InvalidRequest("Please select a provider.".to_string()));
        }
        if request.kind == JobKind::Translation
            && request
                .target_language
                .as_deref()
                .is_none_or(|t| t.trim().is_empty() || is_auto_detect(t))
        {
            return Err(JobError::InvalidRequest(
                "Please select a target language.".to_string(),
            ));
        }

        let job = Job::new(JobId::new(), request.kind);
        let id = job.id;
        let cancel = CancellationToken::new();
        lock(&self.inner.cancel_tokens).insert(id, cancel.clone());
        self.inner.publish(|s| {
            s.active_jobs.insert(
                id,
                ActiveJob {
                    kind: request.kind,
                    file: request.file.clone(),
                    state: job.state(),
                    duration_seconds: None,
                },
            );
        });

        let mut updates = job.subscribe();
        let inner = self.inner.clone();
        tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let state = *updates.borrow_and_update();
                inner.update_active(id, |active| active.state = state);
            }
        });

        let state = job.subscribe();
        let inner = self.inner.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let outcome = inner.run_job(job, request, &token).await;
            inner.finish_job(id, &outcome).await;
            outcome
        });

        Ok(JobHandle {
            id,
            cancel,
            state,
            task,
        })
    }

    /// Request cancellation; false if no such job is running
    pub fn cancel(&self, id: JobId) -> bool {
        match lock(&self.inner.cancel_tokens).get(&id) {
            Some(token) => {
                info!("Cancellation requested for job {}", id);
                token.cancel();
                true
            }
            None => false,
        }
    }
}

impl Inner {
    fn publish(&self, f: impl FnOnce(&mut ClientState)) {
        self.state.send_modify(f);
    }

    /// Align the published status with whether a token is held
    fn publish_session(&self) {
        let authenticated = self.session.is_authenticated();
        self.publish(|s| {
            if authenticated {
                s.session = SessionStatus::LoggedIn;
            } else {
                s.session = SessionStatus::LoggedOut;
                s.credits = None;
            }
        });
    }

    fn update_active(&self, id: JobId, f: impl FnOnce(&mut ActiveJob)) {
        self.state.send_if_modified(|s| match s.active_jobs.get_mut(&id) {
            Some(active) => {
                f(active);
                true
            }
            None => false,
        });
    }

    async fn refresh_credits(&self) -> Result<Credits, ApiError> {
        match self
            .session
            .call(|api, token| async move { api.credits(&token).await })
            .await
        {
            Ok(credits) => {
                debug!("Credits: {}", credits.credits);
                let published = credits.clone();
                self.publish(|s| s.credits = Some(published));
                Ok(credits)
            }
            Err(e) => {
                self.publish_session();
                Err(e)
            }
        }
    }

    async fn refresh_credits_quietly(&self) {
        if let Err(e) = self.refresh_credits().await {
            warn!("Failed to refresh credits: {}", e);
        }
    }

    async fn languages(&self, kind: JobKind) -> Result<Arc<LanguageCatalog>, ApiError> {
        let cached = lock(&self.catalogs).get(&kind).cloned();
        match cached {
            Some(catalog) => Ok(catalog),
            None => self.reload_languages(kind).await,
        }
    }

    async fn reload_languages(&self, kind: JobKind) -> Result<Arc<LanguageCatalog>, ApiError> {
        let providers = self.providers.get(&kind).cloned().unwrap_or_default();
        let mut catalogs = Vec::new();

        if providers.is_empty() {
            catalogs = self
                .session
                .call(|api, token| async move { api.catalog(&token, kind, None).await })
                .await?;
        } else {
            for provider in &providers {
                let fetched = self
                    .session
                    .call(|api, token| async move {
                        api.catalog(&token, kind, Some(provider.as_str())).await
                    })
                    .await?;
                catalogs.extend(fetched);
            }
        }

        let catalog = Arc::new(consolidate(&catalogs));
        info!(
            "Loaded {} {} languages from {} providers",
            catalog.len(),
            kind,
            catalog.providers().len()
        );
        lock(&self.catalogs).insert(kind, catalog.clone());
        Ok(catalog)
    }

    async fn resolve_language(
        &self,
        kind: JobKind,
        language: &str,
        provider: &str,
    ) -> Result<String, JobError> {
        let catalog = self.languages(kind).await?;
        let canonical = catalog
            .canonical_id(language)
            .ok_or_else(|| JobError::InvalidRequest(format!("Unknown language '{}'.", language)))?;
        if canonical == AUTO_DETECT {
            return Ok(AUTO_DETECT.to_string());
        }

        catalog
            .variant_for(canonical, provider)
            .map(str::to_string)
            .ok_or_else(|| {
                let name = catalog
                    .get(canonical)
                    .map(|l| l.display_name.as_str())
                    .unwrap_or(language);
                JobError::InvalidRequest(format!("{} is not available for {}.", name, provider))
            })
    }

    /// Rewrite the request's languages into the codes its provider expects
    async fn resolve_request(&self, request: &mut JobRequest) -> Result<(), JobError> {
        if request.kind == JobKind::LanguageDetection {
            return Ok(());
        }
        request.language = self
            .resolve_language(request.kind, &request.language, &request.provider)
            .await?;
        if let Some(target) = &request.target_language {
            let target = self
                .resolve_language(request.kind, target, &request.provider)
                .await?;
            request.target_language = Some(target);
        }
        Ok(())
    }

    async fn run_job(
        &self,
        mut job: Job,
        mut request: JobRequest,
        cancel: &CancellationToken,
    ) -> Result<JobResult, JobError> {
        if let Err(e) = self.resolve_request(&mut request).await {
            return Err(job.fail(e));
        }

        let prepared = match self.media.prepare(&request.file).await {
            Ok(prepared) => prepared,
            Err(e) => return Err(job.fail(JobError::Media(e.to_string()))),
        };
        let _artifact = TempArtifact::new(&prepared);
        if cancel.is_cancelled() {
            return Err(job.cancel());
        }

        match self.media.duration(&prepared.path).await {
            Ok(duration) => {
                debug!("Media duration {:.1}s", duration.as_secs_f64());
                self.update_active(job.id, |active| {
                    active.duration_seconds = Some(duration.as_secs_f64())
                });
            }
            Err(e) => debug!("Media duration unknown: {}", e),
        }
        request.file = prepared.path.clone();

        if request.kind == JobKind::Transcription && is_auto_detect(&request.language) {
            match self.detect_language(&request, cancel).await {
                Ok(language) => request.language = language,
                Err(JobError::Cancelled) => return Err(job.cancel()),
                Err(e) => return Err(job.fail(e)),
            }
        }

        self.poller.run(&mut job, &request, cancel).await
    }

    /// Run a detection job on the same media and map its answer onto the code the
    /// transcription provider expects.
    async fn detect_language(
        &self,
        request: &JobRequest,
        cancel: &CancellationToken,
    ) -> Result<String, JobError> {
        info!("Detecting language before transcription");
        let detection = JobRequest::language_detection(request.file.clone(), request.provider.clone());
        let mut job = Job::new(JobId::new(), JobKind::LanguageDetection);
        let result = self.poller.run(&mut job, &detection, cancel).await?;

        let detected = result
            .detected_language()
            .ok_or_else(|| JobError::remote(JobKind::LanguageDetection, &[]))?;
        let language = self
            .resolve_language(JobKind::Transcription, detected, &request.provider)
            .await?;
        if is_auto_detect(&language) {
            return Err(JobError::remote(JobKind::LanguageDetection, &[]));
        }

        info!("Detected '{}', transcribing as '{}'", detected, language);
        Ok(language)
    }

    async fn finish_job(&self, id: JobId, outcome: &Result<JobResult, JobError>) {
        lock(&self.cancel_tokens).remove(&id);
        self.publish(|s| {
            s.active_jobs.remove(&id);
        });

        match outcome {
            Ok(_) => self.refresh_credits_quietly().await,
            Err(e) if e.is_cancelled() => {}
            Err(e) => debug!("Job {} ended: {}", id, e.user_message()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{JobStatus, SubmitOutcome};
    use crate::orchestrator::{MediaError, PreparedMedia};
    use crate::session::MemoryTokenCache;
    use crate::testing::FakeApi;
    use async_trait::async_trait;
    use scribeline_languages::ProviderCatalog;
    use serde_json::json;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::Ordering::SeqCst;
    use std::time::Duration;

    /// Copies the input next to it and hands out the copy as a temporary artifact
    struct ExtractingMedia {
        fail: bool,
    }

    #[async_trait]
    impl MediaTool for ExtractingMedia {
        async fn prepare(&self, path: &Path) -> Result<PreparedMedia, MediaError> {
            if self.fail {
                return Err(MediaError::Tool("unsupported container".to_string()));
            }
            let extracted = path.with_extension("extracted.wav");
            std::fs::copy(path, &extracted)?;
            Ok(PreparedMedia {
                path: extracted,
                temporary: true,
            })
        }

        async fn duration(&self, _path: &Path) -> Result<Duration, MediaError> {
            Ok(Duration::from_secs(90))
        }
    }

    struct Fixture {
        api: Arc<FakeApi>,
        orchestrator: Orchestrator,
        _dir: tempfile::TempDir,
        input: PathBuf,
    }

    impl Fixture {
        fn extracted(&self) -> PathBuf {
            self.input.with_extension("extracted.wav")
        }
    }

    fn fixture_with(config: CoreConfig, cache: MemoryTokenCache, media_fails: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("interview.mov");
        std::fs::write(&input, b"mov").unwrap();

        let api = FakeApi::new();
        let orchestrator = Orchestrator::new(
            &config,
            api.clone(),
            Arc::new(cache),
            Arc::new(ExtractingMedia { fail: media_fails }),
        );
        Fixture {
            api,
            orchestrator,
            _dir: dir,
            input,
        }
    }

    async fn logged_in() -> Fixture {
        let f = fixture_with(CoreConfig::default(), MemoryTokenCache::new(), false);
        f.orchestrator
            .login(Credentials::new("ada", "pw"))
            .await
            .unwrap();
        f.api.set_catalogs(JobKind::Transcription, catalogs());
        f
    }

    fn catalogs() -> Vec<ProviderCatalog> {
        vec![
            ProviderCatalog::new("whisper")
                .with_language("en-US", "English (US)")
                .with_language("de", "German"),
            ProviderCatalog::new("speechmatics")
                .with_language("en-GB", "English (UK)")
                .with_language("fr", "French"),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_publishes_session_and_credits() {
        let f = fixture_with(CoreConfig::default(), MemoryTokenCache::new(), false);
        let states = f.orchestrator.subscribe();

        f.orchestrator
            .login(Credentials::new("ada", "pw"))
            .await
            .unwrap();

        let state = states.borrow().clone();
        assert!(state.is_logged_in());
        assert_eq!(state.username.as_deref(), Some("ada"));
        assert_eq!(state.credits.map(|c| c.credits), Some(42.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_login_leaves_logged_out() {
        let f = fixture_with(CoreConfig::default(), MemoryTokenCache::new(), false);
        f.api.set_login_error(Some(ApiError::Authentication {
            status: Some(401),
            message: "Invalid credentials".to_string(),
        }));

        let error = f
            .orchestrator
            .login(Credentials::new("ada", "wrong"))
            .await
            .unwrap_err();

        assert!(error.is_authentication());
        assert_eq!(f.orchestrator.state(), ClientState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_session_reuses_live_cached_token() {
        let f = fixture_with(
            CoreConfig::default(),
            MemoryTokenCache::with_token("cached"),
            false,
        );
        f.api.add_valid_token("cached");

        assert_eq!(f.orchestrator.restore_session(None).await, Ok(true));

        let state = f.orchestrator.state();
        assert_eq!(state.session, SessionStatus::LoggedIn);
        assert_eq!(state.credits.map(|c| c.credits), Some(42.0));
        assert_eq!(f.api.login_calls.load(SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_session_with_nothing_stored() {
        let f = fixture_with(CoreConfig::default(), MemoryTokenCache::new(), false);

        assert_eq!(f.orchestrator.restore_session(None).await, Ok(false));
        assert_eq!(f.api.credits_calls.load(SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_session_logs_in_with_stored_credentials() {
        let f = fixture_with(
            CoreConfig::default(),
            MemoryTokenCache::with_token("expired"),
            false,
        );

        let restored = f
            .orchestrator
            .restore_session(Some(Credentials::new("ada", "pw")))
            .await;

        assert_eq!(restored, Ok(true));
        assert_eq!(f.api.login_calls.load(SeqCst), 1);
        assert_eq!(f.orchestrator.state().username.as_deref(), Some("ada"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_languages_are_consolidated_and_cached() {
        let f = logged_in().await;
        f.api.set_catalogs(JobKind::Transcription, catalogs());

        let catalog = f.orchestrator.languages(JobKind::Transcription).await.unwrap();
        f.orchestrator.languages(JobKind::Transcription).await.unwrap();

        assert_eq!(f.api.catalog_calls.load(SeqCst), 1);
        assert!(catalog.supports("en", "whisper") && catalog.supports("en", "speechmatics"));
        assert_eq!(
            f.orchestrator
                .compatible_providers(JobKind::Transcription, "en-AU")
                .await
                .unwrap(),
            vec!["speechmatics", "whisper"]
        );
        assert_eq!(
            f.orchestrator
                .resolve_language(JobKind::Transcription, "en", "speechmatics")
                .await
                .unwrap(),
            "en-GB"
        );
        assert!(matches!(
            f.orchestrator
                .resolve_language(JobKind::Transcription, "fr", "whisper")
                .await,
            Err(JobError::InvalidRequest(_))
        ));

        f.orchestrator
            .reload_languages(JobKind::Transcription)
            .await
            .unwrap();
        assert_eq!(f.api.catalog_calls.load(SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_languages_fetched_per_configured_provider() {
        let mut config = CoreConfig::default();
        config.providers.insert(
            JobKind::Transcription,
            vec!["whisper".to_string(), "speechmatics".to_string()],
        );
        let f = fixture_with(config, MemoryTokenCache::new(), false);
        f.orchestrator
            .login(Credentials::new("ada", "pw"))
            .await
            .unwrap();
        f.api.set_catalogs(JobKind::Transcription, catalogs());

        let catalog = f.orchestrator.languages(JobKind::Transcription).await.unwrap();

        assert_eq!(f.api.catalog_calls.load(SeqCst), 2);
        assert_eq!(catalog.providers().to_vec(), vec!["whisper", "speechmatics"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_completes_and_removes_temporary_media() {
        let f = logged_in().await;
        f.api.push_status(Ok(JobStatus::completed(json!({"url": "https://x/a.srt"}))));

        let handle = f
            .orchestrator
            .submit(JobRequest::transcription(&f.input, "de", "whisper"))
            .unwrap();
        assert!(f.orchestrator.state().active_jobs.contains_key(&handle.id()));

        let result = handle.outcome().await.unwrap();

        assert_eq!(result.url(), Some("https://x/a.srt"));
        assert_eq!(f.api.submitted()[0].file, f.extracted());
        assert!(!f.extracted().exists());
        assert!(f.input.exists());
        assert!(f.orchestrator.state().active_jobs.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_job_stops_polling_and_removes_temporary_media() {
        let f = logged_in().await;
        let handle = f
            .orchestrator
            .submit(JobRequest::transcription(&f.input, "de", "whisper"))
            .unwrap();
        let id = handle.id();

        tokio::time::sleep(Duration::from_secs(15)).await;
        let active = f.orchestrator.state().active_jobs[&id].clone();
        assert_eq!(active.state, JobState::Pending);
        assert_eq!(active.duration_seconds, Some(90.0));

        assert!(f.orchestrator.cancel(id));
        assert_eq!(handle.outcome().await, Err(JobError::Cancelled));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(f.api.status_calls.load(SeqCst), 1);
        assert!(!f.extracted().exists());
        assert!(!f.orchestrator.cancel(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_cancels_running_jobs() {
        let f = logged_in().await;
        let handle = f
            .orchestrator
            .submit(JobRequest::transcription(&f.input, "de", "whisper"))
            .unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        f.orchestrator.logout();

        assert_eq!(handle.outcome().await, Err(JobError::Cancelled));
        let state = f.orchestrator.state();
        assert_eq!(state.session, SessionStatus::LoggedOut);
        assert!(state.credits.is_none());
        assert!(state.active_jobs.is_empty());
        assert_eq!(f.api.status_calls.load(SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_detect_resolves_provider_variant() {
        let f = logged_in().await;
        f.api.set_catalogs(JobKind::Transcription, catalogs());
        f.api
            .push_submit(Ok(SubmitOutcome::Completed(json!({"language": "en"}))));
        f.api.push_status(Ok(JobStatus::completed(json!({"url": "u"}))));

        let handle = f
            .orchestrator
            .submit(JobRequest::transcription(&f.input, AUTO_DETECT, "whisper"))
            .unwrap();
        handle.outcome().await.unwrap();

        let submitted = f.api.submitted();
        assert_eq!(submitted.len(), 2);
        assert_eq!(submitted[0].kind, JobKind::LanguageDetection);
        assert_eq!(submitted[0].file, f.extracted());
        assert_eq!(submitted[1].kind, JobKind::Transcription);
        assert_eq!(submitted[1].language, "en-US");
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_detect_unsupported_language_fails_job() {
        let f = logged_in().await;
        f.api.set_catalogs(JobKind::Transcription, catalogs());
        f.api
            .push_submit(Ok(SubmitOutcome::Completed(json!({"language": "fr"}))));

        let handle = f
            .orchestrator
            .submit(JobRequest::transcription(&f.input, "auto", "whisper"))
            .unwrap();
        let error = handle.outcome().await.unwrap_err();

        assert_eq!(
            error,
            JobError::InvalidRequest("French is not available for whisper.".to_string())
        );
        assert_eq!(f.api.submit_calls.load(SeqCst), 1);
        assert!(!f.extracted().exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_submitted_languages_use_provider_codes() {
        let f = logged_in().await;
        f.api.set_catalogs(
            JobKind::Translation,
            vec![ProviderCatalog::new("deepl")
                .with_language("de", "German")
                .with_language("en-GB", "English (UK)")],
        );
        f.api
            .push_submit(Ok(SubmitOutcome::Completed(json!({"url": "t"}))));
        f.api
            .push_submit(Ok(SubmitOutcome::Completed(json!({"url": "g"}))));

        f.orchestrator
            .submit(JobRequest::transcription(&f.input, "en", "whisper"))
            .unwrap()
            .outcome()
            .await
            .unwrap();
        f.orchestrator
            .submit(JobRequest::translation(&f.input, "de-AT", "en", "deepl"))
            .unwrap()
            .outcome()
            .await
            .unwrap();

        let submitted = f.api.submitted();
        assert_eq!(submitted[0].language, "en-US");
        assert_eq!(submitted[1].language, "de");
        assert_eq!(submitted[1].target_language.as_deref(), Some("en-GB"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_language_fails_before_media_or_submit() {
        let f = logged_in().await;
        let cases = vec![
            (
                JobRequest::transcription(&f.input, "fr", "whisper"),
                "French is not available for whisper.",
            ),
            (
                JobRequest::transcription(&f.input, "xx", "whisper"),
                "Unknown language 'xx'.",
            ),
        ];

        for (request, message) in cases {
            let handle = f.orchestrator.submit(request).unwrap();
            let mut states = handle.subscribe();
            let error = handle.outcome().await.unwrap_err();

            assert_eq!(error, JobError::InvalidRequest(message.to_string()));
            assert_eq!(*states.borrow_and_update(), JobState::Error);
        }
        assert_eq!(f.api.submit_calls.load(SeqCst), 0);
        assert!(!f.extracted().exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_media_failure_fails_job_without_submitting() {
        let f = fixture_with(CoreConfig::default(), MemoryTokenCache::new(), true);
        f.orchestrator
            .login(Credentials::new("ada", "pw"))
            .await
            .unwrap();
        f.api.set_catalogs(JobKind::Transcription, catalogs());

        let handle = f
            .orchestrator
            .submit(JobRequest::transcription(&f.input, "de", "whisper"))
            .unwrap();
        let mut states = handle.subscribe();
        let error = handle.outcome().await.unwrap_err();

        assert!(matches!(error, JobError::Media(_)));
        assert_eq!(*states.borrow_and_update(), JobState::Error);
        assert_eq!(f.api.submit_calls.load(SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_validates_request() {
        let f = logged_in().await;
        let mut missing_target = JobRequest::translation(&f.input, "de", "en", "deepl");
        missing_target.target_language = None;

        let cases = vec![
            JobRequest::transcription(&f.input, "de", " "),
            missing_target,
            JobRequest::translation(&f.input, "de", "auto", "deepl"),
        ];

        for request in cases {
            assert!(matches!(
                f.orchestrator.submit(request),
                Err(JobError::InvalidRequest(_))
            ));
        }
        assert!(f.orchestrator.state().active_jobs.is_empty());
    }
}
