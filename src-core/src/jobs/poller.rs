use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::clients::{ErrorCategory, JobRequest, JobStatus, RemoteStatus, SubmitOutcome};
use crate::session::SessionManager;

use super::error::{JobError, JobResult};
use super::state::{Job, JobEvent, PollingSettings};

/// Drives jobs from submission to a terminal state.
///
/// Checks for one job are strictly sequential: the next one is scheduled only after
/// the previous call resolved. Every call goes through [`SessionManager::call`], so a
/// token that expires mid-job is renewed without losing the job.
#[derive(Clone)]
pub struct JobPoller {
    session: SessionManager,
    settings: watch::Receiver<PollingSettings>,
}

impl JobPoller {
    pub fn new(session: SessionManager, settings: watch::Receiver<PollingSettings>) -> Self {
        Self { session, settings }
    }

    fn settings(&self) -> PollingSettings {
        *self.settings.borrow()
    }

    /// Submit `request` and follow it until it completes, fails, times out or is
    /// cancelled. Cancelling never aborts a call already in flight; its answer is
    /// dropped when it arrives.
    pub async fn run(
        &self,
        job: &mut Job,
        request: &JobRequest,
        cancel: &CancellationToken,
    ) -> Result<JobResult, JobError> {
        if cancel.is_cancelled() {
            return Err(job.cancel());
        }

        info!("Submitting {} job {} ({})", job.kind, job.id, request.file.display());
        job.submitted_at = Instant::now();
        let submitted = self
            .session
            .call(|api, token| async move { api.submit(&token, request).await })
            .await;

        if cancel.is_cancelled() {
            return Err(job.cancel());
        }

        let correlation_id = match submitted {
            Ok(SubmitOutcome::Completed(data)) => {
                info!("{} job {} completed on submission", job.kind, job.id);
                return Ok(job.complete(data));
            }
            Ok(SubmitOutcome::Accepted { correlation_id }) => correlation_id,
            Ok(SubmitOutcome::Failed(errors)) => {
                return Err(job.fail(JobError::remote(job.kind, &errors)));
            }
            Err(e) => return Err(job.fail(e.into())),
        };

        debug!("Job {} accepted as '{}'", job.id, correlation_id);
        job.correlation_id = Some(correlation_id.clone());
        self.poll(job, &correlation_id, cancel).await
    }

    async fn poll(
        &self,
        job: &mut Job,
        correlation_id: &str,
        cancel: &CancellationToken,
    ) -> Result<JobResult, JobError> {
        loop {
            if !self.wait_for_next_check(cancel).await {
                return Err(job.cancel());
            }

            let checked = self
                .session
                .call(|api, token| async move { api.status(&token, correlation_id).await })
                .await;

            if cancel.is_cancelled() {
                debug!("Discarding status of cancelled job {}", job.id);
                return Err(job.cancel());
            }

            match checked {
                Ok(JobStatus {
                    status,
                    data,
                    errors,
                }) => match status {
                    RemoteStatus::Completed => {
                        info!("{} job {} completed", job.kind, job.id);
                        return Ok(job.complete(data.unwrap_or_default()));
                    }
                    RemoteStatus::Error => {
                        return Err(job.fail(JobError::remote(job.kind, &errors)));
                    }
                    RemoteStatus::Timeout => {
                        warn!("Service gave up on job {}", job.id);
                        return Err(job.expire());
                    }
                    RemoteStatus::Created | RemoteStatus::Pending => {
                        job.transition(JobEvent::Poll);
                    }
                },
                // The remote job keeps running while we are offline
                Err(e) if e.category() == ErrorCategory::NetworkError => {
                    warn!("Status of job {} unavailable, checking again later: {}", job.id, e);
                }
                Err(e) => {
                    warn!("Status check for job {} failed: {}", job.id, e);
                    return Err(job.fail(e.into()));
                }
            }

            let timeout = self.settings().timeout();
            if job.elapsed() >= timeout {
                warn!(
                    "Job {} still pending after {}s, giving up",
                    job.id,
                    job.elapsed().as_secs()
                );
                return Err(job.expire());
            }
        }
    }

    /// Sleep one polling interval, measured from now. An interval change while waiting
    /// reschedules the check. Returns false if cancelled first.
    async fn wait_for_next_check(&self, cancel: &CancellationToken) -> bool {
        let mut settings = self.settings.clone();
        let from = Instant::now();
        loop {
            let deadline = from + settings.borrow_and_update().interval();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep_until(deadline) => return true,
                Ok(()) = settings.changed() => debug!("Polling interval changed"),
            }
        }
    }
}
