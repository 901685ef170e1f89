//! Job State Machine - a job only ever moves forward
//!
//! State diagram:
//! ```text
//! Created ──Poll──> Pending ──Poll──> Pending
//!    │                 │
//!    │        [Complete | Fail | Expire | Cancel]
//!    │                 ↓
//!    └──────> Completed | Error | Timeout | Cancelled   (terminal)
//! ```
//!
//! `Created` goes straight to `Completed` when the submission answered inline.

use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;
use uuid::Uuid;

use crate::clients::JobKind;

use super::error::{JobError, JobResult};

/// Local identifier of a job, assigned before the service has seen it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum JobEvent {
    /// A status check reported the job as still running
    Poll,
    /// Final payload received
    Complete,
    /// The provider reported a failure, or a call failed for good
    Fail,
    /// Polling budget exhausted
    Expire,
    /// User-initiated cancellation
    Cancel,
}

/// Job states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum JobState {
    /// Submitted, no status check yet
    Created,
    /// Waiting on the service
    Pending,
    Completed,
    Error,
    Timeout,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Created | Self::Pending)
    }
}

/// Result of a successful state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionResult {
    Changed { from: JobState, to: JobState },
    /// Event was valid but state didn't change
    Unchanged,
}

/// Reason a transition was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{attempted_event} event rejected in {current_state} state")]
pub struct TransitionRejection {
    pub current_state: JobState,
    pub attempted_event: JobEvent,
}

fn compute_transition(current: JobState, event: JobEvent) -> Option<JobState> {
    use JobEvent::*;
    use JobState::*;

    match (current, event) {
        (Created | Pending, Poll) => Some(Pending),
        (Created | Pending, Complete) => Some(Completed),
        (Created | Pending, Fail) => Some(Error),
        (Created | Pending, Expire) => Some(Timeout),
        (Created | Pending, Cancel) => Some(Cancelled),

        // Terminal states accept nothing
        (Completed | Error | Timeout | Cancelled, _) => None,
    }
}

/// Poll timing. Read fresh before every scheduled check, so changes apply mid-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingSettings {
    interval: Duration,
    timeout: Duration,
}

impl PollingSettings {
    const MIN_INTERVAL: Duration = Duration::from_secs(1);

    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval: interval.max(Self::MIN_INTERVAL),
            timeout,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// A submitted job. Mutated only by the poller; the state is also published to
/// any number of watchers.
#[derive(Debug)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub correlation_id: Option<String>,
    pub submitted_at: Instant,
    pub last_error: Option<String>,
    pub result: Option<Value>,
    state: watch::Sender<JobState>,
}

impl Job {
    pub fn new(id: JobId, kind: JobKind) -> Self {
        Self {
            id,
            kind,
            correlation_id: None,
            submitted_at: Instant::now(),
            last_error: None,
            result: None,
            state: watch::Sender::new(JobState::Created),
        }
    }

    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.state.subscribe()
    }

    pub fn elapsed(&self) -> Duration {
        self.submitted_at.elapsed()
    }

    /// Attempt a state transition. The only way to change state.
    pub fn apply(&mut self, event: JobEvent) -> Result<TransitionResult, TransitionRejection> {
        let current = self.state();
        match compute_transition(current, event) {
            Some(next) if next == current => Ok(TransitionResult::Unchanged),
            Some(next) => {
                self.state.send_replace(next);
                Ok(TransitionResult::Changed {
                    from: current,
                    to: next,
                })
            }
            None => Err(TransitionRejection {
                current_state: current,
                attempted_event: event,
            }),
        }
    }

    /// Apply `event`, logging instead of failing on a rejected transition
    pub(crate) fn transition(&mut self, event: JobEvent) {
        match self.apply(event) {
            Ok(TransitionResult::Changed { from, to }) => {
                debug!("Job {}: {} -> {}", self.id, from, to);
            }
            Ok(TransitionResult::Unchanged) => {}
            Err(rejection) => warn!("Job {}: {}", self.id, rejection),
        }
    }

    pub(crate) fn complete(&mut self, data: Value) -> JobResult {
        self.transition(JobEvent::Complete);
        self.result = Some(data.clone());
        JobResult {
            job_id: self.id,
            kind: self.kind,
            correlation_id: self.correlation_id.clone(),
            data,
        }
    }

    pub(crate) fn fail(&mut self, error: JobError) -> JobError {
        warn!("{} job {} failed: {}", self.kind, self.id, error);
        self.transition(JobEvent::Fail);
        self.last_error = Some(error.user_message());
        error
    }

    pub(crate) fn expire(&mut self) -> JobError {
        self.transition(JobEvent::Expire);
        let error = JobError::Timeout {
            kind: self.kind,
            elapsed: self.elapsed(),
        };
        self.last_error = Some(error.user_message());
        error
    }

    pub(crate) fn cancel(&mut self) -> JobError {
        info!("Job {} cancelled", self.id);
        self.transition(JobEvent::Cancel);
        self.last_error = Some(JobError::Cancelled.user_message());
        JobError::Cancelled
    }
}
