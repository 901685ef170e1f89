use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::clients::{Credits, JobKind};
use crate::jobs::{JobId, JobState};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    #[default]
    LoggedOut,
    Authenticating,
    LoggedIn,
}

/// A job the user is waiting on
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveJob {
    pub kind: JobKind,
    pub file: PathBuf,
    pub state: JobState,
    /// Media length, when the media tool could tell
    pub duration_seconds: Option<f64>,
}

/// Everything the UI renders about the session, published as one value
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientState {
    pub session: SessionStatus,
    pub username: Option<String>,
    pub credits: Option<Credits>,
    pub active_jobs: BTreeMap<JobId, ActiveJob>,
}

impl ClientState {
    pub fn is_logged_in(&self) -> bool {
        self.session == SessionStatus::LoggedIn
    }
}
