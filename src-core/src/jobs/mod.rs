mod error;
mod poller;
mod state;

pub use error::{JobError, JobResult};
pub use poller::JobPoller;
pub use state::{
    Job, JobEvent, JobId, JobState, PollingSettings, TransitionRejection, TransitionResult,
};
