mod facade;
mod media;
mod state;

pub use facade::{JobHandle, Orchestrator};
pub use media::{MediaError, MediaTool, PassthroughMedia, PreparedMedia};
pub use state::{ActiveJob, ClientState, SessionStatus};
