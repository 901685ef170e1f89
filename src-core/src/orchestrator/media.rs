//! Boundary to the external media tool (demuxing, audio extraction, probing).

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Media file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Media tool failed: {0}")]
    Tool(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A file ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedMedia {
    pub path: PathBuf,
    /// Created by the tool; the caller deletes it when the job ends
    pub temporary: bool,
}

#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Turn a user-selected file into something the service accepts
    async fn prepare(&self, path: &Path) -> Result<PreparedMedia, MediaError>;

    async fn duration(&self, path: &Path) -> Result<Duration, MediaError>;
}

/// Uploads files as they are
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughMedia;

#[async_trait]
impl MediaTool for PassthroughMedia {
    async fn prepare(&self, path: &Path) -> Result<PreparedMedia, MediaError> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(PreparedMedia {
                path: path.to_path_buf(),
                temporary: false,
            }),
            Ok(_) => Err(MediaError::NotFound(path.to_path_buf())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(MediaError::NotFound(path.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn duration(&self, _path: &Path) -> Result<Duration, MediaError> {
        Err(MediaError::Tool("no media probe configured".to_string()))
    }
}

/// Deletes a temporary artifact when dropped, on every exit path of a job
#[derive(Debug)]
pub(crate) struct TempArtifact {
    path: Option<PathBuf>,
}

impl TempArtifact {
    pub(crate) fn new(media: &PreparedMedia) -> Self {
        Self {
            path: media.temporary.then(|| media.path.clone()),
        }
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match std::fs::remove_file(&path) {
            Ok(()) => debug!("Removed temporary media {:?}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove temporary media {:?}: {}", path, e),
        }
    }
}
