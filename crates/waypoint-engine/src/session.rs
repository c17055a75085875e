//! Isolated browser sessions, one per journey run.
//!
//! A [`Session`] owns its backend exclusively. [`SessionManager::close`] consumes
//! it, so a session can be released at most once and never used afterwards.

use crate::config::WaypointConfig;
use crate::error::JourneyError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info, warn};
use waypoint_common::backend::{Backend, LaunchOptions};
use waypoint_common::error::backend_error::BackendError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to allocate session {id}: {reason}")]
    Allocation { id: String, reason: String },
    #[error("Failed to release session {id}: {}", .reasons.join("; "))]
    Teardown { id: String, reasons: Vec<String> },
    #[error("Artifact IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

impl From<SessionError> for JourneyError {
    fn from(err: SessionError) -> Self {
        JourneyError::SessionAllocationFailed {
            reason: err.to_string(),
        }
    }
}

/// Creates a fresh, unlaunched backend for every session.
pub trait BackendFactory: Send + Sync {
    fn create(&self) -> Box<dyn Backend>;
}

impl<F> BackendFactory for F
where
    F: Fn() -> Box<dyn Backend> + Send + Sync,
{
    fn create(&self) -> Box<dyn Backend> {
        self()
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub launch: LaunchOptions,
    /// Each session writes under `<artifact_root>/<session id>/`.
    pub artifact_root: PathBuf,
    pub default_timeout: Duration,
    pub record_video: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_config(&WaypointConfig::default())
    }
}

impl SessionConfig {
    pub fn from_config(config: &WaypointConfig) -> Self {
        Self {
            launch: config.launch_options(),
            artifact_root: config.artifacts.dir.clone(),
            default_timeout: config.default_timeout(),
            record_video: config.artifacts.record_video,
        }
    }
}

/// Files a session left behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionArtifacts {
    pub session_id: String,
    pub artifact_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<PathBuf>,
    #[serde(default)]
    pub screenshots: Vec<PathBuf>,
}

pub struct Session {
    id: String,
    artifact_dir: PathBuf,
    default_timeout: Duration,
    backend: Box<dyn Backend>,
    video_dir: Option<PathBuf>,
    screenshots: Vec<PathBuf>,
    released: bool,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn is_recording(&self) -> bool {
        self.video_dir.is_some()
    }

    pub fn backend(&mut self) -> &mut dyn Backend {
        self.backend.as_mut()
    }

    /// Write a PNG of the current viewport into the session's artifact directory.
    pub async fn capture_screenshot(&mut self, label: &str) -> Result<PathBuf, SessionError> {
        let bytes = self.backend.screenshot().await?;
        let path = self.artifact_dir.join(format!(
            "{:02}-{}.png",
            self.screenshots.len() + 1,
            label
        ));
        tokio::fs::write(&path, &bytes).await?;
        info!(
            "Saved screenshot {} ({} bytes)",
            path.display(),
            bytes.len()
        );
        self.screenshots.push(path.clone());
        Ok(path)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.released {
            warn!("Session {} dropped without being closed", self.id);
        }
    }
}

pub struct SessionManager {
    factory: Box<dyn BackendFactory>,
    opened: AtomicU64,
    live: AtomicUsize,
}

impl SessionManager {
    pub fn new(factory: impl BackendFactory + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            opened: AtomicU64::new(0),
            live: AtomicUsize::new(0),
        }
    }

    /// Sessions opened and not yet closed.
    pub fn live_sessions(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Allocate a fresh, cookie-cleared browser context with recording running
    /// before anything navigates.
    pub async fn open(&self, config: &SessionConfig) -> Result<Session, SessionError> {
        let sequence = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        let id = session_id(sequence);
        let allocation = |reason: String| SessionError::Allocation {
            id: id.clone(),
            reason,
        };

        let artifact_dir = config.artifact_root.join(&id);
        tokio::fs::create_dir_all(&artifact_dir)
            .await
            .map_err(|e| allocation(format!("artifact dir {}: {}", artifact_dir.display(), e)))?;

        let mut backend = self.factory.create();
        if let Err(e) = backend.launch(&config.launch).await {
            release_quietly(backend.as_mut(), &id).await;
            return Err(allocation(format!("launch: {}", e)));
        }

        match backend.clear_cookies().await {
            Ok(()) => {}
            Err(e) if e.is_not_supported() => debug!("Backend cannot clear cookies: {}", e),
            Err(e) => {
                release_quietly(backend.as_mut(), &id).await;
                return Err(allocation(format!("clear cookies: {}", e)));
            }
        }

        let mut video_dir = None;
        if config.record_video {
            let dir = artifact_dir.join("video");
            if let Err(e) = tokio::fs::create_dir_all(&dir).await {
                release_quietly(backend.as_mut(), &id).await;
                return Err(allocation(format!("video dir {}: {}", dir.display(), e)));
            }
            match backend
                .start_video_recording(&dir, config.launch.viewport)
                .await
            {
                Ok(()) => video_dir = Some(dir),
                Err(e) if e.is_not_supported() => {
                    warn!("Session {} runs without video: {}", id, e)
                }
                Err(e) => {
                    release_quietly(backend.as_mut(), &id).await;
                    return Err(allocation(format!("start recording: {}", e)));
                }
            }
        }

        self.live.fetch_add(1, Ordering::SeqCst);
        info!("Opened session {} ({})", id, artifact_dir.display());

        Ok(Session {
            id,
            artifact_dir,
            default_timeout: config.default_timeout,
            backend,
            video_dir,
            screenshots: Vec::new(),
            released: false,
        })
    }

    /// Stop recording and release the browser context. Both are attempted
    /// whatever the journey outcome and whatever the other one returned.
    pub async fn close(&self, mut session: Session) -> Result<SessionArtifacts, SessionError> {
        let mut reasons = Vec::new();
        let mut video = None;

        if let Some(dir) = session.video_dir.take() {
            match session.backend.stop_video_recording().await {
                Ok(path) => video = Some(path.unwrap_or(dir)),
                Err(e) => reasons.push(format!("stop recording: {}", e)),
            }
        }

        if let Err(e) = session.backend.close().await {
            reasons.push(format!("close backend: {}", e));
        }

        session.released = true;
        self.live.fetch_sub(1, Ordering::SeqCst);

        if !reasons.is_empty() {
            warn!("Session {} released with errors: {:?}", session.id, reasons);
            return Err(SessionError::Teardown {
                id: session.id.clone(),
                reasons,
            });
        }

        info!("Closed session {}", session.id);
        Ok(SessionArtifacts {
            session_id: session.id.clone(),
            artifact_dir: session.artifact_dir.clone(),
            video,
            screenshots: std::mem::take(&mut session.screenshots),
        })
    }
}

async fn release_quietly(backend: &mut dyn Backend, id: &str) {
    if let Err(e) = backend.close().await {
        debug!("Releasing half-open session {} failed: {}", id, e);
    }
}

fn session_id(sequence: u64) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("session-{}-{}-{}", std::process::id(), nanos, sequence)
}
