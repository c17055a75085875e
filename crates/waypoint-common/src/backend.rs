use crate::error::backend_error::BackendError;
use crate::locator::Locator;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct NavigationResult {
    pub url: String,
    pub title: String,
    pub status: u16, // generic status code (e.g. 200)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Options applied when a backend allocates its browser context.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    /// Delay inserted before every element action.
    pub slow_mo: Duration,
    pub viewport: Viewport,
    /// Quiet window required before the network counts as idle.
    pub network_quiet: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            slow_mo: Duration::ZERO,
            viewport: Viewport::default(),
            network_quiet: Duration::from_millis(500),
        }
    }
}

/// A live element found by [`Backend::query_interactable`].
///
/// `reference` is opaque to the engine; only the backend that produced it can act on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementHandle {
    pub reference: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ElementHandle {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            tag: String::new(),
            text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    /// Replace the element's value with the payload.
    Fill,
    /// Press the key named by the payload (e.g. `Enter`).
    Press,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Click => write!(f, "click"),
            ActionKind::Fill => write!(f, "fill"),
            ActionKind::Press => write!(f, "press"),
        }
    }
}

/// The contract the orchestration engine requires from a browser engine.
///
/// Each call is assumed reliable but latency-variable; all waiting policy lives in the engine.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Allocate the browser context (start browser, open page, apply viewport).
    async fn launch(&mut self, options: &LaunchOptions) -> Result<(), BackendError>;

    /// Release the browser context and every resource bound to it.
    async fn close(&mut self) -> Result<(), BackendError>;

    /// Check if the backend is ready to accept commands.
    async fn is_ready(&self) -> bool;

    /// Navigate to a specific URL.
    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, BackendError>;

    /// Return the first element matched by `locator` that is attached, visible,
    /// unobscured and enabled, or `None` when no match is interactable right now.
    async fn query_interactable(
        &mut self,
        locator: &Locator,
    ) -> Result<Option<ElementHandle>, BackendError>;

    /// Perform an action on a previously resolved element.
    async fn act(
        &mut self,
        element: &ElementHandle,
        kind: ActionKind,
        payload: Option<&str>,
    ) -> Result<(), BackendError>;

    /// Wait until no network request has been in flight for the quiet window.
    /// Returns `false` when `timeout` elapsed first.
    async fn wait_for_network_idle(&mut self, timeout: Duration) -> Result<bool, BackendError>;

    /// Capture a screenshot of the current viewport.
    async fn screenshot(&mut self) -> Result<Vec<u8>, BackendError>;

    /// Start recording the page into `dir`.
    async fn start_video_recording(
        &mut self,
        _dir: &Path,
        _size: Viewport,
    ) -> Result<(), BackendError> {
        Err(BackendError::NotSupported("start_video_recording".into()))
    }

    /// Stop recording and flush it; returns where the recording was written.
    async fn stop_video_recording(&mut self) -> Result<Option<PathBuf>, BackendError> {
        Ok(None)
    }

    /// Remove every cookie from the browser context.
    async fn clear_cookies(&mut self) -> Result<(), BackendError> {
        Err(BackendError::NotSupported("clear_cookies".into()))
    }

    /// Visible text of a resolved element.
    async fn text_content(&mut self, element: &ElementHandle) -> Result<String, BackendError>;

    /// Number of elements matched by `locator`, interactable or not.
    async fn count(&mut self, _locator: &Locator) -> Result<usize, BackendError> {
        Err(BackendError::NotSupported("count".into()))
    }

    async fn current_url(&mut self) -> Result<String, BackendError>;

    async fn title(&mut self) -> Result<String, BackendError>;
}
