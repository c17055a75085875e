use crate::cdp::CdpClient;
use crate::query::{self, Reply, locator_spec, reference_selector};
use crate::recorder::ScreencastRecorder;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::ClearBrowserCookiesParams;
use chromiumoxide::element::Element;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use waypoint_common::backend::{
    ActionKind, Backend, ElementHandle, LaunchOptions, NavigationResult, Viewport,
};
use waypoint_common::{BackendError, Locator};

/// Chromium driven over the DevTools protocol; one browser per backend.
pub struct HeadlessBackend {
    client: Option<CdpClient>,
    recorder: Option<ScreencastRecorder>,
    slow_mo: Duration,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            client: None,
            recorder: None,
            slow_mo: Duration::ZERO,
        }
    }

    fn client(&self) -> Result<&CdpClient, BackendError> {
        self.client.as_ref().ok_or(BackendError::NotReady)
    }

    async fn navigation_result(client: &CdpClient) -> Result<NavigationResult, BackendError> {
        let title = client
            .page
            .get_title()
            .await
            .unwrap_or_default()
            .unwrap_or_default();
        let url = client
            .page
            .url()
            .await
            .map_err(|e| BackendError::Navigation(e.to_string()))?
            .unwrap_or_default();
        Ok(NavigationResult {
            url,
            title,
            status: 200,
        })
    }

    async fn element(&self, handle: &ElementHandle) -> Result<Element, BackendError> {
        let client = self.client()?;
        client
            .page
            .find_element(reference_selector(&handle.reference))
            .await
            .map_err(|_| BackendError::ElementStale {
                reference: handle.reference.clone(),
            })
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn not_interactable(handle: &ElementHandle, e: impl std::fmt::Display) -> BackendError {
    BackendError::ElementNotInteractable {
        reference: handle.reference.clone(),
        reason: e.to_string(),
    }
}

fn unexpected(reply: Reply) -> BackendError {
    BackendError::ScriptError(format!("unexpected reply from query script: {:?}", reply))
}

#[async_trait]
impl Backend for HeadlessBackend {
    async fn launch(&mut self, options: &LaunchOptions) -> Result<(), BackendError> {
        info!("Launching Headless Backend (Chromium)...");
        self.slow_mo = options.slow_mo;
        self.client = Some(CdpClient::launch(options).await?);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        if let Some(recorder) = self.recorder.take() {
            let dir = recorder.abandon();
            tracing::warn!("Closing while still recording into {}", dir.display());
        }
        if let Some(client) = self.client.take() {
            client.close().await?;
        }
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        self.client.is_some()
    }

    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, BackendError> {
        let client = self.client()?;

        info!("Navigating to: {}", url);
        client
            .page
            .goto(url)
            .await
            .map_err(|e| BackendError::Navigation(e.to_string()))?;

        Self::navigation_result(client).await
    }

    async fn query_interactable(
        &mut self,
        locator: &Locator,
    ) -> Result<Option<ElementHandle>, BackendError> {
        let client = self.client()?;
        match query::call(&client.page, "query", &locator_spec(locator)).await? {
            Reply::Found {
                reference,
                tag,
                text,
            } => Ok(Some(ElementHandle {
                reference,
                tag,
                text,
            })),
            Reply::Missing => Ok(None),
            Reply::Invalid { message } => {
                tracing::debug!("Selector {} rejected: {}", locator, message);
                Err(BackendError::SelectorInvalid {
                    selector: locator.to_string(),
                })
            }
            other => Err(unexpected(other)),
        }
    }

    async fn act(
        &mut self,
        handle: &ElementHandle,
        kind: ActionKind,
        payload: Option<&str>,
    ) -> Result<(), BackendError> {
        if !self.slow_mo.is_zero() {
            tokio::time::sleep(self.slow_mo).await;
        }

        let element = self.element(handle).await?;
        match kind {
            ActionKind::Click => {
                element
                    .click()
                    .await
                    .map_err(|e| not_interactable(handle, e))?;
            }
            ActionKind::Fill => {
                let value = payload.ok_or_else(|| {
                    BackendError::InvalidRequest("fill requires a value".into())
                })?;
                let client = self.client()?;
                match query::call(&client.page, "clear", &json!(handle.reference)).await? {
                    Reply::Ok => {}
                    Reply::Stale => {
                        return Err(BackendError::ElementStale {
                            reference: handle.reference.clone(),
                        });
                    }
                    other => return Err(unexpected(other)),
                }
                element
                    .focus()
                    .await
                    .map_err(|e| not_interactable(handle, e))?;
                element
                    .type_str(value)
                    .await
                    .map_err(|e| not_interactable(handle, e))?;
            }
            ActionKind::Press => {
                let key = payload.ok_or_else(|| {
                    BackendError::InvalidRequest("press requires a key name".into())
                })?;
                element
                    .press_key(key)
                    .await
                    .map_err(|e| not_interactable(handle, e))?;
            }
        }
        Ok(())
    }

    async fn wait_for_network_idle(&mut self, timeout: Duration) -> Result<bool, BackendError> {
        let client = self.client()?;
        Ok(client.network.wait_for_idle(timeout).await)
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BackendError> {
        let client = self.client()?;
        client
            .page
            .screenshot(chromiumoxide::page::ScreenshotParams::builder().build())
            .await
            .map_err(|e| BackendError::Other(format!("Screenshot failed: {}", e)))
    }

    async fn start_video_recording(
        &mut self,
        dir: &Path,
        size: Viewport,
    ) -> Result<(), BackendError> {
        if self.recorder.is_some() {
            return Err(BackendError::Recording("already recording".into()));
        }
        let client = self.client()?;
        let recorder = ScreencastRecorder::start(&client.page, dir, size).await?;
        self.recorder = Some(recorder);
        Ok(())
    }

    async fn stop_video_recording(&mut self) -> Result<Option<PathBuf>, BackendError> {
        let Some(recorder) = self.recorder.take() else {
            return Ok(None);
        };
        match self.client.as_ref() {
            Some(client) => recorder.stop(&client.page).await.map(Some),
            None => Ok(Some(recorder.abandon())),
        }
    }

    async fn clear_cookies(&mut self) -> Result<(), BackendError> {
        let client = self.client()?;
        client
            .page
            .execute(ClearBrowserCookiesParams::default())
            .await
            .map_err(|e| BackendError::Other(format!("Clear cookies failed: {}", e)))?;
        Ok(())
    }

    async fn text_content(&mut self, handle: &ElementHandle) -> Result<String, BackendError> {
        let client = self.client()?;
        match query::call(&client.page, "text", &json!(handle.reference)).await? {
            Reply::Text { text } => Ok(text),
            Reply::Stale => Err(BackendError::ElementStale {
                reference: handle.reference.clone(),
            }),
            other => Err(unexpected(other)),
        }
    }

    async fn count(&mut self, locator: &Locator) -> Result<usize, BackendError> {
        let client = self.client()?;
        match query::call(&client.page, "count", &locator_spec(locator)).await? {
            Reply::Count { count } => Ok(count),
            Reply::Invalid { .. } => Err(BackendError::SelectorInvalid {
                selector: locator.to_string(),
            }),
            other => Err(unexpected(other)),
        }
    }

    async fn current_url(&mut self) -> Result<String, BackendError> {
        let client = self.client()?;
        Ok(Self::navigation_result(client).await?.url)
    }

    async fn title(&mut self) -> Result<String, BackendError> {
        let client = self.client()?;
        Ok(Self::navigation_result(client).await?.title)
    }
}
