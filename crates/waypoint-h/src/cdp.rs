use crate::network::NetworkTracker;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EventConsoleApiCalled;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use waypoint_common::BackendError;
use waypoint_common::backend::LaunchOptions;

/// One browser process with one page, owned by one session.
pub struct CdpClient {
    pub browser: Browser,
    pub page: Page,
    pub network: NetworkTracker,
    handler_task: JoinHandle<()>,
    listeners: Vec<JoinHandle<()>>,
    user_data_dir: PathBuf,
    cleanup_user_data_dir: bool,
}

fn launch_error(context: &str, e: impl std::fmt::Display) -> BackendError {
    BackendError::Launch(format!("{}: {}", context, e))
}

impl CdpClient {
    pub async fn launch(options: &LaunchOptions) -> Result<Self, BackendError> {
        let mut config_builder = BrowserConfig::builder();
        config_builder = config_builder.no_sandbox(); // Often needed in docker/CI/restricted envs
        let (user_data_dir, cleanup_user_data_dir) = resolve_user_data_dir()?;
        config_builder = config_builder
            .user_data_dir(&user_data_dir)
            .window_size(options.viewport.width, options.viewport.height);

        if options.headless {
            tracing::info!("Launching browser in headless mode");
        } else {
            tracing::info!("Launching browser in headed mode");
            config_builder = config_builder.with_head();
        }

        if let Ok(chrome_bin) = std::env::var("CHROME_BIN") {
            tracing::info!("Using custom Chrome binary: {}", chrome_bin);
            config_builder = config_builder.chrome_executable(chrome_bin);
        }

        let config = config_builder
            .build()
            .map_err(|e| launch_error("Failed to build browser config", e))?;
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| launch_error("Failed to launch browser", e))?;

        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if let Err(e) = h {
                    tracing::error!("Browser handler error (ignoring): {}", e);
                    continue;
                }
            }
            tracing::debug!("Browser handler task ended");
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                handler_task.abort();
                return Err(launch_error("Failed to create page", e));
            }
        };

        let network = NetworkTracker::new(options.network_quiet);
        let mut client = Self {
            browser,
            page,
            network,
            handler_task,
            listeners: Vec::new(),
            user_data_dir,
            cleanup_user_data_dir,
        };

        if let Err(e) = client.prepare_page(options).await {
            let _ = client.close().await;
            return Err(e);
        }
        Ok(client)
    }

    async fn prepare_page(&mut self, options: &LaunchOptions) -> Result<(), BackendError> {
        let viewport = options.viewport;
        self.page
            .execute(SetDeviceMetricsOverrideParams::new(
                i64::from(viewport.width),
                i64::from(viewport.height),
                1.0,
                false,
            ))
            .await
            .map_err(|e| launch_error("Failed to apply viewport", e))?;

        self.listen_console().await?;
        self.listen_dialogs().await?;
        self.listen_network().await?;
        Ok(())
    }

    async fn listen_console(&mut self) -> Result<(), BackendError> {
        let mut console_events = self
            .page
            .event_listener::<EventConsoleApiCalled>()
            .await
            .map_err(|e| launch_error("Failed to subscribe to console events", e))?;

        self.listeners.push(tokio::spawn(async move {
            while let Some(event) = console_events.next().await {
                let args_str: Vec<String> = event
                    .args
                    .iter()
                    .map(|arg| {
                        arg.description
                            .clone()
                            .or_else(|| arg.value.as_ref().map(|v| v.to_string()))
                            .unwrap_or_else(|| "unknown".to_string())
                    })
                    .collect();
                tracing::debug!(
                    "Browser Console [{:?}]: {}",
                    event.r#type,
                    args_str.join(" ")
                );
            }
        }));
        Ok(())
    }

    /// Alerts, confirms and prompts are accepted so they never block a step.
    async fn listen_dialogs(&mut self) -> Result<(), BackendError> {
        let mut dialog_events = self
            .page
            .event_listener::<EventJavascriptDialogOpening>()
            .await
            .map_err(|e| launch_error("Failed to subscribe to dialog events", e))?;

        let page = self.page.clone();
        self.listeners.push(tokio::spawn(async move {
            while let Some(event) = dialog_events.next().await {
                tracing::info!(
                    "Accepting JavaScript dialog: {} ({:?})",
                    event.message,
                    event.r#type
                );
                if let Err(e) = page.execute(HandleJavaScriptDialogParams::new(true)).await {
                    tracing::warn!("Failed to accept dialog: {}", e);
                }
            }
        }));
        Ok(())
    }

    async fn listen_network(&mut self) -> Result<(), BackendError> {
        self.page
            .execute(EnableParams::default())
            .await
            .map_err(|e| launch_error("Failed to enable network domain", e))?;

        let mut sent = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(|e| launch_error("Failed to subscribe to network events", e))?;
        let mut finished = self
            .page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(|e| launch_error("Failed to subscribe to network events", e))?;
        let mut failed = self
            .page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(|e| launch_error("Failed to subscribe to network events", e))?;

        let tracker = self.network.clone();
        self.listeners.push(tokio::spawn(async move {
            while let Some(event) = sent.next().await {
                tracker.started(event.request_id.inner());
            }
        }));
        let tracker = self.network.clone();
        self.listeners.push(tokio::spawn(async move {
            while let Some(event) = finished.next().await {
                tracker.finished(event.request_id.inner());
            }
        }));
        let tracker = self.network.clone();
        self.listeners.push(tokio::spawn(async move {
            while let Some(event) = failed.next().await {
                tracker.finished(event.request_id.inner());
            }
        }));
        Ok(())
    }

    pub async fn close(mut self) -> Result<(), BackendError> {
        for listener in self.listeners.drain(..) {
            listener.abort();
        }

        let closed = self
            .browser
            .close()
            .await
            .map_err(|e| BackendError::Other(format!("Error closing browser: {}", e)));
        if closed.is_ok() {
            if let Err(e) = (&mut self.handler_task).await {
                tracing::debug!("Error awaiting handler: {}", e);
            }
        } else {
            self.handler_task.abort();
        }

        if self.cleanup_user_data_dir
            && let Err(e) = std::fs::remove_dir_all(&self.user_data_dir)
        {
            tracing::debug!(
                "Failed to clean up user-data-dir {}: {}",
                self.user_data_dir.display(),
                e
            );
        }

        closed.map(|_| ())
    }
}

/// `WAYPOINT_USER_DATA_DIR` pins a profile; otherwise every launch gets a fresh one
/// that is removed on close, so sessions never share cookies or storage.
fn resolve_user_data_dir() -> Result<(PathBuf, bool), BackendError> {
    if let Ok(dir) = std::env::var("WAYPOINT_USER_DATA_DIR") {
        let path = PathBuf::from(dir);
        std::fs::create_dir_all(&path)?;
        tracing::info!(
            "Using user data dir from WAYPOINT_USER_DATA_DIR: {}",
            path.display()
        );
        return Ok((path, false));
    }

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| BackendError::Launch(format!("System clock error: {}", e)))?
        .as_nanos();
    let unique = format!("waypoint-chromium-profile-{}-{}", std::process::id(), nanos);
    let path = std::env::temp_dir().join(unique);
    std::fs::create_dir_all(&path)?;
    tracing::debug!("Using isolated user data dir: {}", path.display());
    Ok((path, true))
}
