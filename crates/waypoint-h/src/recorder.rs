use base64::Engine;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::page::{
    EventScreencastFrame, ScreencastFrameAckParams, StartScreencastFormat, StartScreencastParams,
    StopScreencastParams,
};
use futures::{Stream, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use waypoint_common::BackendError;
use waypoint_common::backend::Viewport;

const FRAME_QUALITY: i64 = 70;
/// After stop, the writer exits once no frame has arrived for this long.
const DRAIN_QUIET: Duration = Duration::from_millis(250);
/// Upper bound on waiting for the writer to finish after stop.
const DRAIN_LIMIT: Duration = Duration::from_secs(2);

/// Records the page as a numbered sequence of JPEG screencast frames.
pub struct ScreencastRecorder {
    dir: PathBuf,
    frames: Arc<AtomicUsize>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

fn recording_error(context: &str, e: impl std::fmt::Display) -> BackendError {
    BackendError::Recording(format!("{}: {}", context, e))
}

pub fn frame_file_name(index: usize) -> String {
    format!("frame-{:06}.jpg", index)
}

/// Next event from `events`. Once `stop` fires (or its sender is dropped) it is
/// cleared, and events are only awaited for `quiet` each; `None` ends the drain.
async fn next_or_drain<S>(
    events: &mut S,
    stop: &mut Option<oneshot::Receiver<()>>,
    quiet: Duration,
) -> Option<S::Item>
where
    S: Stream + Unpin,
{
    if let Some(signal) = stop.as_mut() {
        tokio::select! {
            biased;
            item = events.next() => return item,
            _ = signal => {}
        }
    }
    *stop = None;
    tokio::time::timeout(quiet, events.next()).await.ok().flatten()
}

impl ScreencastRecorder {
    pub async fn start(page: &Page, dir: &Path, size: Viewport) -> Result<Self, BackendError> {
        tokio::fs::create_dir_all(dir).await?;

        let mut events = page
            .event_listener::<EventScreencastFrame>()
            .await
            .map_err(|e| recording_error("Failed to subscribe to screencast frames", e))?;

        let params = StartScreencastParams::builder()
            .format(StartScreencastFormat::Jpeg)
            .quality(FRAME_QUALITY)
            .max_width(i64::from(size.width))
            .max_height(i64::from(size.height))
            .build();
        page.execute(params)
            .await
            .map_err(|e| recording_error("Failed to start screencast", e))?;

        let frames = Arc::new(AtomicUsize::new(0));
        let counter = frames.clone();
        let out = dir.to_path_buf();
        let ack_page = page.clone();
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let mut stop = Some(stop_rx);
            while let Some(frame) = next_or_drain(&mut events, &mut stop, DRAIN_QUIET).await {
                let encoded: &str = frame.data.as_ref();
                match base64::engine::general_purpose::STANDARD.decode(encoded) {
                    Ok(bytes) => {
                        let index = counter.load(Ordering::Relaxed);
                        let path = out.join(frame_file_name(index));
                        match tokio::fs::write(&path, bytes).await {
                            Ok(()) => {
                                counter.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(e) => tracing::warn!("Dropping frame {}: {}", path.display(), e),
                        }
                    }
                    Err(e) => tracing::warn!("Undecodable screencast frame: {}", e),
                }
                // Chromium stops sending frames until the previous one is acknowledged.
                if let Err(e) = ack_page
                    .execute(ScreencastFrameAckParams::new(frame.session_id))
                    .await
                {
                    tracing::debug!("Screencast ack failed: {}", e);
                }
            }
        });

        tracing::info!("Recording screencast into {}", dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
            frames,
            stop: Some(stop_tx),
            task,
        })
    }

    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::Relaxed)
    }

    /// Stop the screencast, let the writer flush frames still in flight, and
    /// return the frame directory.
    pub async fn stop(mut self, page: &Page) -> Result<PathBuf, BackendError> {
        let stopped = page
            .execute(StopScreencastParams::default())
            .await
            .map_err(|e| recording_error("Failed to stop screencast", e));

        if let Some(signal) = self.stop.take() {
            let _ = signal.send(());
        }
        if tokio::time::timeout(DRAIN_LIMIT, &mut self.task).await.is_err() {
            tracing::warn!("Screencast writer still busy after {:?}; aborting", DRAIN_LIMIT);
            self.task.abort();
        }

        tracing::info!(
            "Screencast stopped after {} frame(s): {}",
            self.frames(),
            self.dir.display()
        );
        stopped.map(|_| self.dir)
    }

    /// Drop the frame writer without talking to the page, for when the page is gone.
    pub fn abandon(self) -> PathBuf {
        self.task.abort();
        self.dir
    }
}
