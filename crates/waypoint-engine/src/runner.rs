use crate::config::WaypointConfig;
use crate::error::JourneyError;
use crate::executor::{ExecutorOptions, StepExecutor};
use crate::journey::Journey;
use crate::pipeline::{JourneyPipeline, JourneyState};
use crate::session::{SessionArtifacts, SessionConfig, SessionManager};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use url::Url;

/// Outcome of one journey run, including what the session left on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JourneyReport {
    pub state: JourneyState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<SessionArtifacts>,
    /// Set when releasing the session reported problems.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teardown_error: Option<String>,
}

impl JourneyReport {
    pub fn is_success(&self) -> bool {
        self.state.is_success()
    }
}

/// Runs whole journeys: one fresh session each, always torn down.
pub struct JourneyRunner {
    sessions: SessionManager,
    config: WaypointConfig,
}

impl JourneyRunner {
    pub fn new(sessions: SessionManager, config: WaypointConfig) -> Self {
        Self { sessions, config }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn config(&self) -> &WaypointConfig {
        &self.config
    }

    /// Executor settings for `journey`. The journey's own base URL wins over the
    /// configured one unless the target is pinned.
    pub fn executor_options(&self, journey: &Journey) -> ExecutorOptions {
        let target = &self.config.target;
        let configured = target.base_url.as_deref();
        let raw = if target.pinned {
            configured.or(journey.base_url.as_deref())
        } else {
            journey.base_url.as_deref().or(configured)
        };
        let base_url = raw.and_then(|raw| match Url::parse(raw) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Ignoring invalid base URL '{}': {}", raw, e);
                None
            }
        });

        ExecutorOptions {
            base_url,
            fixtures: journey.fixtures.clone(),
            poll_interval: Duration::from_millis(self.config.timeouts.poll_interval_ms),
            settle_timeout: Duration::from_millis(self.config.timeouts.settle_timeout_ms),
        }
    }

    pub async fn run(&self, journey: &Journey) -> Result<JourneyReport, JourneyError> {
        self.run_with_budget(journey, self.config.journey_timeout())
            .await
    }

    /// Run `journey`, cancelling it once `budget` has elapsed. Only a failure
    /// to allocate the session is returned as an error.
    pub async fn run_with_budget(
        &self,
        journey: &Journey,
        budget: Duration,
    ) -> Result<JourneyReport, JourneyError> {
        let session_config = SessionConfig::from_config(&self.config);
        let mut session = self.sessions.open(&session_config).await?;
        let deadline = Instant::now() + budget;

        let executor = StepExecutor::new(self.executor_options(journey));
        let mut pipeline = JourneyPipeline::new(executor).with_name(&journey.name);
        let state = pipeline
            .run_until(&mut session, &journey.steps, Some(deadline))
            .await;

        if !state.is_success() && self.config.artifacts.screenshot_on_failure {
            let bound = Duration::from_millis(self.config.timeouts.settle_timeout_ms);
            match tokio::time::timeout(bound, session.capture_screenshot("failure")).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!("Failure screenshot not captured: {}", e),
                Err(_) => warn!("Failure screenshot timed out after {}ms", bound.as_millis()),
            }
        }

        let (artifacts, teardown_error) = match self.sessions.close(session).await {
            Ok(artifacts) => (Some(artifacts), None),
            Err(e) => (None, Some(e.to_string())),
        };

        info!(
            "Journey '{}' ended as {:?}",
            journey.name, state.status
        );
        Ok(JourneyReport {
            state,
            artifacts,
            teardown_error,
        })
    }
}
