use crate::assertion::{AssertionLayer, AssertionRecord};
use crate::error::JourneyError;
use crate::journey::{Check, Fixtures, Settle, Step, StepAction};
use crate::resolution::{LocatorResolver, Resolution};
use crate::session::Session;
use async_recursion::async_recursion;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;
use waypoint_common::backend::{ActionKind, ElementHandle};
use waypoint_common::locator::Locator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    /// A tolerated step whose target never appeared.
    SkippedNotFound,
    FailedFatal,
    Cancelled,
}

impl StepStatus {
    /// Whether this status stops the journey.
    pub fn halts(&self) -> bool {
        matches!(self, StepStatus::FailedFatal | StepStatus::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub status: StepStatus,
    pub elapsed_ms: u64,
    /// Value the step produced: filled text, navigated URL, or waited-for element text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<JourneyError>,
    /// Whether the post-action settle condition was met in time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settled: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertions: Vec<AssertionRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_results: Vec<StepResult>,
}

impl StepResult {
    fn with_status(name: &str, status: StepStatus, failure: Option<JourneyError>) -> Self {
        Self {
            name: name.to_string(),
            status,
            elapsed_ms: 0,
            captured: None,
            failure,
            settled: None,
            assertions: Vec::new(),
            sub_results: Vec::new(),
        }
    }

    pub fn succeeded(name: &str) -> Self {
        Self::with_status(name, StepStatus::Succeeded, None)
    }

    pub fn skipped(name: &str, failure: JourneyError) -> Self {
        Self::with_status(name, StepStatus::SkippedNotFound, Some(failure))
    }

    pub fn fatal(name: &str, failure: JourneyError) -> Self {
        Self::with_status(name, StepStatus::FailedFatal, Some(failure))
    }

    pub fn cancelled(name: &str, journey_elapsed: Duration) -> Self {
        Self::with_status(
            name,
            StepStatus::Cancelled,
            Some(JourneyError::JourneyCancelled {
                step: name.to_string(),
                elapsed_ms: journey_elapsed.as_millis() as u64,
            }),
        )
    }

    fn with_captured(mut self, value: impl Into<String>) -> Self {
        self.captured = Some(value.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Relative `navigate` targets are joined to this.
    pub base_url: Option<Url>,
    pub fixtures: Fixtures,
    pub poll_interval: Duration,
    /// Bound for settle conditions without their own timeout.
    pub settle_timeout: Duration,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            base_url: None,
            fixtures: Fixtures::default(),
            poll_interval: Duration::from_millis(100),
            settle_timeout: Duration::from_millis(5000),
        }
    }
}

/// Runs one step against a session: resolve, act, settle.
pub struct StepExecutor {
    options: ExecutorOptions,
    resolver: LocatorResolver,
    assertions: AssertionLayer,
}

impl StepExecutor {
    pub fn new(options: ExecutorOptions) -> Self {
        let resolver = LocatorResolver::new(options.poll_interval);
        Self {
            assertions: AssertionLayer::new(resolver.clone()),
            resolver,
            options,
        }
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Execute `step`. Every outcome, failures included, is reported in the result.
    #[async_recursion]
    pub async fn execute(&self, session: &mut Session, step: &Step) -> StepResult {
        let started = Instant::now();
        debug!("Executing step '{}' ({})", step.name, step.action.kind());

        let mut result = match &step.action {
            StepAction::Navigate { url } => self.navigate(session, step, url).await,
            StepAction::Assert { checks } => self.checkpoint(session, step, checks).await,
            StepAction::Group { .. } | StepAction::SelectFilter { .. } => {
                self.composite(session, step).await
            }
            StepAction::Fill { .. }
            | StepAction::Click
            | StepAction::Press { .. }
            | StepAction::Wait => self.targeted(session, step).await,
        };
        result.elapsed_ms = started.elapsed().as_millis() as u64;

        match result.status {
            StepStatus::Succeeded => {
                info!("Step '{}' succeeded in {}ms", step.name, result.elapsed_ms)
            }
            StepStatus::SkippedNotFound => {
                info!("Step '{}' skipped: target not present", step.name)
            }
            StepStatus::FailedFatal | StepStatus::Cancelled => {
                if let Some(failure) = &result.failure {
                    warn!("Step '{}' {:?}: {}", step.name, result.status, failure);
                }
            }
        }
        result
    }

    async fn navigate(&self, session: &mut Session, step: &Step, url: &str) -> StepResult {
        let url = match self.resolve_url(url) {
            Ok(url) => url,
            Err(reason) => {
                return StepResult::fatal(&step.name, JourneyError::action_failed(&step.name, reason));
            }
        };

        match session.backend().navigate(url.as_str()).await {
            Ok(nav) => {
                debug!("Navigated to {} ({}, status {})", nav.url, nav.title, nav.status);
                let mut result = StepResult::succeeded(&step.name).with_captured(nav.url);
                result.settled = Some(self.settle(session, step).await);
                result
            }
            Err(e) => StepResult::fatal(&step.name, JourneyError::action_failed(&step.name, e)),
        }
    }

    async fn targeted(&self, session: &mut Session, step: &Step) -> StepResult {
        let candidates = match self.render_locators(&step.locators) {
            Ok(candidates) => candidates,
            Err(reason) => {
                return StepResult::fatal(&step.name, JourneyError::action_failed(&step.name, reason));
            }
        };
        let timeout = step.timeout().unwrap_or(session.default_timeout());

        let element = match self
            .resolver
            .resolve(session.backend(), &candidates, timeout)
            .await
        {
            Ok(Resolution::Found { element, .. }) => element,
            Ok(Resolution::NotFound { attempted }) => {
                let failure = JourneyError::ElementNotFound {
                    step: step.name.clone(),
                    attempted,
                };
                return if step.is_tolerated() {
                    StepResult::skipped(&step.name, failure)
                } else {
                    StepResult::fatal(&step.name, failure)
                };
            }
            Err(e) => {
                return StepResult::fatal(&step.name, JourneyError::action_failed(&step.name, e));
            }
        };

        let mut result = match self.act(session, step, &element).await {
            Ok(captured) => {
                let mut result = StepResult::succeeded(&step.name);
                result.captured = captured;
                result
            }
            Err(failure) => return StepResult::fatal(&step.name, failure),
        };

        if !matches!(step.effective_settle(), Settle::None) {
            result.settled = Some(self.settle(session, step).await);
        }
        result
    }

    async fn act(
        &self,
        session: &mut Session,
        step: &Step,
        element: &ElementHandle,
    ) -> Result<Option<String>, JourneyError> {
        let fail = |e: waypoint_common::BackendError| JourneyError::action_failed(&step.name, e);
        let backend = session.backend();

        match &step.action {
            StepAction::Click => {
                backend.act(element, ActionKind::Click, None).await.map_err(fail)?;
                Ok(element.text.clone())
            }
            StepAction::Fill { submit } => {
                let template = step.value.as_deref().unwrap_or_default();
                let value = self
                    .options
                    .fixtures
                    .render(template)
                    .map_err(|e| JourneyError::action_failed(&step.name, e))?;
                backend
                    .act(element, ActionKind::Fill, Some(&value))
                    .await
                    .map_err(fail)?;
                if let Some(key) = submit {
                    backend
                        .act(element, ActionKind::Press, Some(key))
                        .await
                        .map_err(fail)?;
                }
                Ok(Some(value))
            }
            StepAction::Press { key } => {
                backend
                    .act(element, ActionKind::Press, Some(key))
                    .await
                    .map_err(fail)?;
                Ok(Some(key.clone()))
            }
            StepAction::Wait => Ok(element.text.clone()),
            other => Err(JourneyError::action_failed(
                &step.name,
                format!("'{}' does not act on an element", other.kind()),
            )),
        }
    }

    async fn checkpoint(&self, session: &mut Session, step: &Step, checks: &[Check]) -> StepResult {
        let timeout = step.timeout().unwrap_or(session.default_timeout());
        let mut records = Vec::with_capacity(checks.len());
        for check in checks {
            let record = self
                .assertions
                .evaluate(session.backend(), check, &self.options.fixtures, timeout)
                .await;
            records.push(record);
        }

        let required_failure = records
            .iter()
            .find(|r| r.required && !r.passed())
            .map(|r| JourneyError::AssertionFailed {
                check: r.check.clone(),
                detail: r.failure_detail().unwrap_or_default().to_string(),
            });

        let mut result = match required_failure {
            Some(failure) if !step.is_tolerated() => StepResult::fatal(&step.name, failure),
            _ => StepResult::succeeded(&step.name),
        };
        result.assertions = records;
        result
    }

    /// Run sub-steps in order. The first halting sub-step decides the outcome;
    /// otherwise the composite succeeded if any sub-step did, else it was skipped.
    async fn composite(&self, session: &mut Session, step: &Step) -> StepResult {
        let Some(steps) = step.sub_steps() else {
            return StepResult::fatal(
                &step.name,
                JourneyError::action_failed(&step.name, "step has no sub-steps"),
            );
        };

        let mut subs = Vec::with_capacity(steps.len());
        for sub in &steps {
            let result = self.execute(session, sub).await;
            let halts = result.status.halts();
            subs.push(result);
            if halts {
                break;
            }
        }

        let mut result = if let Some(halted) = subs.iter().find(|r| r.status.halts()) {
            let failure = halted.failure.clone().unwrap_or_else(|| {
                let reason = format!("sub-step '{}' failed", halted.name);
                JourneyError::action_failed(&step.name, reason)
            });
            let not_found = matches!(failure, JourneyError::ElementNotFound { .. });
            if step.is_tolerated() && not_found {
                StepResult::skipped(&step.name, failure)
            } else if halted.status == StepStatus::Cancelled {
                StepResult::with_status(&step.name, StepStatus::Cancelled, Some(failure))
            } else {
                StepResult::fatal(&step.name, failure)
            }
        } else if subs.iter().any(|r| r.status == StepStatus::Succeeded) {
            StepResult::succeeded(&step.name)
        } else {
            let failure = subs.iter().find_map(|r| r.failure.clone());
            StepResult::with_status(&step.name, StepStatus::SkippedNotFound, failure)
        };

        result.sub_results = subs;
        result
    }

    /// Wait for the step's settle condition. Never longer than its bound and
    /// never a failure; the return value only records whether it was met.
    async fn settle(&self, session: &mut Session, step: &Step) -> bool {
        let settle = step.effective_settle();
        let bound = settle
            .timeout_override()
            .unwrap_or(self.options.settle_timeout);

        match settle {
            Settle::None => true,
            Settle::NetworkIdle { .. } => {
                match tokio::time::timeout(bound, session.backend().wait_for_network_idle(bound))
                    .await
                {
                    Ok(Ok(idle)) => idle,
                    Ok(Err(e)) => {
                        debug!("Network idle wait after '{}' failed: {}", step.name, e);
                        false
                    }
                    Err(_) => false,
                }
            }
            Settle::Element { locators, .. } => {
                let candidates = match self.render_locators(&locators) {
                    Ok(candidates) => candidates,
                    Err(reason) => {
                        debug!("Settle locators for '{}' invalid: {}", step.name, reason);
                        return false;
                    }
                };
                matches!(
                    self.resolver
                        .resolve(session.backend(), &candidates, bound)
                        .await,
                    Ok(Resolution::Found { .. })
                )
            }
        }
    }

    fn render_locators(&self, locators: &[Locator]) -> Result<Vec<Locator>, String> {
        locators
            .iter()
            .map(|l| {
                self.options
                    .fixtures
                    .render_locator(l)
                    .map_err(|e| e.to_string())
            })
            .collect()
    }

    fn resolve_url(&self, url: &str) -> Result<Url, String> {
        let rendered = self.options.fixtures.render(url).map_err(|e| e.to_string())?;
        match Url::parse(&rendered) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.options.base_url {
                Some(base) => base
                    .join(&rendered)
                    .map_err(|e| format!("cannot join '{}' to {}: {}", rendered, base, e)),
                None => Err(format!("relative URL '{}' without a base URL", rendered)),
            },
            Err(e) => Err(format!("invalid URL '{}': {}", rendered, e)),
        }
    }
}
