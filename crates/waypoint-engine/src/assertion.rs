//! Checkpoint predicates over page state.
//!
//! An assertion never fails the step that runs it. It produces a record, and
//! the executor decides what a failed required check means for the journey.

use crate::journey::{Check, Fixtures, Predicate};
use crate::resolution::{LocatorResolver, Resolution};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use waypoint_common::backend::Backend;
use waypoint_common::error::backend_error::BackendError;
use waypoint_common::locator::Locator;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum AssertionResult {
    Pass,
    Fail(String),
}

impl AssertionResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, AssertionResult::Pass)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionRecord {
    pub check: String,
    pub required: bool,
    #[serde(flatten)]
    pub result: AssertionResult,
    /// Last value read from the page while evaluating, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed: Option<String>,
}

impl AssertionRecord {
    pub fn passed(&self) -> bool {
        self.result.is_pass()
    }

    pub fn failure_detail(&self) -> Option<&str> {
        match &self.result {
            AssertionResult::Pass => None,
            AssertionResult::Fail(detail) => Some(detail),
        }
    }
}

/// Re-evaluation schedule for a predicate that may become true while the page settles.
struct Poll {
    deadline: Instant,
    interval: Duration,
}

impl Poll {
    fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            interval,
        }
    }

    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Sleep until the next evaluation; `false` once the deadline has passed.
    async fn wait(&self) -> bool {
        let remaining = self.remaining();
        if remaining.is_zero() {
            return false;
        }
        sleep(self.interval.min(remaining)).await;
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssertionLayer {
    resolver: LocatorResolver,
}

impl AssertionLayer {
    pub fn new(resolver: LocatorResolver) -> Self {
        Self { resolver }
    }

    /// Render a named check's fixtures and evaluate it.
    pub async fn evaluate<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        check: &Check,
        fixtures: &Fixtures,
        timeout: Duration,
    ) -> AssertionRecord {
        let (result, observed) = match render_predicate(&check.predicate, fixtures) {
            Ok(predicate) => self.observe(backend, &predicate, timeout).await,
            Err(reason) => (AssertionResult::Fail(reason), None),
        };

        if let AssertionResult::Fail(detail) = &result {
            tracing::info!("Check '{}' failed: {}", check.name, detail);
        } else {
            tracing::debug!("Check '{}' passed", check.name);
        }

        AssertionRecord {
            check: check.name.clone(),
            required: check.required,
            result,
            observed,
        }
    }

    /// Evaluate a predicate, re-polling until it holds or `timeout` elapses.
    pub async fn check<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        predicate: &Predicate,
        timeout: Duration,
    ) -> AssertionResult {
        self.observe(backend, predicate, timeout).await.0
    }

    async fn observe<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        predicate: &Predicate,
        timeout: Duration,
    ) -> (AssertionResult, Option<String>) {
        match predicate {
            Predicate::Visible { locators } => {
                match self.resolver.resolve(backend, locators, timeout).await {
                    Ok(Resolution::Found { element, .. }) => (AssertionResult::Pass, element.text),
                    Ok(Resolution::NotFound { attempted }) => (
                        AssertionResult::Fail(format!(
                            "none of [{}] became visible within {}ms",
                            attempted.join(", "),
                            timeout.as_millis()
                        )),
                        None,
                    ),
                    Err(e) => (AssertionResult::Fail(format!("engine error: {}", e)), None),
                }
            }
            Predicate::TextMatches { locators, pattern } => {
                self.text_matches(backend, locators, pattern, timeout).await
            }
            Predicate::CountAtLeast { locator, min } => {
                self.count_at_least(backend, locator, *min, timeout).await
            }
            Predicate::UrlContains { fragment } => {
                let poll = Poll::new(timeout, self.resolver.poll_interval());
                let mut last = None;
                loop {
                    match backend.current_url().await {
                        Ok(url) if url.contains(fragment.as_str()) => {
                            return (AssertionResult::Pass, Some(url));
                        }
                        Ok(url) => last = Some(url),
                        Err(e) => {
                            return (AssertionResult::Fail(format!("engine error: {}", e)), last);
                        }
                    }
                    if !poll.wait().await {
                        let detail = format!(
                            "URL '{}' does not contain '{}'",
                            last.as_deref().unwrap_or_default(),
                            fragment
                        );
                        return (AssertionResult::Fail(detail), last);
                    }
                }
            }
            Predicate::TitleMatches { pattern } => {
                let re = match Regex::new(pattern) {
                    Ok(re) => re,
                    Err(e) => return (invalid_pattern(pattern, e), None),
                };
                let poll = Poll::new(timeout, self.resolver.poll_interval());
                let mut last = None;
                loop {
                    match backend.title().await {
                        Ok(title) if re.is_match(&title) => {
                            return (AssertionResult::Pass, Some(title));
                        }
                        Ok(title) => last = Some(title),
                        Err(e) => {
                            return (AssertionResult::Fail(format!("engine error: {}", e)), last);
                        }
                    }
                    if !poll.wait().await {
                        let detail = format!(
                            "title '{}' does not match /{}/",
                            last.as_deref().unwrap_or_default(),
                            pattern
                        );
                        return (AssertionResult::Fail(detail), last);
                    }
                }
            }
        }
    }

    async fn text_matches<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        locators: &[Locator],
        pattern: &str,
        timeout: Duration,
    ) -> (AssertionResult, Option<String>) {
        let re = match Regex::new(pattern) {
            Ok(re) => re,
            Err(e) => return (invalid_pattern(pattern, e), None),
        };
        let poll = Poll::new(timeout, self.resolver.poll_interval());
        let mut last = None;
        let mut missing = None;

        loop {
            match self
                .resolver
                .resolve(backend, locators, poll.remaining())
                .await
            {
                Ok(Resolution::Found { element, .. }) => {
                    match backend.text_content(&element).await {
                        Ok(text) if re.is_match(&text) => {
                            return (AssertionResult::Pass, Some(text));
                        }
                        Ok(text) => last = Some(text),
                        // Replaced between query and read; look it up again.
                        Err(BackendError::ElementStale { .. }) => {}
                        Err(e) => {
                            return (AssertionResult::Fail(format!("engine error: {}", e)), last);
                        }
                    }
                }
                Ok(Resolution::NotFound { attempted }) => missing = Some(attempted),
                Err(e) => return (AssertionResult::Fail(format!("engine error: {}", e)), last),
            }

            if !poll.wait().await {
                let detail = match (&last, missing) {
                    (Some(text), _) => format!("text '{}' does not match /{}/", text, pattern),
                    (None, Some(attempted)) => {
                        format!("no element for [{}]", attempted.join(", "))
                    }
                    (None, None) => format!(
                        "no element text matched /{}/ within {}ms",
                        pattern,
                        timeout.as_millis()
                    ),
                };
                return (AssertionResult::Fail(detail), last);
            }
        }
    }

    async fn count_at_least<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        locator: &Locator,
        min: usize,
        timeout: Duration,
    ) -> (AssertionResult, Option<String>) {
        let poll = Poll::new(timeout, self.resolver.poll_interval());
        let mut last = 0;
        loop {
            match backend.count(locator).await {
                Ok(n) if n >= min => return (AssertionResult::Pass, Some(n.to_string())),
                Ok(n) => last = n,
                Err(e) => {
                    return (
                        AssertionResult::Fail(format!("engine error: {}", e)),
                        Some(last.to_string()),
                    );
                }
            }
            if !poll.wait().await {
                let detail = format!(
                    "found {} element(s) for '{}', expected at least {}",
                    last, locator, min
                );
                return (AssertionResult::Fail(detail), Some(last.to_string()));
            }
        }
    }
}

fn invalid_pattern(pattern: &str, err: regex::Error) -> AssertionResult {
    AssertionResult::Fail(format!("invalid pattern /{}/: {}", pattern, err))
}

fn render_predicate(predicate: &Predicate, fixtures: &Fixtures) -> Result<Predicate, String> {
    let locators = |ls: &[Locator]| -> Result<Vec<Locator>, String> {
        ls.iter()
            .map(|l| fixtures.render_locator(l).map_err(|e| e.to_string()))
            .collect()
    };

    Ok(match predicate {
        Predicate::Visible { locators: ls } => Predicate::Visible {
            locators: locators(ls)?,
        },
        Predicate::TextMatches {
            locators: ls,
            pattern,
        } => Predicate::TextMatches {
            locators: locators(ls)?,
            pattern: fixtures.render_pattern(pattern).map_err(|e| e.to_string())?,
        },
        Predicate::CountAtLeast { locator, min } => Predicate::CountAtLeast {
            locator: fixtures.render_locator(locator).map_err(|e| e.to_string())?,
            min: *min,
        },
        Predicate::UrlContains { fragment } => Predicate::UrlContains {
            fragment: fixtures.render(fragment).map_err(|e| e.to_string())?,
        },
        Predicate::TitleMatches { pattern } => Predicate::TitleMatches {
            pattern: fixtures.render_pattern(pattern).map_err(|e| e.to_string())?,
        },
    })
}
