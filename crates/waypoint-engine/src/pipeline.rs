use crate::assertion::AssertionRecord;
use crate::error::JourneyError;
use crate::executor::{StepExecutor, StepResult, StepStatus};
use crate::journey::Step;
use crate::session::Session;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, timeout_at};
use tracing::{info, warn};

/// Journey lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "step", rename_all = "snake_case")]
pub enum JourneyStatus {
    NotStarted,
    InProgress(usize),
    HaltedFatal(usize),
    Cancelled(usize),
    Completed,
}

impl JourneyStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JourneyStatus::HaltedFatal(_) | JourneyStatus::Cancelled(_) | JourneyStatus::Completed
        )
    }

    /// Step index the status refers to, if any.
    pub fn step_index(&self) -> Option<usize> {
        match self {
            JourneyStatus::InProgress(i)
            | JourneyStatus::HaltedFatal(i)
            | JourneyStatus::Cancelled(i) => Some(*i),
            JourneyStatus::NotStarted | JourneyStatus::Completed => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JourneyState {
    pub journey: String,
    pub session_id: String,
    pub status: JourneyStatus,
    /// One entry per executed step, in execution order.
    pub results: Vec<StepResult>,
    pub elapsed_ms: u64,
}

impl JourneyState {
    pub fn new(journey: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            journey: journey.into(),
            session_id: session_id.into(),
            status: JourneyStatus::NotStarted,
            results: Vec::new(),
            elapsed_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JourneyStatus::Completed
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn result(&self, step: &str) -> Option<&StepResult> {
        self.results.iter().find(|r| r.name == step)
    }

    /// Every assertion recorded, including those of nested steps, in execution order.
    pub fn assertions(&self) -> Vec<&AssertionRecord> {
        fn collect<'a>(results: &'a [StepResult], out: &mut Vec<&'a AssertionRecord>) {
            for r in results {
                out.extend(r.assertions.iter());
                collect(&r.sub_results, out);
            }
        }
        let mut out = Vec::new();
        collect(&self.results, &mut out);
        out
    }

    pub fn failed_assertions(&self) -> Vec<&AssertionRecord> {
        self.assertions()
            .into_iter()
            .filter(|a| !a.passed())
            .collect()
    }

    /// The error that stopped the journey, if it stopped early.
    pub fn failure(&self) -> Option<&JourneyError> {
        match self.status {
            JourneyStatus::HaltedFatal(i) | JourneyStatus::Cancelled(i) => {
                self.results.get(i).and_then(|r| r.failure.as_ref())
            }
            _ => None,
        }
    }

    /// Surface a halted or cancelled journey as its carried error.
    pub fn into_result(self) -> Result<JourneyState, JourneyError> {
        match self.failure() {
            Some(failure) => Err(failure.clone()),
            None => Ok(self),
        }
    }
}

/// Runs a step table in order against one session, halting on the first
/// fatal failure or when the journey budget runs out.
pub struct JourneyPipeline {
    name: String,
    executor: StepExecutor,
    status: JourneyStatus,
}

impl JourneyPipeline {
    pub fn new(executor: StepExecutor) -> Self {
        Self {
            name: String::new(),
            executor,
            status: JourneyStatus::NotStarted,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn status(&self) -> JourneyStatus {
        self.status
    }

    pub async fn run(&mut self, session: &mut Session, steps: &[Step]) -> JourneyState {
        self.run_until(session, steps, None).await
    }

    /// Like [`run`](Self::run), but cancels the step in flight when `deadline`
    /// passes. No step starts after the deadline.
    pub async fn run_until(
        &mut self,
        session: &mut Session,
        steps: &[Step],
        deadline: Option<Instant>,
    ) -> JourneyState {
        let started = Instant::now();
        let mut state = JourneyState::new(self.name.clone(), session.id());
        self.status = JourneyStatus::NotStarted;
        info!("Starting journey '{}' ({} steps)", self.name, steps.len());

        for (index, step) in steps.iter().enumerate() {
            self.advance(JourneyStatus::InProgress(index));
            let step_started = Instant::now();

            let result = match deadline {
                Some(deadline) if Instant::now() >= deadline => {
                    StepResult::cancelled(&step.name, started.elapsed())
                }
                Some(deadline) => {
                    match timeout_at(deadline, self.executor.execute(session, step)).await {
                        Ok(result) => result,
                        Err(_) => {
                            let mut result = StepResult::cancelled(&step.name, started.elapsed());
                            result.elapsed_ms = step_started.elapsed().as_millis() as u64;
                            result
                        }
                    }
                }
                None => self.executor.execute(session, step).await,
            };

            let status = result.status;
            state.results.push(result);

            match status {
                StepStatus::FailedFatal => {
                    self.advance(JourneyStatus::HaltedFatal(index));
                    break;
                }
                StepStatus::Cancelled => {
                    warn!("Journey '{}' cancelled at step '{}'", self.name, step.name);
                    self.advance(JourneyStatus::Cancelled(index));
                    break;
                }
                StepStatus::Succeeded | StepStatus::SkippedNotFound => {}
            }
        }

        if !self.status.is_terminal() {
            self.advance(JourneyStatus::Completed);
        }

        state.status = self.status;
        state.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            "Journey '{}' finished as {:?} after {}ms",
            self.name, state.status, state.elapsed_ms
        );
        state
    }

    fn advance(&mut self, next: JourneyStatus) {
        debug_assert!(
            !self.status.is_terminal(),
            "journey already finished as {:?}",
            self.status
        );
        debug_assert!(
            match (self.status.step_index(), next.step_index()) {
                (Some(current), Some(next)) => next >= current,
                _ => true,
            },
            "journey cannot move back from {:?} to {:?}",
            self.status,
            next
        );
        self.status = next;
    }
}
