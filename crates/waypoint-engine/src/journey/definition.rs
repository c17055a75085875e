use super::fixtures::Fixtures;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use waypoint_common::locator::Locator;

/// A complete purchase journey: an ordered, immutable step table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Journey {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Base URL for relative `navigate` targets. Overrides the harness configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Inputs and expected values referenced from steps as `{{name}}`.
    #[serde(default)]
    pub fixtures: Fixtures,
    pub steps: Vec<Step>,
}

impl Journey {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            description: None,
            base_url: None,
            fixtures: Fixtures::default(),
            steps,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_fixture(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fixtures.insert(name, value);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Not finding the target halts the journey.
    #[default]
    Fatal,
    /// Not finding the target is an anticipated page state; the step is skipped.
    Tolerated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    #[serde(flatten)]
    pub action: StepAction,
    /// Candidates for the step's target, in order of preference.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locators: Vec<Locator>,
    /// Input payload, e.g. the text to fill.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub policy: FailurePolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settle: Option<Settle>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StepAction {
    Navigate {
        url: String,
    },
    Fill {
        /// Key pressed on the field once filled (e.g. `Enter` to submit a search).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        submit: Option<String>,
    },
    Click,
    Press {
        key: String,
    },
    /// Succeeds once any candidate is interactable.
    Wait,
    /// Checkpoint evaluating assertions against the current page.
    Assert {
        checks: Vec<Check>,
    },
    Group {
        steps: Vec<Step>,
    },
    /// Expand a filter panel if needed, then pick one of its options.
    SelectFilter {
        filter: String,
        option: String,
    },
}

impl StepAction {
    pub fn kind(&self) -> &'static str {
        match self {
            StepAction::Navigate { .. } => "navigate",
            StepAction::Fill { .. } => "fill",
            StepAction::Click => "click",
            StepAction::Press { .. } => "press",
            StepAction::Wait => "wait",
            StepAction::Assert { .. } => "assert",
            StepAction::Group { .. } => "group",
            StepAction::SelectFilter { .. } => "select_filter",
        }
    }

    /// Whether the action operates on a resolved element.
    pub fn needs_target(&self) -> bool {
        matches!(
            self,
            StepAction::Fill { .. } | StepAction::Click | StepAction::Press { .. } | StepAction::Wait
        )
    }
}

/// Bounded wait after a successful action. Timing out never fails the step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "until", rename_all = "snake_case")]
pub enum Settle {
    None,
    NetworkIdle {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// A follow-up element becomes interactable.
    Element {
        locators: Vec<Locator>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
}

impl Settle {
    pub fn network_idle() -> Self {
        Settle::NetworkIdle { timeout_ms: None }
    }

    pub fn element(locators: impl IntoIterator<Item = Locator>) -> Self {
        Settle::Element {
            locators: locators.into_iter().collect(),
            timeout_ms: None,
        }
    }

    pub fn timeout_override(&self) -> Option<Duration> {
        match self {
            Settle::None => None,
            Settle::NetworkIdle { timeout_ms } | Settle::Element { timeout_ms, .. } => {
                timeout_ms.map(Duration::from_millis)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub name: String,
    #[serde(flatten)]
    pub predicate: Predicate,
    /// A failed required check fails a fatal checkpoint.
    #[serde(default)]
    pub required: bool,
}

impl Check {
    pub fn new(name: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            name: name.into(),
            predicate,
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "expect", rename_all = "snake_case")]
pub enum Predicate {
    Visible { locators: Vec<Locator> },
    TextMatches { locators: Vec<Locator>, pattern: String },
    CountAtLeast { locator: Locator, min: usize },
    UrlContains { fragment: String },
    TitleMatches { pattern: String },
}

impl Step {
    fn with_action(name: impl Into<String>, action: StepAction) -> Self {
        Self {
            name: name.into(),
            action,
            locators: Vec::new(),
            value: None,
            policy: FailurePolicy::Fatal,
            timeout_ms: None,
            settle: None,
        }
    }

    pub fn navigate(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::with_action(name, StepAction::Navigate { url: url.into() })
    }

    pub fn click(name: impl Into<String>, locators: impl IntoIterator<Item = Locator>) -> Self {
        Self::with_action(name, StepAction::Click).with_locators(locators)
    }

    pub fn fill(
        name: impl Into<String>,
        locators: impl IntoIterator<Item = Locator>,
        value: impl Into<String>,
    ) -> Self {
        let mut step = Self::with_action(name, StepAction::Fill { submit: None })
            .with_locators(locators);
        step.value = Some(value.into());
        step
    }

    pub fn press(
        name: impl Into<String>,
        locators: impl IntoIterator<Item = Locator>,
        key: impl Into<String>,
    ) -> Self {
        Self::with_action(name, StepAction::Press { key: key.into() }).with_locators(locators)
    }

    pub fn wait_for(name: impl Into<String>, locators: impl IntoIterator<Item = Locator>) -> Self {
        Self::with_action(name, StepAction::Wait).with_locators(locators)
    }

    pub fn checkpoint(name: impl Into<String>, checks: Vec<Check>) -> Self {
        Self::with_action(name, StepAction::Assert { checks })
    }

    pub fn group(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self::with_action(name, StepAction::Group { steps })
    }

    pub fn select_filter(filter: impl Into<String>, option: impl Into<String>) -> Self {
        let filter = filter.into();
        let option = option.into();
        let name = format!("filter-{}", slug(&filter));
        Self::with_action(name, StepAction::SelectFilter { filter, option })
    }

    pub fn with_locators(mut self, locators: impl IntoIterator<Item = Locator>) -> Self {
        self.locators = locators.into_iter().collect();
        self
    }

    pub fn tolerated(mut self) -> Self {
        self.policy = FailurePolicy::Tolerated;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_settle(mut self, settle: Settle) -> Self {
        self.settle = Some(settle);
        self
    }

    pub fn submit_with(mut self, key: impl Into<String>) -> Self {
        if let StepAction::Fill { submit } = &mut self.action {
            *submit = Some(key.into());
        }
        self
    }

    pub fn is_tolerated(&self) -> bool {
        self.policy == FailurePolicy::Tolerated
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Settle condition in effect: the explicit one, else network idle for
    /// navigations and element actions, else none.
    pub fn effective_settle(&self) -> Settle {
        if let Some(settle) = &self.settle {
            return settle.clone();
        }
        match self.action {
            StepAction::Navigate { .. }
            | StepAction::Fill { .. }
            | StepAction::Click
            | StepAction::Press { .. } => Settle::network_idle(),
            _ => Settle::None,
        }
    }

    /// Sub-steps of a composite step, with templates expanded. A sub-step
    /// without its own timeout inherits the composite's.
    pub fn sub_steps(&self) -> Option<Vec<Step>> {
        match &self.action {
            StepAction::Group { steps } => Some(
                steps
                    .iter()
                    .cloned()
                    .map(|mut step| {
                        step.timeout_ms = step.timeout_ms.or(self.timeout_ms);
                        step
                    })
                    .collect(),
            ),
            StepAction::SelectFilter { filter, option } => {
                Some(select_filter_steps(filter, option, self.timeout_ms))
            }
            _ => None,
        }
    }
}

/// The two interactions behind a filter selection. The panel may already be
/// expanded, in which case its toggle is not found and the click is skipped.
fn select_filter_steps(filter: &str, option: &str, timeout_ms: Option<u64>) -> Vec<Step> {
    let mut expand = Step::click(
        format!("expand-{}", slug(filter)),
        [
            Locator::text(filter),
            Locator::has_text("button", filter),
            Locator::xpath(format!("//button[contains(., '{}')]", filter)),
        ],
    )
    .tolerated()
    .with_settle(Settle::None);
    expand.timeout_ms = timeout_ms;

    let mut select = Step::click(
        format!("select-{}", slug(option)),
        [Locator::text(option), Locator::has_text("label", option)],
    );
    select.timeout_ms = timeout_ms;

    vec![expand, select]
}

fn slug(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}
