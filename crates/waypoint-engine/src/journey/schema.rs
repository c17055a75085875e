use super::definition::{Journey, Predicate, Settle, Step, StepAction};
use super::fixtures::Fixtures;
use regex::Regex;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Journey name cannot be empty")]
    EmptyName,
    #[error("Journey must have at least one step")]
    NoSteps,
    #[error("Invalid base URL '{0}'")]
    InvalidBaseUrl(String),
    #[error("Step name cannot be empty")]
    EmptyStepName,
    #[error("Duplicate step name: {0}")]
    DuplicateStepName(String),
    #[error("Step '{0}' needs at least one locator")]
    MissingLocators(String),
    #[error("Step '{0}' needs a value to fill")]
    MissingValue(String),
    #[error("Step '{0}' has an empty {1}")]
    EmptyField(String, &'static str),
    #[error("Step '{0}' must contain at least one sub-step")]
    EmptyGroup(String),
    #[error("Checkpoint '{0}' must contain at least one check")]
    EmptyChecks(String),
    #[error("Step '{step}' has an invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        step: String,
        pattern: String,
        reason: String,
    },
    #[error("Step '{step}' references unknown fixture '{name}'")]
    UnknownFixture { step: String, name: String },
}

pub trait Validatable {
    fn validate(&self) -> Result<(), ValidationError>;
}

impl Validatable for Journey {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.steps.is_empty() {
            return Err(ValidationError::NoSteps);
        }
        if let Some(base) = &self.base_url
            && url::Url::parse(base).is_err()
        {
            return Err(ValidationError::InvalidBaseUrl(base.clone()));
        }

        validate_steps(&self.steps, &self.fixtures)
    }
}

fn validate_steps(steps: &[Step], fixtures: &Fixtures) -> Result<(), ValidationError> {
    let mut names = HashSet::new();
    for step in steps {
        if !names.insert(step.name.as_str()) {
            return Err(ValidationError::DuplicateStepName(step.name.clone()));
        }
        validate_step(step, fixtures)?;
    }
    Ok(())
}

fn validate_step(step: &Step, fixtures: &Fixtures) -> Result<(), ValidationError> {
    let name = &step.name;
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyStepName);
    }

    if step.action.needs_target() && step.locators.is_empty() {
        return Err(ValidationError::MissingLocators(name.clone()));
    }

    let mut strings: Vec<String> = step.locators.iter().map(|l| l.to_string()).collect();
    if let Some(value) = &step.value {
        strings.push(value.clone());
    }

    match &step.action {
        StepAction::Navigate { url } => {
            if url.trim().is_empty() {
                return Err(ValidationError::EmptyField(name.clone(), "url"));
            }
            strings.push(url.clone());
        }
        StepAction::Fill { .. } => {
            if step.value.is_none() {
                return Err(ValidationError::MissingValue(name.clone()));
            }
        }
        StepAction::Press { key } => {
            if key.trim().is_empty() {
                return Err(ValidationError::EmptyField(name.clone(), "key"));
            }
        }
        StepAction::Click | StepAction::Wait => {}
        StepAction::Assert { checks } => {
            if checks.is_empty() {
                return Err(ValidationError::EmptyChecks(name.clone()));
            }
            for check in checks {
                collect_predicate(name, &check.predicate, &mut strings)?;
            }
        }
        StepAction::Group { steps } => {
            if steps.is_empty() {
                return Err(ValidationError::EmptyGroup(name.clone()));
            }
            validate_steps(steps, fixtures)?;
        }
        StepAction::SelectFilter { filter, option } => {
            if filter.trim().is_empty() {
                return Err(ValidationError::EmptyField(name.clone(), "filter"));
            }
            if option.trim().is_empty() {
                return Err(ValidationError::EmptyField(name.clone(), "option"));
            }
            strings.push(filter.clone());
            strings.push(option.clone());
        }
    }

    if let Some(Settle::Element { locators, .. }) = &step.settle {
        if locators.is_empty() {
            return Err(ValidationError::MissingLocators(name.clone()));
        }
        strings.extend(locators.iter().map(|l| l.to_string()));
    }

    for s in &strings {
        for reference in Fixtures::references(s) {
            if !fixtures.contains(reference) {
                return Err(ValidationError::UnknownFixture {
                    step: name.clone(),
                    name: reference.to_string(),
                });
            }
        }
    }

    Ok(())
}

fn collect_predicate(
    step: &str,
    predicate: &Predicate,
    strings: &mut Vec<String>,
) -> Result<(), ValidationError> {
    match predicate {
        Predicate::Visible { locators } => {
            if locators.is_empty() {
                return Err(ValidationError::MissingLocators(step.to_string()));
            }
            strings.extend(locators.iter().map(|l| l.to_string()));
        }
        Predicate::TextMatches { locators, pattern } => {
            if locators.is_empty() {
                return Err(ValidationError::MissingLocators(step.to_string()));
            }
            strings.extend(locators.iter().map(|l| l.to_string()));
            check_pattern(step, pattern)?;
            strings.push(pattern.clone());
        }
        Predicate::CountAtLeast { locator, .. } => strings.push(locator.to_string()),
        Predicate::UrlContains { fragment } => strings.push(fragment.clone()),
        Predicate::TitleMatches { pattern } => {
            check_pattern(step, pattern)?;
            strings.push(pattern.clone());
        }
    }
    Ok(())
}

// Placeholders are substituted before compiling, so only literal patterns are checked here.
fn check_pattern(step: &str, pattern: &str) -> Result<(), ValidationError> {
    if pattern.contains("{{") {
        return Ok(());
    }
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| ValidationError::InvalidPattern {
            step: step.to_string(),
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}
