use crate::executor::{StepResult, StepStatus};
use crate::pipeline::{JourneyState, JourneyStatus};
use crate::runner::JourneyReport;

/// Human-readable summary of a finished journey.
pub fn format_report(state: &JourneyState, sensitive_fields: &[String]) -> String {
    let mut output = format!("Journey: {}\nSession: {}\n", state.journey, state.session_id);

    for result in &state.results {
        format_step(&mut output, result, 1, sensitive_fields);
    }

    let assertions = state.assertions();
    let passed = assertions.iter().filter(|a| a.passed()).count();

    output.push_str(&format!(
        "\nResult: {} in {}ms\nSteps: {} succeeded, {} skipped, {} failed, {} cancelled",
        describe_status(state),
        state.elapsed_ms,
        state.count(StepStatus::Succeeded),
        state.count(StepStatus::SkippedNotFound),
        state.count(StepStatus::FailedFatal),
        state.count(StepStatus::Cancelled),
    ));
    if !assertions.is_empty() {
        output.push_str(&format!(
            "\nAssertions: {}/{} passed",
            passed,
            assertions.len()
        ));
    }
    if let Some(failure) = state.failure() {
        output.push_str(&format!("\nError: {}", failure));
    }
    output
}

/// [`format_report`] followed by the artifacts the run left behind.
pub fn format_run(report: &JourneyReport, sensitive_fields: &[String]) -> String {
    let mut output = format_report(&report.state, sensitive_fields);

    if let Some(artifacts) = &report.artifacts {
        output.push_str(&format!("\nArtifacts: {}", artifacts.artifact_dir.display()));
        if let Some(video) = &artifacts.video {
            output.push_str(&format!("\n- video: {}", video.display()));
        }
        for shot in &artifacts.screenshots {
            output.push_str(&format!("\n- screenshot: {}", shot.display()));
        }
    }
    if let Some(err) = &report.teardown_error {
        output.push_str(&format!("\nTeardown: {}", err));
    }
    output
}

fn describe_status(state: &JourneyState) -> String {
    let step_name = |i: usize| {
        state
            .results
            .get(i)
            .map(|r| r.name.as_str())
            .unwrap_or("?")
    };
    match state.status {
        JourneyStatus::Completed => "COMPLETED".to_string(),
        JourneyStatus::HaltedFatal(i) => format!("HALTED at step {} ({})", i + 1, step_name(i)),
        JourneyStatus::Cancelled(i) => format!("CANCELLED at step {} ({})", i + 1, step_name(i)),
        JourneyStatus::InProgress(i) => format!("IN PROGRESS at step {}", i + 1),
        JourneyStatus::NotStarted => "NOT STARTED".to_string(),
    }
}

fn format_step(
    output: &mut String,
    result: &StepResult,
    depth: usize,
    sensitive_fields: &[String],
) {
    let indent = "  ".repeat(depth);
    let marker = match result.status {
        StepStatus::Succeeded => "ok",
        StepStatus::SkippedNotFound => "skip",
        StepStatus::FailedFatal => "FAIL",
        StepStatus::Cancelled => "STOP",
    };

    output.push_str(&format!(
        "{}[{:>4}] {} ({}ms)",
        indent, marker, result.name, result.elapsed_ms
    ));
    if let Some(value) = &result.captured {
        let shown = mask_sensitive(value, &result.name, sensitive_fields);
        output.push_str(&format!(" = {:?}", shown));
    }
    if result.settled == Some(false) {
        output.push_str(" [not settled]");
    }
    output.push('\n');

    if result.status != StepStatus::Succeeded
        && let Some(failure) = &result.failure
    {
        output.push_str(&format!("{}       {}\n", indent, failure));
    }

    for record in &result.assertions {
        let verdict = match record.failure_detail() {
            None => "pass".to_string(),
            Some(detail) => format!("FAIL: {}", detail),
        };
        let required = if record.required { " (required)" } else { "" };
        output.push_str(&format!(
            "{}       check {}{}: {}\n",
            indent, record.check, required, verdict
        ));
    }

    for sub in &result.sub_results {
        format_step(output, sub, depth + 1, sensitive_fields);
    }
}

/// Hide `value` when `field_name` looks like it carries a secret.
pub fn mask_sensitive(value: &str, field_name: &str, sensitive_fields: &[String]) -> String {
    let default_sensitive = ["password", "secret", "token", "cvv", "card_number"];

    let field = field_name.to_lowercase();
    let is_sensitive = sensitive_fields
        .iter()
        .any(|f| field.contains(&f.to_lowercase()))
        || default_sensitive.iter().any(|f| field.contains(*f));

    if is_sensitive {
        "••••••••".to_string()
    } else {
        value.to_string()
    }
}
