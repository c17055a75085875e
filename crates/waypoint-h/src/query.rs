use chromiumoxide::Page;
use serde::Deserialize;
use serde_json::{Value, json};
use std::future::Future;
use std::time::Duration;
use waypoint_common::BackendError;
use waypoint_common::locator::Locator;

const QUERY_JS: &str = include_str!("query.js");

/// Bound on a single script evaluation.
/// A dialog left open blocks the JS thread, so an evaluation can hang forever.
const EVAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum retries for context errors while the page is navigating.
const MAX_CONTEXT_RETRIES: u32 = 10;

const CONTEXT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Attribute the query script tags resolved elements with.
pub const REF_ATTR: &str = "data-waypoint-ref";

/// What the injected query script answers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    Found {
        reference: String,
        tag: String,
        #[serde(default)]
        text: Option<String>,
    },
    Missing,
    Count {
        count: usize,
    },
    Text {
        text: String,
    },
    Stale,
    Ok,
    Invalid {
        message: String,
    },
}

/// The query script's description of a locator.
pub fn locator_spec(locator: &Locator) -> Value {
    match locator {
        Locator::Css(css) => json!({ "kind": "css", "css": css }),
        Locator::XPath(expr) => json!({ "kind": "xpath", "expr": expr }),
        Locator::Text { text, exact } => json!({ "kind": "text", "text": text, "exact": exact }),
        Locator::TextPattern { pattern, flags } => {
            json!({ "kind": "text_regex", "pattern": pattern, "flags": flags })
        }
        Locator::HasText { css, text } => json!({ "kind": "has_text", "css": css, "text": text }),
    }
}

/// CSS selector addressing an element the query script has tagged.
pub fn reference_selector(reference: &str) -> String {
    format!("[{}=\"{}\"]", REF_ATTR, reference)
}

fn is_context_error(err: &str) -> bool {
    err.contains("Cannot find context")
        || err.contains("Execution context was destroyed")
        || err.contains("-32000")
}

/// Retry an operation that fails while the page swaps its execution context.
async fn retry_on_context_error<T, F, Fut>(
    operation_name: &str,
    mut operation: F,
) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EvalError>>,
{
    let mut last_error = None;

    for attempt in 0..MAX_CONTEXT_RETRIES {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(EvalError::Context(err)) => {
                tracing::debug!(
                    "{} context error (attempt {}/{}), retrying...",
                    operation_name,
                    attempt + 1,
                    MAX_CONTEXT_RETRIES
                );
                last_error = Some(err);
                tokio::time::sleep(CONTEXT_RETRY_DELAY).await;
            }
            Err(EvalError::Timeout) => {
                return Err(BackendError::Timeout {
                    operation: format!("{} (a dialog may be blocking the page)", operation_name),
                });
            }
            Err(EvalError::Other(err)) => return Err(BackendError::ScriptError(err)),
        }
    }

    Err(BackendError::ScriptError(last_error.unwrap_or_else(|| {
        format!("{} failed after retries", operation_name)
    })))
}

#[derive(Debug)]
enum EvalError {
    Timeout,
    Context(String),
    Other(String),
}

async fn evaluate_with_timeout(page: &Page, expression: &str) -> Result<Value, EvalError> {
    let eval_result = tokio::time::timeout(EVAL_TIMEOUT, page.evaluate(expression)).await;

    match eval_result {
        Err(_) => Err(EvalError::Timeout),
        Ok(Err(e)) => {
            let err_str = e.to_string();
            if is_context_error(&err_str) {
                Err(EvalError::Context(err_str))
            } else {
                Err(EvalError::Other(err_str))
            }
        }
        Ok(Ok(remote_object)) => remote_object
            .into_value::<Value>()
            .map_err(|e| EvalError::Other(format!("Failed to read result: {}", e))),
    }
}

/// Install the query script; a document that already has it keeps its tags and counter.
async fn try_inject(page: &Page) -> Result<(), EvalError> {
    match evaluate_with_timeout(page, QUERY_JS).await? {
        Value::Bool(true) => Ok(()),
        other => Err(EvalError::Other(format!(
            "query script did not install: {}",
            other
        ))),
    }
}

/// Call `window.__waypoint.<method>(<arg>)` in the page, injecting the script first.
pub async fn call(page: &Page, method: &str, arg: &Value) -> Result<Reply, BackendError> {
    let expression = format!("window.__waypoint.{}({})", method, arg);
    tracing::debug!("Evaluating script: {}", expression);

    let value = retry_on_context_error(method, || async {
        try_inject(page).await?;
        evaluate_with_timeout(page, &expression).await
    })
    .await?;

    Ok(serde_json::from_value(value)?)
}
