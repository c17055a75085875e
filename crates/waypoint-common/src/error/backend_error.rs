/// Errors raised by a browser engine while serving one primitive call.
#[derive(thiserror::Error, Debug, Clone)]
pub enum BackendError {
    // ============================================================
    // Lifecycle Errors
    // ============================================================
    #[error("Launch failed: {0}")]
    Launch(String),

    #[error("Not ready")]
    NotReady,

    #[error("Connection lost")]
    ConnectionLost,

    // ============================================================
    // Navigation Errors
    // ============================================================
    #[error("Navigation failed: {0}")]
    Navigation(String),

    // ============================================================
    // Element Errors
    // ============================================================
    #[error("Element {reference} is stale (removed from DOM)")]
    ElementStale { reference: String },

    #[error("Element {reference} is not interactable: {reason}")]
    ElementNotInteractable { reference: String, reason: String },

    #[error("Invalid selector: {selector}")]
    SelectorInvalid { selector: String },

    // ============================================================
    // Execution Errors
    // ============================================================
    #[error("Script execution error: {0}")]
    ScriptError(String),

    #[error("Timeout: {operation}")]
    Timeout { operation: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // ============================================================
    // Artifact Errors
    // ============================================================
    #[error("Recording error: {0}")]
    Recording(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Other: {0}")]
    Other(String),
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Serialization(err.to_string())
    }
}

impl BackendError {
    /// Whether the error only concerns one locator candidate rather than the page.
    pub fn is_selector_error(&self) -> bool {
        matches!(self, BackendError::SelectorInvalid { .. })
    }

    /// Whether the engine is known not to implement the primitive at all.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, BackendError::NotSupported(_))
    }
}
