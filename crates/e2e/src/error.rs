//! Error types for E2E testing

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Browser driver exited unexpectedly")]
    DriverClosed,

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Login failed for {user}: {reason}")]
    LoginFailed { user: String, reason: String },

    #[error("Unknown environment '{0}' (expected dev, staging or prod)")]
    UnknownEnvironment(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown invalid-data field: {0}")]
    UnknownField(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Job '{description}' did not complete within {attempts} attempt(s) ({elapsed_ms} ms)")]
    JobTimeout {
        description: String,
        attempts: u32,
        elapsed_ms: u64,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl E2eError {
    /// Lookup failures that a single attempt may swallow and retry later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            E2eError::ElementNotFound(_) | E2eError::Timeout(_) | E2eError::Playwright(_)
        )
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
