use std::time::Duration;

use crate::builder::ValidationError;
use crate::docker::OrchestratorError;

/// Outcome of a failed `start`. Clone so every caller joined on the same
/// in-flight attempt receives the same error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpawnError {
    #[error("invalid workload spec: {0}")]
    Validation(#[from] ValidationError),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("service {service} failed to start: {detail}")]
    Startup { service: String, detail: String },
    #[error("service {service} not running after {}", timeout_detail(.timeout, .last_error))]
    Timeout {
        service: String,
        timeout: Duration,
        last_error: Option<String>,
    },
    #[error("start of {0} was cancelled")]
    Cancelled(String),
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

impl SpawnError {
    /// Metric label for this failure.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Configuration(_) => "configuration",
            Self::Startup { .. } => "startup",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled(_) => "cancelled",
            Self::Orchestrator(_) => "orchestrator",
        }
    }
}

fn timeout_detail(timeout: &Duration, last_error: &Option<String>) -> String {
    let waited = humantime::format_duration(*timeout);
    match last_error {
        Some(err) => format!("{waited} (last error: {err})"),
        None => waited.to_string(),
    }
}
