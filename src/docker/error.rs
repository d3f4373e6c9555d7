// Errors reported by the orchestrator adapter.

/// Classification the lifecycle controller relies on: absent targets,
/// name conflicts, and transient failures that are worth retrying.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestratorError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("orchestrator unreachable: {0}")]
    Transient(String),
    #[error("orchestrator api error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("malformed orchestrator response: {0}")]
    Decode(String),
}

impl OrchestratorError {
    /// Maps a non-success HTTP status and its error message.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            404 => Self::NotFound(message),
            409 => Self::Conflict(message),
            _ if is_name_conflict(&message) => Self::Conflict(message),
            _ => Self::Api { status, message },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Connection problems and server-side (5xx) errors.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

// Older daemons report duplicate names as a plain 500.
fn is_name_conflict(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("name conflicts with an existing object") || lower.contains("already exists")
}
